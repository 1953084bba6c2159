use crate::domain::ChainId;

/// Public endpoints that cover most dApp traffic, keyed by URL prefix.
pub const KNOWN_RPC_PREFIXES: &[(&str, u64)] = &[
    ("https://mainnet.infura.io/", 1),
    ("https://eth-mainnet.g.alchemy.com/", 1),
    ("https://cloudflare-eth.com", 1),
    ("https://eth.llamarpc.com", 1),
    ("https://rpc.ankr.com/eth", 1),
    ("https://ethereum-rpc.publicnode.com", 1),
    ("https://sepolia.infura.io/", 11155111),
    ("https://eth-sepolia.g.alchemy.com/", 11155111),
    ("https://rpc.ankr.com/eth_sepolia", 11155111),
    ("https://rpc.gnosischain.com", 100),
    ("https://rpc.gnosis.gateway.fm", 100),
    ("https://rpc.ankr.com/gnosis", 100),
    ("https://polygon-rpc.com", 137),
    ("https://polygon-mainnet.infura.io/", 137),
    ("https://polygon-mainnet.g.alchemy.com/", 137),
    ("https://rpc.ankr.com/polygon", 137),
    ("https://mainnet.optimism.io", 10),
    ("https://optimism-mainnet.infura.io/", 10),
    ("https://opt-mainnet.g.alchemy.com/", 10),
    ("https://arb1.arbitrum.io/rpc", 42161),
    ("https://arbitrum-mainnet.infura.io/", 42161),
    ("https://arb-mainnet.g.alchemy.com/", 42161),
    ("https://mainnet.base.org", 8453),
    ("https://base-mainnet.g.alchemy.com/", 8453),
    ("https://api.avax.network/ext/bc/C/rpc", 43114),
    ("https://bsc-dataseed.binance.org", 56),
];

/// Looks `url` up in [`KNOWN_RPC_PREFIXES`]. The longest matching prefix wins, and a
/// prefix only matches on a path boundary so `…/eth` does not claim `…/eth_sepolia`.
pub fn lookup_known_rpc(url: &str) -> Option<ChainId> {
    KNOWN_RPC_PREFIXES
        .iter()
        .filter(|(prefix, _)| matches_prefix(url, prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .and_then(|(_, id)| ChainId::new(*id).ok())
}

fn matches_prefix(url: &str, prefix: &str) -> bool {
    let Some(head) = url.get(..prefix.len()) else {
        return false;
    };
    if !head.eq_ignore_ascii_case(prefix) {
        return false;
    }
    if prefix.ends_with('/') {
        return true;
    }
    matches!(url[prefix.len()..].chars().next(), None | Some('/' | '?' | '#'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_boundary_prevents_sibling_matches() {
        assert_eq!(
            lookup_known_rpc("https://rpc.ankr.com/eth").map(ChainId::get),
            Some(1)
        );
        assert_eq!(
            lookup_known_rpc("https://rpc.ankr.com/eth_sepolia/abc").map(ChainId::get),
            Some(11155111)
        );
        assert_eq!(lookup_known_rpc("https://rpc.ankr.com/eth_goerli"), None);
        assert_eq!(lookup_known_rpc("https://polygon-rpc.com.evil.example"), None);
    }

    #[test]
    fn keyed_endpoints_and_case_insensitive_hosts() {
        assert_eq!(
            lookup_known_rpc("https://mainnet.infura.io/v3/0123456789abcdef").map(ChainId::get),
            Some(1)
        );
        assert_eq!(
            lookup_known_rpc("HTTPS://RPC.GNOSISCHAIN.COM/").map(ChainId::get),
            Some(100)
        );
        assert_eq!(lookup_known_rpc("https://unknown.example/rpc"), None);
    }
}

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub probe_timeout_ms: u64,
    pub wallet_rpc_url: Option<String>,
    pub wallet_rpc_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 10_000,
            wallet_rpc_url: None,
            wallet_rpc_timeout_ms: 15_000,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from `lookup`, keeping defaults for missing or unparseable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            probe_timeout_ms: parse_or(
                lookup("PILOT_PROBE_TIMEOUT_MS"),
                defaults.probe_timeout_ms,
            ),
            wallet_rpc_url: lookup("PILOT_WALLET_RPC_URL")
                .map(|url| url.trim().to_owned())
                .filter(|url| !url.is_empty()),
            wallet_rpc_timeout_ms: parse_or(
                lookup("PILOT_WALLET_RPC_TIMEOUT_MS"),
                defaults.wallet_rpc_timeout_ms,
            ),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn wallet_rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.wallet_rpc_timeout_ms)
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

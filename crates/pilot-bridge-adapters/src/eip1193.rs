use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use serde_json::{json, Value};

use pilot_bridge_core::{ChainId, ProviderRpcError, RpcRequest, WalletProvider};

use crate::BridgeConfig;

/// Wallet reached over plain JSON-RPC, e.g. a local dev node with unlocked accounts.
///
/// JSON-RPC errors come back as they were sent (`code`, `message`, `data`), transport
/// failures surface as `4900`.
#[derive(Debug, Clone)]
pub struct HttpWalletProvider {
    url: String,
    client: reqwest::Client,
    next_id: Arc<AtomicU64>,
}

impl HttpWalletProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(url, client))
    }

    pub fn with_client(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// `None` when no wallet RPC URL is configured.
    pub fn from_config(config: &BridgeConfig) -> Result<Option<Self>, reqwest::Error> {
        config
            .wallet_rpc_url
            .as_ref()
            .map(|url| Self::new(url.clone(), config.wallet_rpc_timeout()))
            .transpose()
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl WalletProvider for HttpWalletProvider {
    async fn request(&self, request: RpcRequest) -> Result<Value, ProviderRpcError> {
        let params = match request.params {
            Value::Null => json!([]),
            params => params,
        };
        let payload = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": request.method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                ProviderRpcError::disconnected(format!("wallet rpc request failed: {e}"))
            })?;
        let status = response.status();
        let body: Value = response.json().await.map_err(|e| {
            ProviderRpcError::internal(format!("wallet rpc json decode failed: {e}"))
        })?;
        if let Some(error) = body.get("error").filter(|error| !error.is_null()) {
            return Err(serde_json::from_value(error.clone()).unwrap_or_else(|_| {
                ProviderRpcError::internal(format!("wallet rpc returned error: {error}"))
            }));
        }
        if !status.is_success() {
            return Err(ProviderRpcError::internal(format!(
                "wallet rpc status {status}: {body}"
            )));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| ProviderRpcError::internal("wallet rpc response has no result"))
    }
}

#[derive(Debug, Clone)]
struct MemoryWalletState {
    accounts: Vec<Address>,
    chain_id: ChainId,
}

impl Default for MemoryWalletState {
    fn default() -> Self {
        Self {
            accounts: vec![DEFAULT_ACCOUNT],
            chain_id: ChainId::MAINNET,
        }
    }
}

/// `0x1000…0001`.
const DEFAULT_ACCOUNT: Address = Address::new([
    0x10, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01,
]);

/// Deterministic in-process wallet. Answers account and chain queries from its own state
/// and rejects everything else with `4200`.
#[derive(Debug, Clone, Default)]
pub struct MemoryWalletProvider {
    state: Arc<Mutex<MemoryWalletState>>,
}

impl MemoryWalletProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: Vec<Address>, chain_id: ChainId) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryWalletState { accounts, chain_id })),
        }
    }

    pub fn accounts(&self) -> Vec<Address> {
        self.state().accounts.clone()
    }

    pub fn chain_id(&self) -> ChainId {
        self.state().chain_id
    }

    pub fn set_accounts(&self, accounts: Vec<Address>) {
        self.state().accounts = accounts;
    }

    pub fn set_chain_id(&self, chain_id: ChainId) {
        self.state().chain_id = chain_id;
    }

    fn state(&self) -> MutexGuard<'_, MemoryWalletState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn switch_chain(&self, params: &Value) -> Result<Value, ProviderRpcError> {
        let chain_id = params
            .get(0)
            .and_then(|p| p.get("chainId"))
            .ok_or_else(|| {
                ProviderRpcError::new(ProviderRpcError::INVALID_PARAMS, "missing chainId")
            })
            .and_then(|raw| {
                ChainId::from_json(raw).map_err(|e| {
                    ProviderRpcError::new(ProviderRpcError::INVALID_PARAMS, e.to_string())
                })
            })?;
        self.set_chain_id(chain_id);
        Ok(Value::Null)
    }
}

#[async_trait]
impl WalletProvider for MemoryWalletProvider {
    async fn request(&self, request: RpcRequest) -> Result<Value, ProviderRpcError> {
        match request.method.as_str() {
            "eth_chainId" => Ok(json!(self.chain_id().to_hex())),
            "net_version" => Ok(json!(self.chain_id().to_string())),
            "eth_accounts" | "eth_requestAccounts" => Ok(json!(self
                .accounts()
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>())),
            "wallet_switchEthereumChain" => self.switch_chain(&request.params),
            method => Err(ProviderRpcError::unsupported_method(method)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_account_is_deterministic() {
        let wallet = MemoryWalletProvider::new();
        let expected: Address = "0x1000000000000000000000000000000000000001"
            .parse()
            .expect("address");
        assert_eq!(wallet.accounts(), vec![expected]);
        assert_eq!(wallet.chain_id(), ChainId::MAINNET);
    }

    #[tokio::test]
    async fn switch_chain_updates_state() {
        let wallet = MemoryWalletProvider::new();
        wallet
            .request(RpcRequest::new(
                "wallet_switchEthereumChain",
                json!([{ "chainId": "0x64" }]),
            ))
            .await
            .expect("switch");
        assert_eq!(wallet.chain_id().get(), 100);

        let err = wallet
            .request(RpcRequest::new("wallet_switchEthereumChain", json!([])))
            .await
            .expect_err("missing params");
        assert_eq!(err.code, ProviderRpcError::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn other_methods_are_unsupported() {
        let err = MemoryWalletProvider::new()
            .request(RpcRequest::new("eth_sendTransaction", json!([{}])))
            .await
            .expect_err("unsupported");
        assert_eq!(err.code, ProviderRpcError::UNSUPPORTED_METHOD);
    }
}

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use pilot_bridge_core::{lookup_known_rpc, BridgeError, ChainId, ChainIdError, ErrorTracker};

use crate::random::random_bytes;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("eth_chainId request id for {url} unavailable: {source}")]
    RequestId {
        url: String,
        #[source]
        source: BridgeError,
    },
    #[error("eth_chainId request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("eth_chainId request to {url} returned status {status}")]
    Status { url: String, status: reqwest::StatusCode },
    #[error("eth_chainId response from {url} is not JSON: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("eth_chainId response from {url} has no result: {body}")]
    MissingResult { url: String, body: Value },
    #[error("eth_chainId response from {url} has an unusable result: {source}")]
    InvalidResult {
        url: String,
        #[source]
        source: ChainIdError,
    },
}

/// Best-effort chain identification of a JSON-RPC endpoint.
///
/// Well-known endpoints are answered from a static table, everything else gets a single
/// `eth_chainId` call. Failures are reported to the tracker and yield `None`; nothing is
/// retried or cached here.
#[derive(Clone)]
pub struct ChainProbe {
    client: reqwest::Client,
    tracker: Arc<dyn ErrorTracker>,
}

impl ChainProbe {
    pub fn new(tracker: Arc<dyn ErrorTracker>) -> Self {
        Self::with_client(reqwest::Client::new(), tracker)
    }

    pub fn with_client(client: reqwest::Client, tracker: Arc<dyn ErrorTracker>) -> Self {
        Self { client, tracker }
    }

    pub async fn probe(&self, url: &str) -> Option<ChainId> {
        if let Some(chain_id) = lookup_known_rpc(url) {
            tracing::debug!(url, %chain_id, "chain id from known endpoint table");
            return Some(chain_id);
        }
        match self.fetch_chain_id(url).await {
            Ok(chain_id) => {
                tracing::debug!(url, %chain_id, "chain id from eth_chainId");
                Some(chain_id)
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "chain probe failed");
                self.tracker.capture_exception(&e);
                None
            }
        }
    }

    async fn fetch_chain_id(&self, url: &str) -> Result<ChainId, ProbeError> {
        let id = random_request_id().map_err(|source| ProbeError::RequestId {
            url: url.to_owned(),
            source,
        })?;
        let payload = serde_json::json!({
            "method": "eth_chainId",
            "params": [],
            "jsonrpc": "2.0",
            "id": id,
        });
        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|source| ProbeError::Request {
                url: url.to_owned(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status {
                url: url.to_owned(),
                status,
            });
        }
        let body: Value = response.json().await.map_err(|source| ProbeError::Decode {
            url: url.to_owned(),
            source,
        })?;
        let result = body.get("result").ok_or_else(|| ProbeError::MissingResult {
            url: url.to_owned(),
            body: body.clone(),
        })?;
        ChainId::from_json(result).map_err(|source| ProbeError::InvalidResult {
            url: url.to_owned(),
            source,
        })
    }
}

fn random_request_id() -> Result<u32, BridgeError> {
    random_bytes::<4>().map(|bytes| u32::from_le_bytes(bytes) >> 1)
}

//! Passive network detection from request bodies intercepted by `chrome.webRequest`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{ChainId, TabId};
use crate::tracking::NetworkTrackingState;

/// `chrome.webRequest.OnBeforeRequestDetails.requestBody`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_data: Option<HashMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Vec<UploadData>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl RequestBody {
    pub fn from_json_text(text: &str) -> Self {
        Self {
            raw: Some(vec![UploadData {
                bytes: Some(text.as_bytes().to_vec()),
                file: None,
            }]),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub new_endpoint: bool,
}

impl DetectionResult {
    pub const NEW: DetectionResult = DetectionResult { new_endpoint: true };
    pub const KNOWN: DetectionResult = DetectionResult {
        new_endpoint: false,
    };
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainTaggedRequest {
    chain_id: ChainId,
    #[allow(dead_code)]
    method: String,
}

/// Joins the raw upload chunks into UTF-8 text. Bodies that reference files, failed to
/// upload, or were form-encoded have no JSON-RPC payload.
pub fn extract_json_rpc_body(body: &RequestBody) -> Option<String> {
    if body.error.is_some() {
        return None;
    }
    let chunks = body.raw.as_ref()?;
    let mut bytes = Vec::new();
    for chunk in chunks {
        if chunk.file.is_some() {
            return None;
        }
        bytes.extend_from_slice(chunk.bytes.as_deref()?);
    }
    if bytes.is_empty() {
        return None;
    }
    String::from_utf8(bytes).ok()
}

pub fn parse_chain_id_from_body(body: &str) -> Option<ChainId> {
    serde_json::from_str::<ChainTaggedRequest>(body)
        .ok()
        .map(|request| request.chain_id)
}

/// Records the chain of `url` if the intercepted body carries one. Parse failures are
/// expected for most traffic and are not reported.
pub fn parse_network_from_request_body(
    state: &mut NetworkTrackingState,
    request_body: &RequestBody,
    url: &str,
    tab_id: TabId,
) -> DetectionResult {
    if state.is_confirmed(url) {
        return DetectionResult::KNOWN;
    }
    let Some(chain_id) = extract_json_rpc_body(request_body)
        .as_deref()
        .and_then(parse_chain_id_from_body)
    else {
        return DetectionResult::KNOWN;
    };
    if !state.confirm(url, chain_id) {
        return DetectionResult::KNOWN;
    }
    state.track_rpc_url(tab_id, url);
    DetectionResult::NEW
}

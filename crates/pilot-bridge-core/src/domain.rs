use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainIdError {
    #[error("chain id must be a positive integer")]
    Zero,
    #[error("chain id must be string or number, got {0}")]
    WrongType(String),
    #[error("invalid hex chain id: {0}")]
    InvalidHex(String),
    #[error("invalid chain id: {0}")]
    Invalid(String),
}

/// Numeric identifier of an EVM network. Always non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(u64);

impl ChainId {
    pub const MAINNET: ChainId = ChainId(1);

    pub fn new(id: u64) -> Result<Self, ChainIdError> {
        if id == 0 {
            return Err(ChainIdError::Zero);
        }
        Ok(Self(id))
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// `0x`-prefixed lowercase hex, the encoding EIP-1193 uses in events.
    pub fn to_hex(self) -> String {
        format!("{:#x}", self.0)
    }

    pub fn from_json(value: &Value) -> Result<Self, ChainIdError> {
        if let Some(n) = value.as_u64() {
            return Self::new(n);
        }
        let s = value
            .as_str()
            .ok_or_else(|| ChainIdError::WrongType(value.to_string()))?;
        s.parse()
    }
}

impl Default for ChainId {
    fn default() -> Self {
        Self::MAINNET
    }
}

impl FromStr for ChainId {
    type Err = ChainIdError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let id = if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16).map_err(|e| ChainIdError::InvalidHex(e.to_string()))?
        } else {
            raw.parse::<u64>()
                .map_err(|e| ChainIdError::Invalid(e.to_string()))?
        };
        Self::new(id)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ChainId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Random identifier generated once per installation of the injected provider in a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InjectionId(String);

impl InjectionId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InjectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlates a relayed request with its response. Unique for the lifetime of a page:
/// the injection id scopes it to one installation, the sequence number orders it within.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(injection_id: &InjectionId, sequence: u64) -> Self {
        Self(format!("{injection_id}-{sequence}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// EIP-1193 provider error. Codes are forwarded verbatim from the wallet so that the dApp
/// sees e.g. `4001` for a user rejection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct ProviderRpcError {
    pub message: String,
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ProviderRpcError {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    pub const DISCONNECTED: i64 = 4900;
    pub const CHAIN_DISCONNECTED: i64 = 4901;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
            data: None,
        }
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::new(Self::DISCONNECTED, message)
    }

    pub fn unsupported_method(method: &str) -> Self {
        Self::new(
            Self::UNSUPPORTED_METHOD,
            format!("the provider does not support the requested method: {method}"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL, message)
    }
}

fn jsonrpc_version() -> String {
    "2.0".to_owned()
}

/// Pre-EIP-1193 JSON-RPC request envelope accepted by `sendAsync`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcPayload {
    #[serde(default)]
    pub id: Value,
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub id: Value,
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProviderRpcError>,
}

impl JsonRpcResponse {
    pub fn from_outcome(payload: &JsonRpcPayload, outcome: Result<Value, ProviderRpcError>) -> Self {
        let (result, error) = match outcome {
            Ok(result) => (Some(result), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            id: payload.id.clone(),
            jsonrpc: payload.jsonrpc.clone(),
            result,
            error,
        }
    }
}

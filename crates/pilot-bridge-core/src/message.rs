use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ChainId, InjectionId, ProviderRpcError, RequestId, RpcRequest};

/// EIP-1193 event names. Anything the bridge does not interpret is carried as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventName {
    Connect,
    Disconnect,
    ChainChanged,
    AccountsChanged,
    Message,
    Other(String),
}

impl EventName {
    pub fn as_str(&self) -> &str {
        match self {
            EventName::Connect => "connect",
            EventName::Disconnect => "disconnect",
            EventName::ChainChanged => "chainChanged",
            EventName::AccountsChanged => "accountsChanged",
            EventName::Message => "message",
            EventName::Other(name) => name,
        }
    }
}

impl From<String> for EventName {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "connect" => EventName::Connect,
            "disconnect" => EventName::Disconnect,
            "chainChanged" => EventName::ChainChanged,
            "accountsChanged" => EventName::AccountsChanged,
            "message" => EventName::Message,
            _ => EventName::Other(raw),
        }
    }
}

impl From<&str> for EventName {
    fn from(raw: &str) -> Self {
        EventName::from(raw.to_owned())
    }
}

impl From<EventName> for String {
    fn from(name: EventName) -> Self {
        match name {
            EventName::Other(raw) => raw,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that crosses a context boundary, on the page window as well as on the
/// extension runtime bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Message {
    InjectedProviderRequest {
        request_id: RequestId,
        injection_id: InjectionId,
        request: RpcRequest,
    },
    InjectedProviderResponse {
        request_id: RequestId,
        response: Value,
    },
    InjectedProviderError {
        request_id: RequestId,
        error: ProviderRpcError,
    },
    InjectedProviderEvent {
        event_name: EventName,
        #[serde(default)]
        event_data: Value,
    },
    ProbeChainId {
        url: String,
    },
    ProbeChainIdResponse {
        chain_id: Option<ChainId>,
    },
    PilotDisconnect,
}

impl Message {
    pub fn event(event_name: EventName, event_data: Value) -> Self {
        Message::InjectedProviderEvent {
            event_name,
            event_data,
        }
    }

    /// The `disconnect` event posted into a page once the Pilot panel goes away.
    pub fn pilot_disconnected() -> Self {
        let error = ProviderRpcError::disconnected("Zodiac Pilot disconnected");
        Message::event(
            EventName::Disconnect,
            serde_json::json!({
                "message": error.message,
                "code": error.code,
            }),
        )
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Message::InjectedProviderRequest { request_id, .. }
            | Message::InjectedProviderResponse { request_id, .. }
            | Message::InjectedProviderError { request_id, .. } => Some(request_id),
            Message::InjectedProviderEvent { .. }
            | Message::ProbeChainId { .. }
            | Message::ProbeChainIdResponse { .. }
            | Message::PilotDisconnect => None,
        }
    }
}

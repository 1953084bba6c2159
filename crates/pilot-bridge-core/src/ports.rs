use std::error::Error as StdError;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{ProviderRpcError, RpcRequest, TabId};
use crate::message::Message;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("could not establish connection: no receiving end in tab {0}")]
    NoReceiver(TabId),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
}

/// Who sent a message on the runtime bus. Content scripts carry their tab, the extension's
/// own pages do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageSender {
    pub tab_id: Option<TabId>,
}

impl MessageSender {
    pub fn tab(tab_id: TabId) -> Self {
        Self {
            tab_id: Some(tab_id),
        }
    }

    pub fn extension() -> Self {
        Self { tab_id: None }
    }
}

/// The wallet that actually answers requests, e.g. the Pilot's Safe/Roles provider.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request(&self, request: RpcRequest) -> Result<Value, ProviderRpcError>;
}

/// A listener on the runtime bus. Returning `None` means "not mine, no reply".
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message, sender: MessageSender) -> Option<Message>;
}

/// Content script to extension (`chrome.runtime.sendMessage`). The reply is absent when no
/// extension listener answered, e.g. because the panel was closed.
#[async_trait]
pub trait RuntimeMessenger: Send + Sync {
    async fn send_message(&self, message: Message) -> Option<Message>;
}

/// Extension to the content script of one tab (`chrome.tabs.sendMessage`).
#[async_trait]
pub trait TabMessenger: Send + Sync {
    async fn send_to_tab(&self, tab_id: TabId, message: Message)
        -> Result<Option<Message>, BridgeError>;
}

/// Fire-and-forget sink for swallowed failures.
pub trait ErrorTracker: Send + Sync {
    fn capture_exception(&self, error: &(dyn StdError + 'static));
    fn capture_message(&self, message: &str);
}

use std::sync::{Arc, Weak};

use async_trait::async_trait;

use pilot_bridge_core::{Message, MessageHandler, MessageSender, RuntimeMessenger};

use crate::page::{Page, WindowListener, CONTENT_SCRIPT_MARKER};
use crate::probe::ChainProbe;

/// The content script: the only piece that sees both the page window and the extension
/// runtime.
pub struct ContentScriptRelay {
    page: Page,
    runtime: Arc<dyn RuntimeMessenger>,
    probe: ChainProbe,
}

impl ContentScriptRelay {
    /// Starts relaying provider requests from `page` to `runtime`. Returns `None` when a
    /// relay already runs in the page. Needs a Tokio runtime.
    pub fn install(
        page: &Page,
        runtime: Arc<dyn RuntimeMessenger>,
        probe: ChainProbe,
    ) -> Option<Arc<Self>> {
        if !page.mark(CONTENT_SCRIPT_MARKER) {
            tracing::debug!(origin = page.origin(), "content script already injected");
            return None;
        }
        let relay = Arc::new(Self {
            page: page.clone(),
            runtime,
            probe,
        });
        tokio::spawn(forward_page_requests(Arc::downgrade(&relay), page.subscribe()));
        Some(relay)
    }

    /// Forwards one page request. The reply goes back into the page; without a reply (the
    /// panel closed mid-flight) nothing is posted and the page-side call stays pending.
    async fn forward_request(&self, message: Message) {
        let request_id = message.request_id().cloned();
        match self.runtime.send_message(message).await {
            Some(reply) => self.page.post_message(reply),
            None => {
                tracing::debug!(request_id = ?request_id, "provider request went unanswered");
            }
        }
    }
}

#[async_trait]
impl MessageHandler for ContentScriptRelay {
    async fn handle(&self, message: Message, _sender: MessageSender) -> Option<Message> {
        match message {
            Message::PilotDisconnect => {
                self.page.post_message(Message::pilot_disconnected());
                None
            }
            event @ Message::InjectedProviderEvent { .. } => {
                self.page.post_message(event);
                None
            }
            Message::ProbeChainId { url } => {
                let chain_id = self.probe.probe(&url).await;
                Some(Message::ProbeChainIdResponse { chain_id })
            }
            Message::InjectedProviderRequest { .. }
            | Message::InjectedProviderResponse { .. }
            | Message::InjectedProviderError { .. }
            | Message::ProbeChainIdResponse { .. } => None,
        }
    }
}

async fn forward_page_requests(relay: Weak<ContentScriptRelay>, mut window: WindowListener) {
    while let Some(message) = window.recv().await {
        match message {
            request @ Message::InjectedProviderRequest { .. } => {
                let Some(relay) = relay.upgrade() else {
                    break;
                };
                tokio::spawn(async move { relay.forward_request(request).await });
            }
            Message::InjectedProviderResponse { .. }
            | Message::InjectedProviderError { .. }
            | Message::InjectedProviderEvent { .. }
            | Message::ProbeChainId { .. }
            | Message::ProbeChainIdResponse { .. }
            | Message::PilotDisconnect => {}
        }
    }
}

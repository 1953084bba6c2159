use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use pilot_bridge_core::Message;

/// Dataset flag set once the injected provider is installed in a page.
pub const PROVIDER_INJECTED_MARKER: &str = "pilotProviderInjected";
/// Dataset flag set once the content script relay runs in a page.
pub const CONTENT_SCRIPT_MARKER: &str = "pilotContentScriptInjected";

/// A `message` listener on a page window. Yields `None` once the page is closed.
pub type WindowListener = mpsc::UnboundedReceiver<Message>;

/// `None` once the page is torn down.
type Listeners = Option<Vec<mpsc::UnboundedSender<Message>>>;

/// A dApp page as seen by the scripts living in it: the window's `postMessage` channel and
/// the document's dataset. Cloning yields another handle to the same page.
#[derive(Debug, Clone)]
pub struct Page {
    origin: Arc<str>,
    window: Arc<Mutex<Listeners>>,
    dataset: Arc<Mutex<HashSet<String>>>,
}

impl Page {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: Arc::from(origin.into()),
            window: Arc::new(Mutex::new(Some(Vec::new()))),
            dataset: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// `window.postMessage(message, "*")`. Every current listener of the page sees it,
    /// including the poster, however far behind it is. Without listeners, or once the
    /// page is closed, the message is dropped.
    pub fn post_message(&self, message: Message) {
        let mut window = self.window();
        let Some(listeners) = window.as_mut() else {
            tracing::trace!(origin = %self.origin, "window message posted to a closed page");
            return;
        };
        listeners.retain(|listener| listener.send(message.clone()).is_ok());
        if listeners.is_empty() {
            tracing::trace!(origin = %self.origin, "window message dropped without listeners");
        }
    }

    /// A new `message` listener. It only sees messages posted after this call. On a closed
    /// page it ends immediately.
    pub fn subscribe(&self) -> WindowListener {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(listeners) = self.window().as_mut() {
            listeners.push(tx);
        }
        rx
    }

    /// Tears the page down: every listener ends and later posts go nowhere.
    pub fn close(&self) {
        if self.window().take().is_some() {
            tracing::debug!(origin = %self.origin, "page closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.window().is_none()
    }

    /// Sets a dataset flag. Returns `false` when it was already set.
    pub fn mark(&self, marker: &str) -> bool {
        self.dataset
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(marker.to_owned())
    }

    pub fn is_marked(&self, marker: &str) -> bool {
        self.dataset
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(marker)
    }

    fn window(&self) -> MutexGuard<'_, Listeners> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slow_listeners_see_every_message() {
        let page = Page::new("https://app.example.org");
        let mut listener = page.subscribe();
        for _ in 0..2_000 {
            page.post_message(Message::PilotDisconnect);
        }
        let mut seen = 0;
        while let Ok(message) = listener.try_recv() {
            assert_eq!(message, Message::PilotDisconnect);
            seen += 1;
        }
        assert_eq!(seen, 2_000);
    }

    #[tokio::test]
    async fn closing_ends_every_listener() {
        let page = Page::new("https://app.example.org");
        let mut before = page.subscribe();
        page.post_message(Message::ProbeChainId {
            url: "https://rpc.example.org".to_owned(),
        });
        page.close();
        assert!(page.is_closed());

        assert!(before.recv().await.is_some());
        assert!(before.recv().await.is_none());
        assert!(page.subscribe().recv().await.is_none());
    }
}

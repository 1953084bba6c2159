use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;

use pilot_bridge_core::{
    BridgeError, Message, MessageHandler, MessageSender, RuntimeMessenger, TabId, TabMessenger,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct RuntimeInner {
    next_listener: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn MessageHandler>)>>,
    content_scripts: Mutex<HashMap<TabId, Arc<dyn MessageHandler>>>,
}

/// In-process extension message bus.
///
/// Extension listeners (`chrome.runtime.onMessage`) are asked in registration order and
/// the first reply wins. Each tab has at most one content script receiving
/// `chrome.tabs.sendMessage`.
#[derive(Clone, Default)]
pub struct ExtensionRuntime {
    inner: Arc<RuntimeInner>,
}

impl ExtensionRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(
        &self,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<ListenerId, BridgeError> {
        let mut listeners = lock(&self.inner.listeners)?;
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        listeners.push((id, handler));
        Ok(id)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let Ok(mut listeners) = lock(&self.inner.listeners) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(listener, _)| *listener != id);
        listeners.len() != before
    }

    pub fn register_content_script(
        &self,
        tab_id: TabId,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), BridgeError> {
        lock(&self.inner.content_scripts)?.insert(tab_id, handler);
        Ok(())
    }

    pub fn unregister_content_script(&self, tab_id: TabId) -> bool {
        lock(&self.inner.content_scripts)
            .map(|mut scripts| scripts.remove(&tab_id).is_some())
            .unwrap_or(false)
    }

    /// The `chrome.runtime` handle given to the content script of `tab_id`. It does not
    /// keep the runtime alive; once the extension is gone every send goes unanswered.
    pub fn port_for_tab(&self, tab_id: TabId) -> ContentScriptPort {
        ContentScriptPort {
            runtime: Arc::downgrade(&self.inner),
            tab_id,
        }
    }

    pub async fn dispatch(&self, message: Message, sender: MessageSender) -> Option<Message> {
        let listeners: Vec<Arc<dyn MessageHandler>> = match lock(&self.inner.listeners) {
            Ok(listeners) => listeners.iter().map(|(_, h)| Arc::clone(h)).collect(),
            Err(e) => {
                tracing::error!(error = %e, "runtime listeners unavailable");
                return None;
            }
        };
        for listener in listeners {
            if let Some(reply) = listener.handle(message.clone(), sender).await {
                return Some(reply);
            }
        }
        tracing::debug!(tab_id = ?sender.tab_id, "runtime message went unanswered");
        None
    }
}

#[async_trait]
impl TabMessenger for ExtensionRuntime {
    async fn send_to_tab(
        &self,
        tab_id: TabId,
        message: Message,
    ) -> Result<Option<Message>, BridgeError> {
        let handler = lock(&self.inner.content_scripts)?
            .get(&tab_id)
            .cloned()
            .ok_or(BridgeError::NoReceiver(tab_id))?;
        Ok(handler.handle(message, MessageSender::extension()).await)
    }
}

#[derive(Clone)]
pub struct ContentScriptPort {
    runtime: Weak<RuntimeInner>,
    tab_id: TabId,
}

#[async_trait]
impl RuntimeMessenger for ContentScriptPort {
    async fn send_message(&self, message: Message) -> Option<Message> {
        let inner = self.runtime.upgrade()?;
        ExtensionRuntime { inner }
            .dispatch(message, MessageSender::tab(self.tab_id))
            .await
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, BridgeError> {
    mutex
        .lock()
        .map_err(|e| BridgeError::Transport(format!("runtime lock poisoned: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    #[async_trait]
    impl MessageHandler for Silent {
        async fn handle(&self, _message: Message, _sender: MessageSender) -> Option<Message> {
            None
        }
    }

    fn poison<T: Send>(mutex: &Mutex<T>) {
        std::thread::scope(|scope| {
            let _ = scope
                .spawn(|| {
                    let _guard = mutex.lock();
                    panic!("listener panicked while registering");
                })
                .join();
        });
    }

    #[test]
    fn registration_fails_on_a_poisoned_bus() {
        let runtime = ExtensionRuntime::new();
        poison(&runtime.inner.listeners);
        poison(&runtime.inner.content_scripts);

        assert!(matches!(
            runtime.add_listener(Arc::new(Silent)),
            Err(BridgeError::Transport(_))
        ));
        assert!(matches!(
            runtime.register_content_script(TabId(1), Arc::new(Silent)),
            Err(BridgeError::Transport(_))
        ));
    }

    #[test]
    fn listeners_get_distinct_ids() {
        let runtime = ExtensionRuntime::new();
        let first = runtime.add_listener(Arc::new(Silent)).expect("add");
        let second = runtime.add_listener(Arc::new(Silent)).expect("add");
        assert_ne!(first, second);
        assert!(runtime.remove_listener(first));
        assert!(!runtime.remove_listener(first));
    }
}

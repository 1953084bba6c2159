use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::message::EventName;

pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    event: EventName,
    once: bool,
    listener: Listener,
}

/// Named-event subscription registry with synchronous dispatch.
///
/// Listeners run outside the internal lock, so a listener may subscribe or unsubscribe
/// while an event is being emitted. Such changes take effect from the next `emit`.
#[derive(Default)]
pub struct EventEmitter {
    next_id: AtomicU64,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, event: EventName, listener: Listener) -> SubscriptionId {
        self.subscribe(event, listener, false)
    }

    pub fn once(&self, event: EventName, listener: Listener) -> SubscriptionId {
        self.subscribe(event, listener, true)
    }

    pub fn remove_listener(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.lock();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    pub fn remove_all_listeners(&self, event: &EventName) {
        self.lock().retain(|s| &s.event != event);
    }

    pub fn listener_count(&self, event: &EventName) -> usize {
        self.lock().iter().filter(|s| &s.event == event).count()
    }

    /// Calls every listener registered for `event`, in registration order. Returns how
    /// many listeners ran.
    pub fn emit(&self, event: &EventName, data: &Value) -> usize {
        let listeners: Vec<Listener> = {
            let mut subscriptions = self.lock();
            let matching = subscriptions
                .iter()
                .filter(|s| &s.event == event)
                .map(|s| Arc::clone(&s.listener))
                .collect();
            subscriptions.retain(|s| !(s.once && &s.event == event));
            matching
        };
        for listener in &listeners {
            listener(data);
        }
        listeners.len()
    }

    fn subscribe(&self, event: EventName, listener: Listener, once: bool) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Subscription {
            id,
            event,
            once,
            listener,
        });
        id
    }

    // A panicking listener never runs while the lock is held, so the list is still sound.
    fn lock(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("subscriptions", &self.lock().len())
            .finish()
    }
}

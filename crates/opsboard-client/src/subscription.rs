//! Tag-keyed subscriber registry.
//!
//! Listeners for a tag are invoked in registration order. Dispatch works on
//! a snapshot of the listener list and holds no lock while callbacks run, so
//! a callback may subscribe or unsubscribe (itself included) freely. There
//! is no replay: a listener only sees events dispatched after it registered.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use opsboard_core::{EventTag, ServerMessage};
use parking_lot::RwLock;
use tracing::{trace, warn};

type Callback = dyn Fn(&ServerMessage) + Send + Sync;

struct Listener {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Box<Callback>,
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<EventTag, Vec<Arc<Listener>>>>,
}

impl Inner {
    fn remove(&self, tag: EventTag, id: u64) {
        let mut listeners = self.listeners.write();
        if let Some(list) = listeners.get_mut(&tag) {
            list.retain(|l| l.id != id);
            if list.is_empty() {
                listeners.remove(&tag);
            }
        }
    }
}

/// Typed pub/sub between the socket manager and its consumers.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<Inner>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for events tagged `tag`.
    pub fn subscribe<F>(&self, tag: EventTag, callback: F) -> Subscription
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        let listener = Arc::new(Listener {
            id,
            active: active.clone(),
            callback: Box::new(callback),
        });

        self.inner
            .listeners
            .write()
            .entry(tag)
            .or_default()
            .push(listener);
        trace!(tag = %tag, listener_id = id, "Subscribed");

        Subscription {
            id,
            tag,
            active,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Invoke every listener of the message's tag. Returns how many ran.
    ///
    /// Control frames have no tag and reach no listener. A panicking callback
    /// is logged and does not prevent the remaining callbacks from running.
    pub fn dispatch(&self, msg: &ServerMessage) -> usize {
        let Some(tag) = msg.tag() else {
            return 0;
        };

        let snapshot: Vec<Arc<Listener>> = match self.inner.listeners.read().get(&tag) {
            Some(list) => list.clone(),
            None => return 0,
        };

        let mut invoked = 0;
        for listener in snapshot {
            if !listener.active.load(Ordering::Acquire) {
                continue;
            }
            invoked += 1;
            if catch_unwind(AssertUnwindSafe(|| (listener.callback)(msg))).is_err() {
                warn!(tag = %tag, listener_id = listener.id, "Subscriber callback panicked");
            }
        }
        invoked
    }

    pub fn listener_count(&self, tag: EventTag) -> usize {
        self.inner
            .listeners
            .read()
            .get(&tag)
            .map_or(0, |list| list.len())
    }

    /// Number of tags with at least one listener.
    pub fn tag_count(&self) -> usize {
        self.inner.listeners.read().len()
    }
}

/// Handle returned by [`SubscriberRegistry::subscribe`].
///
/// Dropping the handle does not unsubscribe; call [`unsubscribe`](Self::unsubscribe).
#[must_use = "call unsubscribe() to remove the listener"]
pub struct Subscription {
    id: u64,
    tag: EventTag,
    active: Arc<AtomicBool>,
    registry: Weak<Inner>,
}

impl Subscription {
    pub fn tag(&self) -> EventTag {
        self.tag
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Remove exactly this listener. Safe to call more than once, and from
    /// inside the listener's own callback.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(inner) = self.registry.upgrade() {
            inner.remove(self.tag, self.id);
        }
        trace!(tag = %self.tag, listener_id = self.id, "Unsubscribed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsboard_core::{Alert, Severity};
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&ServerMessage) + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |name: &str| {
            let log = log_clone.clone();
            let name = name.to_string();
            Box::new(move |_: &ServerMessage| log.lock().push(name.clone()))
                as Box<dyn Fn(&ServerMessage) + Send + Sync>
        };
        (log, make)
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = SubscriberRegistry::new();
        let (log, make) = recorder();

        let _a = registry.subscribe(EventTag::Metrics, make("a"));
        let _b = registry.subscribe(EventTag::Metrics, make("b"));
        let _c = registry.subscribe(EventTag::Deployments, make("c"));

        assert_eq!(registry.dispatch(&ServerMessage::Metrics(vec![])), 2);
        assert_eq!(*log.lock(), vec!["a", "b"]);
    }

    #[test]
    fn test_no_replay_for_late_subscriber() {
        let registry = SubscriberRegistry::new();
        let (log, make) = recorder();

        for _ in 0..3 {
            registry.dispatch(&ServerMessage::Pipeline(None));
        }
        let _late = registry.subscribe(EventTag::Pipeline, make("late"));
        assert!(log.lock().is_empty());

        registry.dispatch(&ServerMessage::Pipeline(None));
        registry.dispatch(&ServerMessage::Pipeline(None));
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_listener() {
        let registry = SubscriberRegistry::new();
        let (log, make) = recorder();

        let a = registry.subscribe(EventTag::Metrics, make("a"));
        let _b = registry.subscribe(EventTag::Metrics, make("b"));
        a.unsubscribe();
        a.unsubscribe();

        registry.dispatch(&ServerMessage::Metrics(vec![]));
        assert_eq!(*log.lock(), vec!["b"]);
        assert_eq!(registry.listener_count(EventTag::Metrics), 1);
        assert!(!a.is_active());
    }

    #[test]
    fn test_last_unsubscribe_frees_tag() {
        let registry = SubscriberRegistry::new();
        let sub = registry.subscribe(EventTag::Web3Networks, |_| {});
        assert_eq!(registry.tag_count(), 1);

        sub.unsubscribe();
        assert_eq!(registry.tag_count(), 0);
    }

    #[test]
    fn test_unsubscribe_inside_own_callback() {
        let registry = SubscriberRegistry::new();
        let calls = Arc::new(AtomicU64::new(0));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let calls_clone = calls.clone();
        let slot_clone = slot.clone();
        let sub = registry.subscribe(EventTag::Alerts, move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = slot_clone.lock().as_ref() {
                sub.unsubscribe();
            }
        });
        *slot.lock() = Some(sub);

        let alert = ServerMessage::Alert(Alert::new("t", "m", Severity::Warning, "test"));
        registry.dispatch(&alert);
        registry.dispatch(&alert);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.listener_count(EventTag::Alerts), 0);
    }

    #[test]
    fn test_unsubscribe_of_later_listener_during_dispatch() {
        let registry = SubscriberRegistry::new();
        let (log, make) = recorder();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let slot_clone = slot.clone();
        let _first = registry.subscribe(EventTag::Metrics, move |_| {
            if let Some(sub) = slot_clone.lock().as_ref() {
                sub.unsubscribe();
            }
        });
        *slot.lock() = Some(registry.subscribe(EventTag::Metrics, make("second")));

        registry.dispatch(&ServerMessage::Metrics(vec![]));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_panicking_callback_is_isolated() {
        let registry = SubscriberRegistry::new();
        let (log, make) = recorder();

        let _bad = registry.subscribe(EventTag::Metrics, |_| panic!("listener bug"));
        let _good = registry.subscribe(EventTag::Metrics, make("good"));

        assert_eq!(registry.dispatch(&ServerMessage::Metrics(vec![])), 2);
        assert_eq!(*log.lock(), vec!["good"]);
    }

    #[test]
    fn test_pong_reaches_no_listener() {
        let registry = SubscriberRegistry::new();
        let _sub = registry.subscribe(EventTag::Metrics, |_| {});
        assert_eq!(registry.dispatch(&ServerMessage::Pong), 0);
    }
}

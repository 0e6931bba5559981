//! Synchronous fan-out of envelopes to registered subscribers.
//!
//! Subscribers are plain callbacks kept in registration order. `publish`
//! snapshots the registry and releases the lock before invoking anyone, so
//! a callback may subscribe or unsubscribe (itself included) without
//! deadlocking. Such changes take effect from the next publish.
//!
//! There is no buffer: a subscriber sees only envelopes published after it
//! registered.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lookout_core::Envelope;
use parking_lot::RwLock;
use tracing::{error, trace};

/// Subscriber callback. Receives a shared, read-only envelope.
pub type Subscriber = Arc<dyn Fn(&Arc<Envelope>) + Send + Sync>;

/// Handle returned by [`BroadcastHub::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Registry of envelope subscribers.
pub struct BroadcastHub {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriberId, Subscriber)>>,
    published: AtomicU64,
    failures: AtomicU64,
}

impl BroadcastHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
            published: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Register a callback. It is invoked after every previously registered
    /// subscriber.
    pub fn subscribe<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&Arc<Envelope>) + Send + Sync + 'static,
    {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, Arc::new(callback)));
        trace!(subscriber = %id, "subscribed");
        id
    }

    /// Remove a subscriber. Returns `false` if the handle was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subs = self.subscribers.write();
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        let removed = subs.len() != before;
        if removed {
            trace!(subscriber = %id, "unsubscribed");
        }
        removed
    }

    /// Deliver `envelope` to every current subscriber in registration order.
    ///
    /// A panicking subscriber is logged and counted; the remaining
    /// subscribers still receive the envelope. Returns how many callbacks
    /// completed normally.
    pub fn publish(&self, envelope: Arc<Envelope>) -> usize {
        let snapshot: Vec<(SubscriberId, Subscriber)> = self.subscribers.read().clone();
        let _ = self.published.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        for (id, callback) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(&envelope))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    let _ = self.failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        subscriber = %id,
                        kind = envelope.kind(),
                        panic = panic_message(payload.as_ref()),
                        "subscriber panicked"
                    );
                }
            }
        }
        delivered
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Envelopes published so far.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Subscriber invocations that panicked.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("subscribers", &self.subscriber_count())
            .field("published", &self.published_count())
            .field("failures", &self.failure_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_core::logging::capture_logs;
    use parking_lot::Mutex;
    use tracing::Level;

    fn frame(image: &str) -> Arc<Envelope> {
        Arc::new(Envelope::Frame(lookout_core::FramePayload {
            image: image.into(),
            stats: lookout_core::StatMap::new(),
            timestamp: None,
            narration: None,
        }))
    }

    fn status(message: &str) -> Arc<Envelope> {
        Arc::new(Envelope::Status {
            message: message.into(),
        })
    }

    #[test]
    fn delivers_in_registration_order() {
        let hub = BroadcastHub::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..5 {
            let order = Arc::clone(&order);
            let _ = hub.subscribe(move |_| order.lock().push(n));
        }
        assert_eq!(hub.publish(status("x")), 5);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn every_subscriber_sees_the_identical_envelope() {
        let hub = BroadcastHub::new();
        let seen: Arc<Mutex<Vec<Arc<Envelope>>>> = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..3 {
            let seen = Arc::clone(&seen);
            let _ = hub.subscribe(move |env| seen.lock().push(Arc::clone(env)));
        }
        let env = frame("img");
        let _ = hub.publish(Arc::clone(&env));

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|s| Arc::ptr_eq(s, &env)));
    }

    #[test]
    fn late_subscriber_gets_no_replay() {
        let hub = BroadcastHub::new();
        for n in 0..4 {
            let _ = hub.publish(frame(&n.to_string()));
        }
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let _ = hub.subscribe(move |_| {
            let _ = c.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(count.load(Ordering::Relaxed), 0);

        let _ = hub.publish(frame("next"));
        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(hub.published_count(), 5);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let hub = BroadcastHub::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let id = hub.subscribe(move |_| {
            let _ = c.fetch_add(1, Ordering::Relaxed);
        });
        let _ = hub.publish(status("a"));
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        let _ = hub.publish(status("b"));
        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn panicking_subscriber_is_isolated() {
        let (logs, _guard) = capture_logs();
        let hub = BroadcastHub::new();
        let after = Arc::new(AtomicU64::new(0));
        let _ = hub.subscribe(|_| panic!("render failed"));
        let a = Arc::clone(&after);
        let _ = hub.subscribe(move |_| {
            let _ = a.fetch_add(1, Ordering::Relaxed);
        });

        assert_eq!(hub.publish(status("x")), 1);
        assert_eq!(hub.publish(status("y")), 1);
        assert_eq!(after.load(Ordering::Relaxed), 2);
        assert_eq!(hub.failure_count(), 2);

        assert_eq!(logs.count_at_level(Level::ERROR), 2);
        assert!(logs.has_event(Level::ERROR, "subscriber panicked"));
        let event = logs
            .events()
            .into_iter()
            .find(|e| e.message.contains("subscriber panicked"))
            .unwrap();
        assert_eq!(event.field("panic"), Some("render failed"));
        assert_eq!(event.field("kind"), Some("status"));
    }

    #[test]
    fn subscriber_may_unsubscribe_itself_during_publish() {
        let hub = Arc::new(BroadcastHub::new());
        let slot: Arc<Mutex<Option<SubscriberId>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicU64::new(0));

        let (h, s, c) = (Arc::clone(&hub), Arc::clone(&slot), Arc::clone(&calls));
        let id = hub.subscribe(move |_| {
            let _ = c.fetch_add(1, Ordering::Relaxed);
            if let Some(id) = s.lock().take() {
                let _ = h.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);

        let _ = hub.publish(status("once"));
        let _ = hub.publish(status("twice"));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn subscribe_during_publish_applies_to_next_publish() {
        let hub = Arc::new(BroadcastHub::new());
        let late_calls = Arc::new(AtomicU64::new(0));
        let added = Arc::new(AtomicU64::new(0));

        let (h, l, a) = (Arc::clone(&hub), Arc::clone(&late_calls), Arc::clone(&added));
        let _ = hub.subscribe(move |_| {
            if a.fetch_add(1, Ordering::Relaxed) == 0 {
                let l = Arc::clone(&l);
                let _ = h.subscribe(move |_| {
                    let _ = l.fetch_add(1, Ordering::Relaxed);
                });
            }
        });

        let _ = hub.publish(status("first"));
        assert_eq!(late_calls.load(Ordering::Relaxed), 0);
        let _ = hub.publish(status("second"));
        assert_eq!(late_calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn panic_message_extracts_strings() {
        let s: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let s: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(s.as_ref()), "owned");
        let s: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(s.as_ref()), "<non-string panic>");
    }
}

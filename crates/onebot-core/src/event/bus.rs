//! In-process event fan-out.
//!
//! Transport adapters subscribe while they run. Broadcasting walks a
//! snapshot of the subscriber list, so adapters may subscribe or unsubscribe
//! concurrently with a broadcast without ever blocking it.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{trace, warn};

/// An event that has been validated and serialized for delivery.
///
/// The event is serialized once on push; every subscriber shares the same
/// document and JSON text.
#[derive(Debug, Clone)]
pub struct PushedEvent {
    name: String,
    value: Value,
    json: String,
}

impl PushedEvent {
    /// Serializes `event` under `name`.
    pub fn new<E: Serialize + ?Sized>(name: impl Into<String>, event: &E) -> serde_json::Result<Self> {
        let value = serde_json::to_value(event)?;
        let json = serde_json::to_string(&value)?;
        Ok(Self {
            name: name.into(),
            value,
            json,
        })
    }

    /// `type.detail_type`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The event as a generic document.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The event as JSON text.
    pub fn json(&self) -> &str {
        &self.json
    }
}

/// Receives broadcast events.
///
/// Called synchronously from the pushing task; implementations must hand
/// slow work (network sends) off to their own tasks.
pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, event: &Arc<PushedEvent>);
}

impl<F> EventSubscriber for F
where
    F: Fn(&Arc<PushedEvent>) + Send + Sync,
{
    fn on_event(&self, event: &Arc<PushedEvent>) {
        (self)(event)
    }
}

/// Identifies a subscription for [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// The subscriber registry.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<(SubscriptionId, Arc<dyn EventSubscriber>)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber; it receives every event broadcast from now on.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, subscriber));
        trace!(subscription = id.0, "Event subscriber added");
        id
    }

    /// Removes a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        let removed = subscribers.len() != before;
        if removed {
            trace!(subscription = id.0, "Event subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Delivers `event` to every current subscriber in subscription order.
    ///
    /// A panicking subscriber is logged and skipped; the remaining
    /// subscribers still receive the event. Returns the number of
    /// subscribers that accepted it.
    pub fn broadcast(&self, event: Arc<PushedEvent>) -> usize {
        let snapshot: Vec<Arc<dyn EventSubscriber>> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, subscriber)| Arc::clone(subscriber))
            .collect();

        let mut delivered = 0;
        for subscriber in snapshot {
            match catch_unwind(AssertUnwindSafe(|| subscriber.on_event(&event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(event = %event.name(), "Event subscriber panicked"),
            }
        }
        delivered
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

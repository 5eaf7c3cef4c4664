//! Transport adapter contract.
//!
//! Every transport ("comm method") is created and started in one step from
//! its config and a [`CommContext`], and is stopped through [`Comm::stop`].
//! The context carries everything an adapter shares with the instance: the
//! router for inbound actions and the bus for outbound events.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::action::ActionMux;
use crate::event::{EventBus, EventSubscriber, SubscriptionId};

/// A running transport adapter.
#[async_trait]
pub trait Comm: Send + Sync {
    /// Transport kind, e.g. `"http"`.
    fn kind(&self) -> &'static str;

    /// Human readable endpoint (listen address or target URL).
    fn endpoint(&self) -> String;

    /// Stops the adapter.
    ///
    /// Idempotent: only the first call does anything.
    async fn stop(&self);
}

/// Boxed transport adapter.
pub type BoxedComm = Box<dyn Comm>;

/// Shared instance state handed to every transport adapter.
#[derive(Clone)]
pub struct CommContext {
    platform: Arc<str>,
    router: Arc<ActionMux>,
    bus: Arc<EventBus>,
    access_token: Option<Arc<str>>,
}

impl CommContext {
    pub fn new(platform: impl Into<Arc<str>>, router: Arc<ActionMux>, bus: Arc<EventBus>) -> Self {
        Self {
            platform: platform.into(),
            router,
            bus,
            access_token: None,
        }
    }

    /// Sets the access token; an empty token disables authentication.
    pub fn with_access_token(mut self, token: Option<&str>) -> Self {
        self.access_token = token.filter(|t| !t.is_empty()).map(Arc::from);
        self
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn router(&self) -> &Arc<ActionMux> {
        &self.router
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Subscribes `subscriber` to the bus for the lifetime of the returned
    /// guard.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> Subscription {
        Subscription {
            bus: Arc::clone(&self.bus),
            id: Mutex::new(Some(self.bus.subscribe(subscriber))),
        }
    }
}

impl std::fmt::Debug for CommContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommContext")
            .field("platform", &self.platform)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

/// An event-bus subscription that is removed exactly once.
///
/// Removed on [`cancel`](Self::cancel) or on drop, whichever comes first.
#[derive(Debug)]
pub struct Subscription {
    bus: Arc<EventBus>,
    id: Mutex<Option<SubscriptionId>>,
}

impl Subscription {
    /// Unsubscribes. Returns `false` if this was already done.
    pub fn cancel(&self) -> bool {
        match self.id.lock().take() {
            Some(id) => self.bus.unsubscribe(id),
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

use std::sync::Arc;

use onebot_core::{ActionMux, EventSubscriber, PushedEvent};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::frame;

/// Outgoing frames buffered per connection.
pub(crate) const OUTGOING_CAPACITY: usize = 256;

/// A frame queued for a connection's send task.
#[derive(Debug)]
pub(crate) enum Outgoing {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// The connection events are delivered to.
///
/// Only one connection holds the slot; a newer connection replaces it.
#[derive(Default)]
pub(crate) struct PeerSlot {
    current: Mutex<Option<(u64, mpsc::Sender<Outgoing>)>>,
}

impl PeerSlot {
    pub(crate) fn replace(&self, conn_id: u64, tx: mpsc::Sender<Outgoing>) {
        if let Some((previous, _)) = self.current.lock().replace((conn_id, tx)) {
            debug!(previous, current = conn_id, "WebSocket event peer replaced");
        }
    }

    /// Clears the slot if `conn_id` still owns it.
    pub(crate) fn release(&self, conn_id: u64) {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|(id, _)| *id == conn_id) {
            *current = None;
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.current.lock().is_some()
    }
}

impl EventSubscriber for PeerSlot {
    fn on_event(&self, event: &Arc<PushedEvent>) {
        let tx = self.current.lock().as_ref().map(|(_, tx)| tx.clone());
        let Some(tx) = tx else {
            trace!(event = %event.name(), "No WebSocket peer, event skipped");
            return;
        };

        if let Err(e) = tx.try_send(Outgoing::Text(event.json().to_owned())) {
            warn!(event = %event.name(), error = %e, "Failed to queue event for WebSocket peer");
        }
    }
}

/// Runs one action frame on its own task and queues the response in the
/// same wire mode.
pub(crate) fn spawn_action(
    router: Arc<ActionMux>,
    tx: mpsc::Sender<Outgoing>,
    raw: Vec<u8>,
    binary: bool,
) {
    tokio::spawn(async move {
        let response = frame::handle_frame(&router, &raw, binary).await;
        let frame = if binary {
            Outgoing::Binary(response)
        } else {
            Outgoing::Text(String::from_utf8_lossy(&response).into_owned())
        };
        if tx.send(frame).await.is_err() {
            debug!("WebSocket connection closed before the action response was sent");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event() -> Arc<PushedEvent> {
        Arc::new(PushedEvent::new("meta.x", &json!({"detail_type": "x"})).unwrap())
    }

    #[test]
    fn test_skips_without_peer() {
        let slot = PeerSlot::default();
        assert!(!slot.is_connected());
        slot.on_event(&event());
    }

    #[test]
    fn test_latest_peer_wins() {
        let slot = PeerSlot::default();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        slot.replace(1, tx1);
        slot.replace(2, tx2);

        slot.on_event(&event());
        assert!(matches!(rx2.try_recv(), Ok(Outgoing::Text(_))));
        assert!(rx1.try_recv().is_err());

        // A stale connection closing does not clear the newer one.
        slot.release(1);
        assert!(slot.is_connected());
        slot.release(2);
        assert!(!slot.is_connected());
    }
}

//! Periodic `meta.heartbeat` events.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// A running heartbeat task.
pub(crate) struct Heartbeat {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Heartbeat {
    /// Calls `beat` every `interval`, starting one interval from now.
    pub(crate) fn spawn<F>(interval: Duration, beat: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        trace!("Heartbeat tick");
                        beat();
                    }
                }
            }
        });

        debug!(interval_ms = interval.as_millis() as u64, "Heartbeat started");
        Self { shutdown, task }
    }

    /// Returns `false` if the task had panicked.
    pub(crate) async fn stop(self) -> bool {
        self.shutdown.cancel();
        match self.task.await {
            Ok(()) => {
                debug!("Heartbeat stopped");
                true
            }
            Err(e) => {
                error!(error = %e, "Heartbeat task did not finish cleanly");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_beats_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let heartbeat = Heartbeat::spawn(Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(260)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        assert!(heartbeat.stop().await);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_reports_panicked_beat() {
        let heartbeat = Heartbeat::spawn(Duration::from_millis(10), || panic!("beat failed"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!heartbeat.stop().await);
    }
}

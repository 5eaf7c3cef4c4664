use tokio::task::JoinHandle;
use tracing::error;

/// Awaits a stopped background task. Returns `false` and logs if it panicked
/// or was aborted.
pub(crate) async fn join_task(task: JoinHandle<()>, name: &'static str) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            error!(task = name, error = %e, "Background task did not finish cleanly");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_reports_panics() {
        assert!(join_task(tokio::spawn(async {}), "ok").await);

        let crashed: JoinHandle<()> = tokio::spawn(async { panic!("server loop crashed") });
        assert!(!join_task(crashed, "crashed").await);
    }
}

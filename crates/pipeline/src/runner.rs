//! Detached background jobs with a shared shutdown token.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Spawns generation jobs off the request path and drains them on
/// shutdown.
///
/// Every job gets a child of the runner's root token, so
/// [`JobRunner::shutdown`] reaches jobs that are still waiting on a
/// provider.
#[derive(Debug, Clone, Default)]
pub struct JobRunner {
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl JobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner whose root token is a child of `parent`.
    pub fn with_parent(parent: &CancellationToken) -> Self {
        Self {
            tracker: TaskTracker::new(),
            cancel: parent.child_token(),
        }
    }

    /// A token cancelled when the runner shuts down.
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Number of jobs still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn spawn<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(job);
    }

    /// Stop accepting jobs, wait up to `grace` for the running ones, then
    /// cancel whatever is left and wait for it to unwind.
    ///
    /// Returns `true` if every job finished within the grace period.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        tracing::info!(pending, grace_secs = grace.as_secs(), "Draining generation jobs");

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            tracing::info!("All generation jobs finished");
            return true;
        }

        tracing::warn!(
            remaining = self.tracker.len(),
            "Grace period elapsed, cancelling generation jobs",
        );
        self.cancel.cancel();
        self.tracker.wait().await;
        false
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn shutdown_waits_for_quick_jobs() {
        let runner = JobRunner::new();
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        runner.spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            flag.store(true, Ordering::SeqCst);
        });

        assert!(runner.shutdown(Duration::from_secs(5)).await);
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(runner.in_flight(), 0);
    }

    #[tokio::test]
    async fn shutdown_cancels_slow_jobs_after_grace() {
        let runner = JobRunner::new();
        let token = runner.child_token();
        let observed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&observed);
        runner.spawn(async move {
            token.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        });

        assert!(!runner.shutdown(Duration::from_millis(20)).await);
        assert!(observed.load(Ordering::SeqCst));
        assert!(runner.is_shutting_down());
    }

    #[test]
    fn parent_cancellation_reaches_jobs() {
        let parent = CancellationToken::new();
        let runner = JobRunner::with_parent(&parent);
        let token = runner.child_token();
        parent.cancel();
        assert!(token.is_cancelled());
    }
}

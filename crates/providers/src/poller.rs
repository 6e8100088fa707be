//! Bounded polling of provider-side async tasks.
//!
//! [`TaskPoller::run`] waits one interval, polls, and repeats until the task
//! is terminal, the attempt budget is spent, or the [`CancellationToken`]
//! fires. With backoff enabled the interval doubles after every
//! non-terminal poll, up to a ceiling.

use std::future::Future;
use std::time::Duration;

use mediagate_core::generation::GenerationResult;
use mediagate_core::provider::ProviderConfig;
use mediagate_core::task::{AsyncTask, TaskStatus};
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;

/// Provider setting: seconds between polls.
pub const SETTING_POLL_INTERVAL: &str = "poll_interval_secs";
/// Provider setting: maximum number of polls.
pub const SETTING_MAX_ATTEMPTS: &str = "max_poll_attempts";
/// Provider setting: backoff ceiling in seconds. Setting it enables backoff.
pub const SETTING_MAX_INTERVAL: &str = "max_poll_interval_secs";

const DEFAULT_INTERVAL_SECS: u64 = 5;
const DEFAULT_MAX_ATTEMPTS: u32 = 120;

/// Poll cadence for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_attempts: u32,
    /// Backoff ceiling. `None` keeps a fixed interval.
    pub max_interval: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_interval: None,
        }
    }
}

impl PollerConfig {
    /// Read the poll settings of a provider, falling back to `defaults`.
    pub fn from_provider(provider: &ProviderConfig, defaults: PollerConfig) -> Self {
        let interval = provider
            .setting_u64(SETTING_POLL_INTERVAL)
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.interval);
        let max_attempts = provider
            .setting_u64(SETTING_MAX_ATTEMPTS)
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_attempts);
        let max_interval = provider
            .setting_u64(SETTING_MAX_INTERVAL)
            .map(Duration::from_secs)
            .or(defaults.max_interval)
            .map(|ceiling| ceiling.max(interval));

        Self {
            interval,
            max_attempts,
            max_interval,
        }
    }
}

/// Double `current`, clamped to `ceiling`.
pub fn next_interval(current: Duration, ceiling: Duration) -> Duration {
    current.saturating_mul(2).min(ceiling)
}

/// Runs the polling loop for one task at a time.
#[derive(Debug, Clone)]
pub struct TaskPoller {
    config: PollerConfig,
}

impl TaskPoller {
    pub fn new(config: PollerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Poll `task_id` until it is terminal.
    ///
    /// A failing `poll` call counts as an attempt and is retried within the
    /// budget. Returns [`ProviderError::AttemptsExhausted`] once
    /// `max_attempts` polls have been made without a terminal status.
    pub async fn run<F, Fut>(
        &self,
        task_id: &str,
        cancel: &CancellationToken,
        mut poll: F,
    ) -> Result<GenerationResult, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<AsyncTask, ProviderError>>,
    {
        let mut task = AsyncTask::new(task_id);
        let mut interval = self.config.interval;
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }
            if attempts >= self.config.max_attempts {
                tracing::warn!(task_id, attempts, "Poll budget exhausted");
                return Err(ProviderError::AttemptsExhausted {
                    task_id: task_id.to_string(),
                    attempts,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }

            attempts += 1;
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                polled = poll() => polled,
            };

            match polled {
                Ok(snapshot) => {
                    if task.apply(snapshot) {
                        tracing::debug!(
                            task_id,
                            attempt = attempts,
                            status = ?task.status,
                            "Task status changed",
                        );
                    }
                    if task.status.is_terminal() {
                        return finish(task);
                    }
                }
                Err(e) => {
                    tracing::warn!(task_id, attempt = attempts, error = %e, "Task poll failed");
                }
            }

            if let Some(ceiling) = self.config.max_interval {
                interval = next_interval(interval, ceiling);
            }
        }
    }
}

fn finish(task: AsyncTask) -> Result<GenerationResult, ProviderError> {
    match task.status {
        TaskStatus::Succeeded => {
            let result = task.result.ok_or_else(|| {
                ProviderError::Protocol(format!("task {} succeeded without output", task.id))
            })?;
            Ok(if result.task_id.is_some() {
                result
            } else {
                result.with_task_id(task.id)
            })
        }
        TaskStatus::Cancelled => Err(ProviderError::TaskFailed(
            task.error
                .unwrap_or_else(|| "task was cancelled by the provider".into()),
        )),
        _ => Err(ProviderError::TaskFailed(
            task.error.unwrap_or_else(|| "task failed".into()),
        )),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

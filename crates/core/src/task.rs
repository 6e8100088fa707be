//! Provider-side async task state.
//!
//! [`AsyncTask`] only lives inside one poller run; it is never persisted.
//! Status strings from providers are normalised through [`map_status`].

use serde::Serialize;

use crate::generation::GenerationResult;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Normalised lifecycle of a provider job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Position in the lifecycle; terminal states share the highest rank.
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Succeeded | Self::Failed | Self::Cancelled => 2,
        }
    }
}

/// Map a provider status string to a [`TaskStatus`].
///
/// Case-insensitive. Anything unrecognised is reported as
/// [`TaskStatus::Running`] so that new provider vocabulary keeps the task
/// alive instead of failing it.
pub fn map_status(raw: &str) -> TaskStatus {
    match raw.trim().to_ascii_lowercase().as_str() {
        "queued" | "in_queue" | "created" | "submitted" | "pending" | "queueing" | "waiting" => {
            TaskStatus::Pending
        }
        "running" | "processing" | "in_progress" | "preparing" | "generating" => {
            TaskStatus::Running
        }
        "success" | "succeeded" | "succeed" | "completed" | "done" | "ok" | "finished" => {
            TaskStatus::Succeeded
        }
        "failed" | "fail" | "failure" | "error" => TaskStatus::Failed,
        "cancelled" | "canceled" | "aborted" => TaskStatus::Cancelled,
        _ => TaskStatus::Running,
    }
}

// ---------------------------------------------------------------------------
// AsyncTask
// ---------------------------------------------------------------------------

/// Snapshot of a provider job as seen by the poller.
#[derive(Debug, Clone)]
pub struct AsyncTask {
    pub id: String,
    pub status: TaskStatus,
    pub result: Option<GenerationResult>,
    pub error: Option<String>,
    pub created_at: Timestamp,
}

impl AsyncTask {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_result(mut self, result: GenerationResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Fold a freshly polled snapshot into this task.
    ///
    /// Status only moves forward and never leaves a terminal state.
    /// Returns `true` if the status changed.
    pub fn apply(&mut self, snapshot: AsyncTask) -> bool {
        if self.status.is_terminal() || snapshot.status.rank() < self.status.rank() {
            return false;
        }

        let changed = snapshot.status != self.status;
        self.status = snapshot.status;
        if self.status.is_terminal() {
            self.result = snapshot.result;
            self.error = snapshot.error;
        }
        changed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_status_synonyms() {
        assert_eq!(map_status("queued"), TaskStatus::Pending);
        assert_eq!(map_status("IN_QUEUE"), TaskStatus::Pending);
        assert_eq!(map_status("created"), TaskStatus::Pending);
        assert_eq!(map_status("Queueing"), TaskStatus::Pending);
        assert_eq!(map_status("processing"), TaskStatus::Running);
        assert_eq!(map_status("done"), TaskStatus::Succeeded);
        assert_eq!(map_status(" succeed "), TaskStatus::Succeeded);
        assert_eq!(map_status("Success"), TaskStatus::Succeeded);
        assert_eq!(map_status("ok"), TaskStatus::Succeeded);
        assert_eq!(map_status("Fail"), TaskStatus::Failed);
        assert_eq!(map_status("canceled"), TaskStatus::Cancelled);
    }

    #[test]
    fn unknown_status_is_running() {
        assert_eq!(map_status("weird_value"), TaskStatus::Running);
        assert_eq!(map_status(""), TaskStatus::Running);
    }

    #[test]
    fn apply_moves_forward_only() {
        let mut task = AsyncTask::new("t1");
        assert!(task.apply(AsyncTask::new("t1").with_status(TaskStatus::Running)));
        assert!(!task.apply(AsyncTask::new("t1").with_status(TaskStatus::Pending)));
        assert_eq!(task.status, TaskStatus::Running);
    }

    #[test]
    fn terminal_state_is_sticky() {
        let mut task = AsyncTask::new("t1");
        task.apply(
            AsyncTask::new("t1")
                .with_status(TaskStatus::Failed)
                .with_error("boom"),
        );
        assert!(!task.apply(AsyncTask::new("t1").with_status(TaskStatus::Succeeded)));
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("boom"));
    }
}

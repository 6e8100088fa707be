//! Notification payloads.

use chrono::{DateTime, Utc};
use mediagate_core::types::DbId;
use serde::{Deserialize, Serialize};

/// Event name carried by every completion notification.
pub const EVENT_GENERATION_COMPLETED: &str = "generation_completed";

/// Outcome reported to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Success,
    Failure,
}

/// A completion notification for one usage record.
///
/// `error` carries the failure reason, or a non-fatal annotation (such as
/// an output that could not be persisted) on a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub event: String,
    pub record_id: DbId,
    pub status: CompletionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn generation_completed(
        record_id: DbId,
        status: CompletionStatus,
        error: Option<String>,
    ) -> Self {
        Self {
            event: EVENT_GENERATION_COMPLETED.to_string(),
            record_id,
            status,
            error: error.filter(|e| !e.is_empty()),
            timestamp: Utc::now(),
        }
    }

    pub fn success(record_id: DbId, annotation: Option<String>) -> Self {
        Self::generation_completed(record_id, CompletionStatus::Success, annotation)
    }

    pub fn failure(record_id: DbId, error: impl Into<String>) -> Self {
        Self::generation_completed(record_id, CompletionStatus::Failure, Some(error.into()))
    }
}

//! Usage records and the external collaborators the orchestrator consumes.
//!
//! A usage record is created before dispatch so callers can look it up
//! straight away, and mutated exactly once when the job finishes. All
//! mutations go through [`UsageRecordUpdate`], a partial update where
//! `None` means "leave the column alone".

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::provider::{ModelConfig, ProviderConfig};
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle of a usage record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    Processing,
    Succeeded,
    Failed,
}

impl UsageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for UsageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsageStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!(
                "Unknown usage status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Durable record of one generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: DbId,
    pub provider_id: DbId,
    pub model_id: DbId,
    pub client_id: Option<String>,
    pub prompt: String,
    pub tag_ids: Vec<DbId>,
    pub status: UsageStatus,
    pub input_media: Vec<String>,
    pub output_media: Vec<String>,
    pub output_text: Option<String>,
    pub error_text: Option<String>,
    /// Provider task identifier for async providers.
    pub external_task_code: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Fields required to create a usage record.
#[derive(Debug, Clone)]
pub struct CreateUsageRecord {
    pub provider_id: DbId,
    pub model_id: DbId,
    pub client_id: Option<String>,
    pub prompt: String,
    pub tag_ids: Vec<DbId>,
}

/// Partial update: only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageRecordUpdate {
    pub status: Option<UsageStatus>,
    pub input_media: Option<Vec<String>>,
    pub output_media: Option<Vec<String>>,
    pub output_text: Option<String>,
    pub error_text: Option<String>,
    pub external_task_code: Option<String>,
}

impl UsageRecordUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply this update to an in-memory record.
    pub fn apply_to(&self, record: &mut UsageRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(v) = &self.input_media {
            record.input_media = v.clone();
        }
        if let Some(v) = &self.output_media {
            record.output_media = v.clone();
        }
        if let Some(v) = &self.output_text {
            record.output_text = Some(v.clone());
        }
        if let Some(v) = &self.error_text {
            record.error_text = Some(v.clone());
        }
        if let Some(v) = &self.external_task_code {
            record.external_task_code = Some(v.clone());
        }
        record.updated_at = chrono::Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Read-only lookup of provider and model configuration.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn provider(&self, id: DbId) -> Result<Option<ProviderConfig>, CoreError>;
    async fn model(&self, id: DbId) -> Result<Option<ModelConfig>, CoreError>;
}

/// Durable sink for usage records.
#[async_trait]
pub trait UsageRecordSink: Send + Sync {
    async fn create(&self, input: &CreateUsageRecord) -> Result<DbId, CoreError>;
    async fn update(&self, id: DbId, update: &UsageRecordUpdate) -> Result<(), CoreError>;
    async fn find(&self, id: DbId) -> Result<Option<UsageRecord>, CoreError>;
}

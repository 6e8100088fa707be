//! Usage record entity model.

use mediagate_core::error::CoreError;
use mediagate_core::types::{DbId, Timestamp};
use mediagate_core::usage::{UsageRecord as DomainUsageRecord, UsageStatus};
use sqlx::FromRow;

/// A row from the `usage_records` table.
#[derive(Debug, Clone, FromRow)]
pub struct UsageRecord {
    pub id: DbId,
    pub provider_id: DbId,
    pub model_id: DbId,
    pub client_id: Option<String>,
    pub prompt: String,
    pub tag_ids: Vec<DbId>,
    pub status: String,
    pub input_media: Vec<String>,
    pub output_media: Vec<String>,
    pub output_text: Option<String>,
    pub error_text: Option<String>,
    pub external_task_code: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<UsageRecord> for DomainUsageRecord {
    type Error = CoreError;

    fn try_from(row: UsageRecord) -> Result<Self, Self::Error> {
        Ok(DomainUsageRecord {
            id: row.id,
            provider_id: row.provider_id,
            model_id: row.model_id,
            client_id: row.client_id,
            prompt: row.prompt,
            tag_ids: row.tag_ids,
            status: row.status.parse::<UsageStatus>()?,
            input_media: row.input_media,
            output_media: row.output_media,
            output_text: row.output_text,
            error_text: row.error_text,
            external_task_code: row.external_task_code,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

//! Repository for the `usage_records` table.
//!
//! A record is inserted as `processing` before dispatch and receives a
//! single partial update when the job finishes.

use mediagate_core::types::DbId;
use mediagate_core::usage::{CreateUsageRecord, UsageRecordUpdate, UsageStatus};
use sqlx::PgPool;

use crate::models::usage_record::UsageRecord;

/// Column list for `usage_records` queries.
const COLUMNS: &str = "\
    id, provider_id, model_id, client_id, prompt, tag_ids, status, \
    input_media, output_media, output_text, error_text, external_task_code, \
    created_at, updated_at";

/// Maximum page size for record listing.
const MAX_LIMIT: i64 = 100;

/// Provides CRUD operations for usage records.
pub struct UsageRecordRepo;

impl UsageRecordRepo {
    pub async fn create(
        pool: &PgPool,
        input: &CreateUsageRecord,
    ) -> Result<UsageRecord, sqlx::Error> {
        let query = format!(
            "INSERT INTO usage_records (provider_id, model_id, client_id, prompt, tag_ids, status) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UsageRecord>(&query)
            .bind(input.provider_id)
            .bind(input.model_id)
            .bind(&input.client_id)
            .bind(&input.prompt)
            .bind(&input.tag_ids)
            .bind(UsageStatus::Processing.as_str())
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<UsageRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM usage_records WHERE id = $1");
        sqlx::query_as::<_, UsageRecord>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Most recent records for one client, newest first.
    pub async fn list_by_client(
        pool: &PgPool,
        client_id: &str,
        limit: i64,
    ) -> Result<Vec<UsageRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM usage_records \
             WHERE client_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2"
        );
        sqlx::query_as::<_, UsageRecord>(&query)
            .bind(client_id)
            .bind(limit.clamp(1, MAX_LIMIT))
            .fetch_all(pool)
            .await
    }

    /// Apply a partial update. Only `Some` fields are written.
    ///
    /// Returns `None` if no row with the given `id` exists.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UsageRecordUpdate,
    ) -> Result<Option<UsageRecord>, sqlx::Error> {
        let query = format!(
            "UPDATE usage_records SET
                status = COALESCE($2, status),
                input_media = COALESCE($3, input_media),
                output_media = COALESCE($4, output_media),
                output_text = COALESCE($5, output_text),
                error_text = COALESCE($6, error_text),
                external_task_code = COALESCE($7, external_task_code)
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UsageRecord>(&query)
            .bind(id)
            .bind(input.status.map(UsageStatus::as_str))
            .bind(&input.input_media)
            .bind(&input.output_media)
            .bind(&input.output_text)
            .bind(&input.error_text)
            .bind(&input.external_task_code)
            .fetch_optional(pool)
            .await
    }
}

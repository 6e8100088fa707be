//! Repository for the `models` table.

use mediagate_core::generation::MediaKind;
use mediagate_core::types::DbId;
use sqlx::PgPool;

use crate::models::model::{CreateModel, Model};

/// Column list for `models` queries.
const COLUMNS: &str = "\
    id, provider_id, name, code, generation_mode, \
    input_modalities, output_modalities, supported_sizes, default_size, \
    supported_durations, default_duration, max_images, endpoint, \
    supports_stream, supports_cancel, created_at, updated_at";

/// Provides CRUD operations for models.
pub struct ModelRepo;

impl ModelRepo {
    pub async fn create(pool: &PgPool, input: &CreateModel) -> Result<Model, sqlx::Error> {
        let mut input_modalities: Vec<&str> =
            input.input_modalities.iter().map(|k| k.as_str()).collect();
        if input_modalities.is_empty() {
            input_modalities.push(MediaKind::Text.as_str());
        }
        let output_modalities: Vec<&str> =
            input.output_modalities.iter().map(|k| k.as_str()).collect();

        let query = format!(
            "INSERT INTO models (provider_id, name, code, generation_mode, \
                 input_modalities, output_modalities, supported_sizes, default_size, \
                 supported_durations, default_duration, max_images, endpoint, \
                 supports_stream, supports_cancel) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, COALESCE($11, 0), $12, $13, $14) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Model>(&query)
            .bind(input.provider_id)
            .bind(&input.name)
            .bind(&input.code)
            .bind(input.generation_mode.as_str())
            .bind(&input_modalities)
            .bind(&output_modalities)
            .bind(&input.supported_sizes)
            .bind(&input.default_size)
            .bind(&input.supported_durations)
            .bind(input.default_duration)
            .bind(input.max_images)
            .bind(&input.endpoint)
            .bind(input.supports_stream)
            .bind(input.supports_cancel)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Model>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM models WHERE id = $1");
        sqlx::query_as::<_, Model>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_by_provider(
        pool: &PgPool,
        provider_id: DbId,
    ) -> Result<Vec<Model>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM models WHERE provider_id = $1 ORDER BY name ASC");
        sqlx::query_as::<_, Model>(&query)
            .bind(provider_id)
            .fetch_all(pool)
            .await
    }
}

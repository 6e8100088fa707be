//! Repository for the `providers` table.

use mediagate_core::types::DbId;
use sqlx::PgPool;

use crate::models::provider::{CreateProvider, Provider, UpdateProvider};

/// Column list for `providers` queries.
const COLUMNS: &str = "id, name, driver, api_key, base_url, settings, is_active, created_at, updated_at";

/// Provides CRUD operations for providers.
pub struct ProviderRepo;

impl ProviderRepo {
    pub async fn create(pool: &PgPool, input: &CreateProvider) -> Result<Provider, sqlx::Error> {
        let query = format!(
            "INSERT INTO providers (name, driver, api_key, base_url, settings, is_active) \
             VALUES ($1, $2, $3, $4, COALESCE($5, '{{}}'::jsonb), COALESCE($6, TRUE)) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Provider>(&query)
            .bind(&input.name)
            .bind(&input.driver)
            .bind(&input.api_key)
            .bind(&input.base_url)
            .bind(&input.settings)
            .bind(input.is_active)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Provider>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM providers WHERE id = $1");
        sqlx::query_as::<_, Provider>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All providers, active ones first.
    pub async fn list(pool: &PgPool) -> Result<Vec<Provider>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM providers ORDER BY is_active DESC, name ASC");
        sqlx::query_as::<_, Provider>(&query).fetch_all(pool).await
    }

    /// Update a provider. Only non-`None` fields in `input` are applied.
    ///
    /// Returns `None` if no row with the given `id` exists.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateProvider,
    ) -> Result<Option<Provider>, sqlx::Error> {
        let query = format!(
            "UPDATE providers SET
                name = COALESCE($2, name),
                api_key = COALESCE($3, api_key),
                base_url = COALESCE($4, base_url),
                settings = COALESCE($5, settings),
                is_active = COALESCE($6, is_active)
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Provider>(&query)
            .bind(id)
            .bind(&input.name)
            .bind(&input.api_key)
            .bind(&input.base_url)
            .bind(&input.settings)
            .bind(input.is_active)
            .fetch_optional(pool)
            .await
    }
}

//! Postgres-backed [`ConfigStore`] and [`UsageRecordSink`].

use async_trait::async_trait;
use mediagate_core::error::CoreError;
use mediagate_core::provider::{ModelConfig, ProviderConfig};
use mediagate_core::types::DbId;
use mediagate_core::usage::{
    ConfigStore, CreateUsageRecord, UsageRecord, UsageRecordSink, UsageRecordUpdate,
};

use crate::repositories::{ModelRepo, ProviderRepo, UsageRecordRepo};
use crate::DbPool;

fn db_error(e: sqlx::Error) -> CoreError {
    tracing::error!(error = %e, "Database error");
    CoreError::Internal(format!("Database error: {e}"))
}

/// Reads providers and models straight from the database on every call.
#[derive(Clone)]
pub struct PgConfigStore {
    pool: DbPool,
}

impl PgConfigStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConfigStore for PgConfigStore {
    async fn provider(&self, id: DbId) -> Result<Option<ProviderConfig>, CoreError> {
        let row = ProviderRepo::find_by_id(&self.pool, id).await.map_err(db_error)?;
        Ok(row.map(ProviderConfig::from))
    }

    async fn model(&self, id: DbId) -> Result<Option<ModelConfig>, CoreError> {
        ModelRepo::find_by_id(&self.pool, id)
            .await
            .map_err(db_error)?
            .map(ModelConfig::try_from)
            .transpose()
    }
}

/// Usage records in the `usage_records` table.
#[derive(Clone)]
pub struct PgUsageRecordSink {
    pool: DbPool,
}

impl PgUsageRecordSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageRecordSink for PgUsageRecordSink {
    async fn create(&self, input: &CreateUsageRecord) -> Result<DbId, CoreError> {
        let row = UsageRecordRepo::create(&self.pool, input).await.map_err(db_error)?;
        Ok(row.id)
    }

    async fn update(&self, id: DbId, update: &UsageRecordUpdate) -> Result<(), CoreError> {
        if update.is_empty() {
            return Ok(());
        }
        UsageRecordRepo::update(&self.pool, id, update)
            .await
            .map_err(db_error)?
            .ok_or(CoreError::NotFound {
                entity: "UsageRecord",
                id,
            })?;
        Ok(())
    }

    async fn find(&self, id: DbId) -> Result<Option<UsageRecord>, CoreError> {
        UsageRecordRepo::find_by_id(&self.pool, id)
            .await
            .map_err(db_error)?
            .map(UsageRecord::try_from)
            .transpose()
    }
}

//! In-memory [`ConfigStore`] and [`UsageRecordSink`] implementations.
//!
//! Used by tests and by database-less deployments, where the catalog is
//! loaded once from a JSON file of the form
//! `{"providers": [...], "models": [...]}`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::CoreError;
use crate::provider::{ModelConfig, ProviderConfig};
use crate::types::DbId;
use crate::usage::{
    ConfigStore, CreateUsageRecord, UsageRecord, UsageRecordSink, UsageRecordUpdate, UsageStatus,
};

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    providers: Vec<ProviderConfig>,
    #[serde(default)]
    models: Vec<ModelConfig>,
}

/// Provider/model catalog held in memory.
#[derive(Default)]
pub struct InMemoryCatalog {
    providers: RwLock<HashMap<DbId, ProviderConfig>>,
    models: RwLock<HashMap<DbId, ModelConfig>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON catalog document.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let file: CatalogFile = serde_json::from_str(json)
            .map_err(|e| CoreError::Validation(format!("Invalid catalog JSON: {e}")))?;

        let catalog = Self::new();
        for provider in file.providers {
            catalog.insert_provider(provider);
        }
        for model in file.models {
            catalog.insert_model(model);
        }
        Ok(catalog)
    }

    /// Load a JSON catalog document from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            CoreError::Internal(format!("Failed to read catalog {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn insert_provider(&self, provider: ProviderConfig) {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.id, provider);
    }

    pub fn insert_model(&self, model: ModelConfig) {
        self.models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(model.id, model);
    }

    pub fn provider_count(&self) -> usize {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl ConfigStore for InMemoryCatalog {
    async fn provider(&self, id: DbId) -> Result<Option<ProviderConfig>, CoreError> {
        Ok(self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }

    async fn model(&self, id: DbId) -> Result<Option<ModelConfig>, CoreError> {
        Ok(self
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Usage records
// ---------------------------------------------------------------------------

/// Usage records held in memory with sequential ids starting at 1.
pub struct InMemoryUsageRecords {
    next_id: AtomicI64,
    records: Mutex<HashMap<DbId, UsageRecord>>,
}

impl InMemoryUsageRecords {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryUsageRecords {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsageRecordSink for InMemoryUsageRecords {
    async fn create(&self, input: &CreateUsageRecord) -> Result<DbId, CoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = chrono::Utc::now();
        let record = UsageRecord {
            id,
            provider_id: input.provider_id,
            model_id: input.model_id,
            client_id: input.client_id.clone(),
            prompt: input.prompt.clone(),
            tag_ids: input.tag_ids.clone(),
            status: UsageStatus::Processing,
            input_media: Vec::new(),
            output_media: Vec::new(),
            output_text: None,
            error_text: None,
            external_task_code: None,
            created_at: now,
            updated_at: now,
        };
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, record);
        Ok(id)
    }

    async fn update(&self, id: DbId, update: &UsageRecordUpdate) -> Result<(), CoreError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let record = records.get_mut(&id).ok_or(CoreError::NotFound {
            entity: "UsageRecord",
            id,
        })?;
        update.apply_to(record);
        Ok(())
    }

    async fn find(&self, id: DbId) -> Result<Option<UsageRecord>, CoreError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

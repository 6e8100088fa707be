//! Provider entity model and DTOs.

use mediagate_core::provider::ProviderConfig;
use mediagate_core::types::{DbId, Timestamp};
use serde::Deserialize;
use sqlx::FromRow;

/// A row from the `providers` table.
#[derive(Debug, Clone, FromRow)]
pub struct Provider {
    pub id: DbId,
    pub name: String,
    pub driver: String,
    pub api_key: String,
    pub base_url: String,
    /// NOT NULL in the database; defaults to `{}`.
    pub settings: serde_json::Value,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<Provider> for ProviderConfig {
    fn from(row: Provider) -> Self {
        let settings = match row.settings {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        ProviderConfig {
            id: row.id,
            name: row.name,
            driver: row.driver,
            api_key: row.api_key,
            base_url: row.base_url,
            settings,
            is_active: row.is_active,
        }
    }
}

/// DTO for creating a provider.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProvider {
    pub name: String,
    pub driver: String,
    pub api_key: String,
    pub base_url: String,
    pub settings: Option<serde_json::Value>,
    /// Defaults to `true` if omitted.
    pub is_active: Option<bool>,
}

/// DTO for updating a provider. All fields are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProvider {
    pub name: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub settings: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

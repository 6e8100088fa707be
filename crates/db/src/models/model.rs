//! Model entity model and DTOs.

use mediagate_core::error::CoreError;
use mediagate_core::generation::{GenerationMode, MediaKind};
use mediagate_core::provider::ModelConfig;
use mediagate_core::types::{DbId, Timestamp};
use serde::Deserialize;
use sqlx::FromRow;

/// A row from the `models` table.
#[derive(Debug, Clone, FromRow)]
pub struct Model {
    pub id: DbId,
    pub provider_id: DbId,
    pub name: String,
    pub code: String,
    pub generation_mode: String,
    pub input_modalities: Vec<String>,
    pub output_modalities: Vec<String>,
    pub supported_sizes: Vec<String>,
    pub default_size: Option<String>,
    pub supported_durations: Vec<i32>,
    pub default_duration: Option<i32>,
    pub max_images: i32,
    pub endpoint: Option<String>,
    pub supports_stream: bool,
    pub supports_cancel: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<Model> for ModelConfig {
    type Error = CoreError;

    fn try_from(row: Model) -> Result<Self, Self::Error> {
        Ok(ModelConfig {
            id: row.id,
            provider_id: row.provider_id,
            name: row.name,
            code: row.code,
            generation_mode: row.generation_mode.parse::<GenerationMode>()?,
            input_modalities: parse_kinds(&row.input_modalities)?,
            output_modalities: parse_kinds(&row.output_modalities)?,
            supported_sizes: row.supported_sizes,
            default_size: row.default_size,
            supported_durations: row
                .supported_durations
                .into_iter()
                .filter_map(|d| u32::try_from(d).ok())
                .collect(),
            default_duration: row.default_duration.and_then(|d| u32::try_from(d).ok()),
            max_images: u32::try_from(row.max_images).unwrap_or(0),
            endpoint: row.endpoint.filter(|e| !e.trim().is_empty()),
            supports_stream: row.supports_stream,
            supports_cancel: row.supports_cancel,
        })
    }
}

fn parse_kinds(values: &[String]) -> Result<Vec<MediaKind>, CoreError> {
    values.iter().map(|v| v.parse::<MediaKind>()).collect()
}

/// DTO for creating a model.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateModel {
    pub provider_id: DbId,
    pub name: String,
    pub code: String,
    pub generation_mode: GenerationMode,
    #[serde(default)]
    pub input_modalities: Vec<MediaKind>,
    #[serde(default)]
    pub output_modalities: Vec<MediaKind>,
    #[serde(default)]
    pub supported_sizes: Vec<String>,
    pub default_size: Option<String>,
    #[serde(default)]
    pub supported_durations: Vec<i32>,
    pub default_duration: Option<i32>,
    pub max_images: Option<i32>,
    pub endpoint: Option<String>,
    #[serde(default)]
    pub supports_stream: bool,
    #[serde(default)]
    pub supports_cancel: bool,
}

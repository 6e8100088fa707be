//! Provider and model configuration records.
//!
//! Both are owned by the external configuration store and treated as
//! read-only snapshots for the lifetime of a single request.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::generation::{GenerationMode, MediaKind};
use crate::types::DbId;

// ---------------------------------------------------------------------------
// ProviderConfig
// ---------------------------------------------------------------------------

/// Connection details for one external generation back-end.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: DbId,
    pub name: String,
    /// Driver tag used by the registry to pick an adapter constructor.
    pub driver: String,
    #[serde(default)]
    pub api_key: String,
    pub base_url: String,
    /// Free-form per-provider settings (poll cadence, secrets, flags).
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl ProviderConfig {
    /// Join `path` onto the provider's base URL with exactly one slash.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// A string setting, ignoring blank values.
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// A numeric setting. Accepts JSON numbers and numeric strings.
    pub fn setting_u64(&self, key: &str) -> Option<u64> {
        match self.settings.get(key)? {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// A boolean setting. Accepts JSON booleans and `"true"`/`"false"`.
    pub fn setting_bool(&self, key: &str) -> Option<bool> {
        match self.settings.get(key)? {
            serde_json::Value::Bool(b) => Some(*b),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

// Credentials stay out of logs.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("driver", &self.driver)
            .field("base_url", &self.base_url)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ModelConfig
// ---------------------------------------------------------------------------

/// A single generation model exposed by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: DbId,
    pub provider_id: DbId,
    pub name: String,
    /// Identifier sent to the provider (e.g. `"gemini-2.5-flash-image"`).
    pub code: String,
    pub generation_mode: GenerationMode,
    #[serde(default)]
    pub input_modalities: Vec<MediaKind>,
    #[serde(default)]
    pub output_modalities: Vec<MediaKind>,
    #[serde(default)]
    pub supported_sizes: Vec<String>,
    #[serde(default)]
    pub default_size: Option<String>,
    #[serde(default)]
    pub supported_durations: Vec<u32>,
    #[serde(default)]
    pub default_duration: Option<u32>,
    /// Upper bound on input images; `0` means unbounded.
    #[serde(default)]
    pub max_images: u32,
    /// Endpoint path override relative to the provider base URL.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub supports_stream: bool,
    #[serde(default)]
    pub supports_cancel: bool,
}

impl ModelConfig {
    /// The requested size, or the model default when none was given.
    pub fn effective_size(&self, requested: Option<&str>) -> Option<String> {
        requested
            .map(str::to_string)
            .or_else(|| self.default_size.clone())
    }

    /// The requested duration, or the model default when none was given.
    pub fn effective_duration(&self, requested: Option<u32>) -> Option<u32> {
        requested.or(self.default_duration)
    }

    /// Endpoint path for this model, falling back to the driver default.
    pub fn endpoint_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(fallback)
    }
}

impl FromStr for GenerationMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GenerationMode::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown generation mode '{s}'")))
    }
}

impl FromStr for MediaKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            other => Err(CoreError::Validation(format!("Unknown media kind '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(settings: serde_json::Value) -> ProviderConfig {
        ProviderConfig {
            id: 1,
            name: "test".into(),
            driver: "openai".into(),
            api_key: "sk-secret".into(),
            base_url: "https://api.example.com/v1/".into(),
            settings: settings.as_object().cloned().unwrap_or_default(),
            is_active: true,
        }
    }

    #[test]
    fn endpoint_joins_with_single_slash() {
        let p = provider(serde_json::json!({}));
        assert_eq!(
            p.endpoint("/chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn settings_accept_numbers_and_strings() {
        let p = provider(serde_json::json!({
            "poll_interval_secs": 3,
            "max_poll_attempts": "40",
            "watermark": "false",
            "blank": "  ",
        }));
        assert_eq!(p.setting_u64("poll_interval_secs"), Some(3));
        assert_eq!(p.setting_u64("max_poll_attempts"), Some(40));
        assert_eq!(p.setting_bool("watermark"), Some(false));
        assert_eq!(p.setting_str("blank"), None);
        assert_eq!(p.setting_u64("missing"), None);
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let p = provider(serde_json::json!({}));
        let rendered = format!("{p:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("openai"));
    }

    #[test]
    fn generation_mode_parses_from_db_name() {
        assert_eq!(
            "first_last_frame_to_video".parse::<GenerationMode>().unwrap(),
            GenerationMode::FirstLastFrameToVideo
        );
        assert!("sketch_to_3d".parse::<GenerationMode>().is_err());
    }
}

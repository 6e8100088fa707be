//! Volcengine Ark (Seedream) image generation with streamed frames.
//!
//! With `stream: true` the service emits one event per generated image:
//!
//! - `image_generation.partial_succeeded` carries `image_index` and either
//!   `url` or `b64_json`;
//! - `image_generation.partial_failed` carries `image_index` and an
//!   `error`; fatal codes stop the remaining frames;
//! - `image_generation.completed` closes the stream.
//!
//! Frames are returned in `image_index` order regardless of arrival order.

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use async_trait::async_trait;
use mediagate_core::generation::{
    Capabilities, GenerationRequest, GenerationResult, MediaKind, MediaOutput,
};
use mediagate_core::provider::{ModelConfig, ProviderConfig};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{require_api_key, require_base_url, AdapterContext, GenerationAdapter};
use crate::accumulator::StreamAccumulator;
use crate::error::ProviderError;
use crate::fields::first_string;
use crate::http;
use crate::media::normalize_reference;
use crate::sse::read_data_lines;

pub const DRIVER: &str = "ark_image";

const DEFAULT_ENDPOINT: &str = "images/generations";

/// Most images one sequential generation may produce.
const MAX_SEQUENTIAL_IMAGES: u32 = 15;

const EVENT_PARTIAL_SUCCEEDED: &str = "image_generation.partial_succeeded";
const EVENT_PARTIAL_FAILED: &str = "image_generation.partial_failed";
const EVENT_COMPLETED: &str = "image_generation.completed";

/// Error codes after which the service produces no further frames.
const FATAL_ERROR_CODES: &[&str] = &[
    "InternalServiceError",
    "ServiceUnavailable",
    "InputTextSensitiveContentDetected",
    "InputImageSensitiveContentDetected",
];

pub struct ArkImageAdapter {
    http: reqwest::Client,
    provider: ProviderConfig,
}

impl ArkImageAdapter {
    pub fn new(provider: &ProviderConfig, ctx: &AdapterContext) -> Result<Self, ProviderError> {
        require_base_url(provider)?;
        require_api_key(provider)?;
        Ok(Self {
            http: ctx.http.clone(),
            provider: provider.clone(),
        })
    }
}

pub fn build_payload(request: &GenerationRequest, model: &ModelConfig, watermark: bool) -> Value {
    let mut payload = json!({
        "model": model.code,
        "prompt": request.prompt,
        "stream": true,
        "response_format": "url",
        "watermark": watermark,
    });

    let images: Vec<String> = request
        .images()
        .map(|i| normalize_reference(&i.content))
        .collect();
    match images.len() {
        0 => {}
        1 => payload["image"] = json!(images[0]),
        _ => payload["image"] = json!(images),
    }

    if let Some(size) = model.effective_size(request.output.size.as_deref()) {
        payload["size"] = json!(size);
    }

    let count = request.output_count().min(MAX_SEQUENTIAL_IMAGES);
    if count > 1 {
        payload["sequential_image_generation"] = json!("auto");
        payload["sequential_image_generation_options"] = json!({"max_images": count});
    } else {
        payload["sequential_image_generation"] = json!("disabled");
    }
    payload
}

/// Collects frames by index plus per-frame diagnostics.
#[derive(Debug, Default)]
pub struct FrameCollector {
    frames: BTreeMap<u64, MediaOutput>,
    diagnostics: StreamAccumulator,
    next_index: u64,
}

impl FrameCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event. Breaks on completion or a fatal partial failure.
    pub fn apply_event(&mut self, event: &Value) -> Result<ControlFlow<()>, ProviderError> {
        if let Some(error) = event.get("error").filter(|_| event.get("type").is_none()) {
            return Err(ProviderError::Rejected {
                code: first_string(error, &["code"]).unwrap_or_else(|| "error".into()),
                message: first_string(error, &["message"]).unwrap_or_else(|| error.to_string()),
            });
        }

        let kind = event.get("type").and_then(Value::as_str).unwrap_or_default();
        let index = event
            .get("image_index")
            .and_then(Value::as_u64)
            .unwrap_or(self.next_index);
        self.next_index = self.next_index.max(index.saturating_add(1));

        match kind {
            EVENT_PARTIAL_SUCCEEDED => {
                let url = first_string(event, &["url"]).or_else(|| {
                    first_string(event, &["b64_json"]).map(|b64| normalize_reference(&b64))
                });
                match url {
                    Some(url) => {
                        self.frames.insert(index, MediaOutput::new(MediaKind::Image, url));
                    }
                    None => tracing::warn!(index, "Frame event without image payload"),
                }
                Ok(ControlFlow::Continue(()))
            }
            EVENT_PARTIAL_FAILED => {
                let code = first_string(event, &["error.code"]).unwrap_or_else(|| "unknown".into());
                let message = first_string(event, &["error.message"]).unwrap_or_default();
                self.diagnostics
                    .push_text(&format!("image {index} failed ({code}): {message}"));

                if FATAL_ERROR_CODES.contains(&code.as_str()) {
                    tracing::warn!(index, code = %code, "Fatal frame failure, stopping stream");
                    return Ok(ControlFlow::Break(()));
                }
                Ok(ControlFlow::Continue(()))
            }
            EVENT_COMPLETED => Ok(ControlFlow::Break(())),
            other => {
                tracing::debug!(event = other, "Ignoring stream event");
                Ok(ControlFlow::Continue(()))
            }
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Frames in index order, with diagnostics as text.
    pub fn finish(self) -> Result<GenerationResult, ProviderError> {
        let mut acc = self.diagnostics;
        for frame in self.frames.into_values() {
            acc.push_output(frame);
        }
        acc.finish()
    }
}

#[async_trait]
impl GenerationAdapter for ArkImageAdapter {
    fn driver(&self) -> &'static str {
        DRIVER
    }

    fn capabilities(&self, model: &ModelConfig) -> Capabilities {
        Capabilities {
            supports_stream: true,
            ..Capabilities::from_model(model)
        }
    }

    fn validate(
        &self,
        request: &GenerationRequest,
        model: &ModelConfig,
    ) -> Result<(), ProviderError> {
        mediagate_core::generation::validate_request(request, model)?;
        if request.output_count() > MAX_SEQUENTIAL_IMAGES {
            return Err(ProviderError::Validation(format!(
                "at most {MAX_SEQUENTIAL_IMAGES} images can be generated at once"
            )));
        }
        Ok(())
    }

    async fn generate_content(
        &self,
        request: &GenerationRequest,
        model: &ModelConfig,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, ProviderError> {
        let watermark = self.provider.setting_bool("watermark").unwrap_or(false);
        let payload = build_payload(request, model, watermark);
        tracing::debug!(
            provider_id = self.provider.id,
            model = %model.code,
            "Starting image stream",
        );

        let builder = self
            .http
            .post(self.provider.endpoint(model.endpoint_or(DEFAULT_ENDPOINT)))
            .bearer_auth(&self.provider.api_key)
            .json(&payload);
        let response = http::send(builder, cancel).await?;

        let mut frames = FrameCollector::new();
        read_data_lines(response, cancel, |data| match serde_json::from_str::<Value>(data) {
            Ok(event) => frames.apply_event(&event),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable stream event");
                Ok(ControlFlow::Continue(()))
            }
        })
        .await?;

        tracing::debug!(
            provider_id = self.provider.id,
            frames = frames.frame_count(),
            "Image stream finished",
        );
        frames.finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

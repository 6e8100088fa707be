//! Google Gemini `streamGenerateContent` over SSE.
//!
//! Input images are always sent inline, so remote references are fetched
//! first. Output parts are `text`, `inlineData` (turned into a data URL) or
//! `fileData` (a hosted URI).

use std::ops::ControlFlow;

use async_trait::async_trait;
use mediagate_core::generation::{
    Capabilities, GenerationRequest, GenerationResult, MediaKind, MediaOutput,
};
use mediagate_core::provider::{ModelConfig, ProviderConfig};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{
    is_aspect_ratio, require_api_key, require_base_url, AdapterContext, GenerationAdapter,
};
use crate::accumulator::StreamAccumulator;
use crate::error::ProviderError;
use crate::fields::{first_array, first_string, first_value};
use crate::http;
use crate::media::{MediaResolver, ResolvedMedia};
use crate::sse::read_data_lines;

pub const DRIVER: &str = "gemini";

pub struct GeminiAdapter {
    http: reqwest::Client,
    media: MediaResolver,
    provider: ProviderConfig,
}

impl GeminiAdapter {
    pub fn new(provider: &ProviderConfig, ctx: &AdapterContext) -> Result<Self, ProviderError> {
        require_base_url(provider)?;
        require_api_key(provider)?;
        Ok(Self {
            http: ctx.http.clone(),
            media: ctx.media.clone(),
            provider: provider.clone(),
        })
    }

    fn stream_url(&self, model: &ModelConfig) -> String {
        let default = format!("models/{}:streamGenerateContent?alt=sse", model.code);
        self.provider.endpoint(model.endpoint_or(&default))
    }
}

/// Request body. `images` are the already-resolved input images.
pub fn build_payload(
    request: &GenerationRequest,
    model: &ModelConfig,
    images: &[ResolvedMedia],
) -> Value {
    let mut parts = vec![json!({"text": request.prompt})];
    parts.extend(images.iter().map(|image| {
        json!({"inline_data": {"mime_type": image.mime, "data": image.to_base64()}})
    }));

    let mut generation_config = json!({"responseModalities": ["TEXT", "IMAGE"]});
    if let Some(size) = model.effective_size(request.output.size.as_deref()) {
        if is_aspect_ratio(&size) {
            generation_config["imageConfig"] = json!({"aspectRatio": size});
        }
    }
    if request.output_count() > 1 {
        generation_config["candidateCount"] = json!(request.output_count());
    }

    json!({
        "contents": [{"role": "user", "parts": parts}],
        "generationConfig": generation_config,
    })
}

/// Fold one streamed `GenerateContentResponse` into `acc`.
pub fn apply_chunk(chunk: &Value, acc: &mut StreamAccumulator) -> Result<(), ProviderError> {
    if let Some(error) = chunk.get("error").filter(|e| !e.is_null()) {
        return Err(ProviderError::Rejected {
            code: first_string(error, &["status", "code"]).unwrap_or_else(|| "error".into()),
            message: first_string(error, &["message"]).unwrap_or_else(|| error.to_string()),
        });
    }
    let block_reason = first_string(
        chunk,
        &["promptFeedback.blockReason", "prompt_feedback.block_reason"],
    );
    if let Some(reason) = block_reason {
        return Err(ProviderError::Rejected {
            code: reason,
            message: "prompt was blocked by the provider".into(),
        });
    }
    if let Some(id) = first_string(chunk, &["responseId", "response_id"]) {
        acc.set_request_id(&id);
    }

    for candidate in first_array(chunk, &["candidates"]) {
        let mut text = String::new();
        for part in first_array(candidate, &["content.parts"]) {
            if part.get("thought").and_then(Value::as_bool) == Some(true) {
                continue;
            }
            if let Some(t) = part.get("text").and_then(Value::as_str) {
                text.push_str(t);
            }
            if let Some(inline) = first_value(part, &["inlineData", "inline_data"]) {
                let mime = first_string(inline, &["mimeType", "mime_type"])
                    .unwrap_or_else(|| crate::media::DEFAULT_MIME.into());
                if let Some(data) = first_string(inline, &["data"]) {
                    acc.push_output(
                        MediaOutput::new(kind_of(&mime), format!("data:{mime};base64,{data}"))
                            .with_mime(mime),
                    );
                }
            }
            if let Some(file) = first_value(part, &["fileData", "file_data"]) {
                if let Some(uri) = first_string(file, &["fileUri", "file_uri"]) {
                    let mut output = MediaOutput::new(MediaKind::Image, uri);
                    if let Some(mime) = first_string(file, &["mimeType", "mime_type"]) {
                        output = MediaOutput { kind: kind_of(&mime), ..output }.with_mime(mime);
                    }
                    acc.push_output(output);
                }
            }
        }
        acc.push_text(&text);
    }
    Ok(())
}

fn kind_of(mime: &str) -> MediaKind {
    if mime.starts_with("video/") {
        MediaKind::Video
    } else if mime.starts_with("audio/") {
        MediaKind::Audio
    } else {
        MediaKind::Image
    }
}

#[async_trait]
impl GenerationAdapter for GeminiAdapter {
    fn driver(&self) -> &'static str {
        DRIVER
    }

    fn capabilities(&self, model: &ModelConfig) -> Capabilities {
        Capabilities {
            supports_stream: true,
            ..Capabilities::from_model(model)
        }
    }

    async fn generate_content(
        &self,
        request: &GenerationRequest,
        model: &ModelConfig,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, ProviderError> {
        let references: Vec<&str> = request.images().map(|i| i.content.as_str()).collect();
        let batch = self.media.resolve_batch(&references).await;
        if let Some((_, err)) = batch.errors.into_iter().next() {
            return Err(err.into());
        }
        let images: Vec<ResolvedMedia> = batch.resolved.into_iter().map(|(_, m)| m).collect();

        let payload = build_payload(request, model, &images);
        tracing::debug!(
            provider_id = self.provider.id,
            model = %model.code,
            images = images.len(),
            "Starting Gemini stream",
        );

        let builder = self
            .http
            .post(self.stream_url(model))
            .header("x-goog-api-key", &self.provider.api_key)
            .json(&payload);
        let response = http::send(builder, cancel).await?;

        let mut acc = StreamAccumulator::new();
        read_data_lines(response, cancel, |data| {
            match serde_json::from_str::<Value>(data) {
                Ok(chunk) => apply_chunk(&chunk, &mut acc)?,
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable stream chunk"),
            }
            Ok(ControlFlow::Continue(()))
        })
        .await?;

        acc.finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

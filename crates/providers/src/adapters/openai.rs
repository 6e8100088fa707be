//! OpenAI-compatible chat completions with streamed image output.
//!
//! Used for gateways that expose image models through `chat/completions`
//! (OpenRouter and friends). Text arrives in `choices[].delta.content`,
//! images in `choices[].delta.images[].image_url.url`.

use std::ops::ControlFlow;

use async_trait::async_trait;
use mediagate_core::generation::{Capabilities, GenerationRequest, GenerationResult};
use mediagate_core::provider::{ModelConfig, ProviderConfig};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{require_api_key, require_base_url, AdapterContext, GenerationAdapter};
use crate::accumulator::StreamAccumulator;
use crate::error::ProviderError;
use crate::fields::{first_array, first_string};
use crate::http;
use crate::media::normalize_reference;
use crate::sse::read_data_lines;

pub const DRIVER: &str = "openai";

const DEFAULT_ENDPOINT: &str = "chat/completions";

pub struct OpenAiAdapter {
    http: reqwest::Client,
    provider: ProviderConfig,
}

impl OpenAiAdapter {
    pub fn new(provider: &ProviderConfig, ctx: &AdapterContext) -> Result<Self, ProviderError> {
        require_base_url(provider)?;
        require_api_key(provider)?;
        Ok(Self {
            http: ctx.http.clone(),
            provider: provider.clone(),
        })
    }
}

/// Request body for a streamed chat completion.
pub fn build_payload(request: &GenerationRequest, model: &ModelConfig) -> Value {
    let mut content = vec![json!({"type": "text", "text": request.prompt})];
    content.extend(request.images().map(|image| {
        json!({
            "type": "image_url",
            "image_url": {"url": normalize_reference(&image.content)},
        })
    }));

    let mut payload = json!({
        "model": model.code,
        "stream": true,
        "modalities": ["image", "text"],
        "messages": [{"role": "user", "content": content}],
    });
    if let Some(size) = model.effective_size(request.output.size.as_deref()) {
        payload["size"] = json!(size);
    }
    if request.output_count() > 1 {
        payload["n"] = json!(request.output_count());
    }
    payload
}

/// Fold one decoded chunk (streamed `delta` or complete `message`) into
/// `acc`.
pub fn apply_chunk(chunk: &Value, acc: &mut StreamAccumulator) -> Result<(), ProviderError> {
    if let Some(error) = chunk.get("error").filter(|e| !e.is_null()) {
        let message = first_string(error, &["message", "metadata.raw"])
            .or_else(|| error.as_str().map(str::to_string))
            .unwrap_or_else(|| error.to_string());
        let code = first_string(error, &["code", "type"]).unwrap_or_else(|| "stream_error".into());
        return Err(ProviderError::Rejected { code, message });
    }
    if let Some(id) = first_string(chunk, &["id"]) {
        acc.set_request_id(&id);
    }

    for choice in first_array(chunk, &["choices"]) {
        let Some(body) = choice.get("delta").or_else(|| choice.get("message")) else {
            continue;
        };

        let mut text = String::new();
        match body.get("content") {
            Some(Value::String(s)) => text.push_str(s),
            Some(Value::Array(parts)) => {
                for part in parts {
                    match part.get("type").and_then(Value::as_str) {
                        Some("text") => {
                            text.push_str(part.get("text").and_then(Value::as_str).unwrap_or(""))
                        }
                        Some("image_url") => {
                            if let Some(url) = first_string(part, &["image_url.url", "image_url"]) {
                                acc.push_image(&url);
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        acc.push_text(&text);

        for image in first_array(body, &["images"]) {
            if let Some(url) = first_string(image, &["image_url.url", "url", "b64_json"]) {
                acc.push_image(&normalize_reference(&url));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl GenerationAdapter for OpenAiAdapter {
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
        let url = self.provider.endpoint(model.endpoint_or(DEFAULT_ENDPOINT));
        let payload = build_payload(request, model);
        tracing::debug!(
            provider_id = self.provider.id,
            model = %model.code,
            "Starting chat completion stream",
        );

        let builder = self
            .http
            .post(url)
            .bearer_auth(&self.provider.api_key)
            .json(&payload);
        let response = http::send(builder, cancel).await?;

        let mut acc = StreamAccumulator::new();
        if http::is_json(&response) {
            // Some gateways ignore `stream: true` and answer in one piece.
            let body: Value = http::parse_response(response).await?;
            apply_chunk(&body, &mut acc)?;
            return acc.finish();
        }

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

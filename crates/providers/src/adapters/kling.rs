//! Kling image and video generation (submit-and-poll).
//!
//! Authentication is a short-lived HS256 token signed from the provider's
//! access key (`api_key`) and `settings.secret_key`. Images are sent as raw
//! base64 without a data-URL prefix. Responses wrap everything in
//! `{"code", "message", "data"}`; a non-zero `code` is a rejection.

use async_trait::async_trait;
use mediagate_core::generation::{
    validate_request, Capabilities, GenerationMode, GenerationRequest, GenerationResult, MediaKind,
    MediaOutput,
};
use mediagate_core::provider::{ModelConfig, ProviderConfig};
use mediagate_core::task::{map_status, AsyncTask, TaskStatus};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{
    is_aspect_ratio, require_api_key, require_base_url, AdapterContext, GenerationAdapter,
};
use crate::auth::sign_access_token;
use crate::error::ProviderError;
use crate::fields::{first_array, first_string};
use crate::http;
use crate::media::MediaResolver;
use crate::poller::{PollerConfig, TaskPoller};

pub const DRIVER: &str = "kling";

/// Provider setting holding the signing secret.
pub const SETTING_SECRET_KEY: &str = "secret_key";
/// Provider setting selecting the quality mode (`std` or `pro`).
pub const SETTING_MODE: &str = "mode";

const DEFAULT_MODE: &str = "std";
const MAX_MULTI_IMAGES: usize = 4;

/// Endpoint path for a generation mode.
pub fn endpoint_for(mode: GenerationMode) -> &'static str {
    match mode {
        GenerationMode::TextToImage | GenerationMode::ImageToImage => "v1/images/generations",
        GenerationMode::TextToVideo => "v1/videos/text2video",
        GenerationMode::ImageToVideo | GenerationMode::FirstLastFrameToVideo => {
            "v1/videos/image2video"
        }
        GenerationMode::ReferenceToVideo => "v1/videos/multi-image2video",
    }
}

/// Input images already converted to raw base64.
#[derive(Debug, Default, Clone)]
pub struct KlingImages {
    pub first: Option<String>,
    pub tail: Option<String>,
    pub references: Vec<String>,
}

pub fn build_payload(
    request: &GenerationRequest,
    model: &ModelConfig,
    quality_mode: &str,
    images: &KlingImages,
) -> Value {
    let mode = model.generation_mode;
    let mut payload = json!({
        "model_name": model.code,
        "prompt": request.prompt,
    });

    if let Some(size) = model.effective_size(request.output.size.as_deref()) {
        if is_aspect_ratio(&size) {
            payload["aspect_ratio"] = json!(size);
        }
    }

    if mode.produces_video() {
        payload["mode"] = json!(quality_mode);
        if let Some(duration) = model.effective_duration(request.output.duration) {
            payload["duration"] = json!(duration.to_string());
        }
    } else {
        payload["n"] = json!(request.output_count());
    }

    match mode {
        GenerationMode::ReferenceToVideo => {
            let list: Vec<Value> = images
                .references
                .iter()
                .map(|image| json!({"image": image}))
                .collect();
            payload["image_list"] = json!(list);
        }
        _ => {
            if let Some(first) = &images.first {
                payload["image"] = json!(first);
            }
            if mode == GenerationMode::FirstLastFrameToVideo {
                if let Some(tail) = &images.tail {
                    payload["image_tail"] = json!(tail);
                }
            }
        }
    }
    payload
}

/// Fail on a non-zero envelope `code`.
pub fn check_envelope(body: &Value) -> Result<(), ProviderError> {
    match body.get("code").and_then(Value::as_i64) {
        Some(0) | None => Ok(()),
        Some(code) => Err(ProviderError::Rejected {
            code: code.to_string(),
            message: first_string(body, &["message"]).unwrap_or_default(),
        }),
    }
}

/// Interpret a submit or query response.
pub fn parse_task(body: &Value, fallback_id: &str) -> AsyncTask {
    let id = first_string(body, &["data.task_id"]).unwrap_or_else(|| fallback_id.to_string());
    let status = map_status(&first_string(body, &["data.task_status"]).unwrap_or_default());
    let mut task = AsyncTask::new(id.clone()).with_status(status);

    if let Some(message) = first_string(body, &["data.task_status_msg"]) {
        task = task.with_error(message);
    }

    let mut result = GenerationResult::default().with_task_id(id);
    result.request_id = first_string(body, &["request_id"]);
    for video in first_array(body, &["data.task_result.videos"]) {
        if let Some(url) = first_string(video, &["url"]) {
            result.push_output(MediaOutput::new(MediaKind::Video, url).with_mime("video/mp4"));
        }
    }
    for image in first_array(body, &["data.task_result.images"]) {
        if let Some(url) = first_string(image, &["url"]) {
            result.push_output(MediaOutput::new(MediaKind::Image, url));
        }
    }
    if !result.outputs.is_empty() {
        task = task.with_result(result);
    }
    task
}

pub struct KlingAdapter {
    http: reqwest::Client,
    media: MediaResolver,
    provider: ProviderConfig,
    secret_key: String,
    poller: TaskPoller,
}

impl KlingAdapter {
    pub fn new(provider: &ProviderConfig, ctx: &AdapterContext) -> Result<Self, ProviderError> {
        require_base_url(provider)?;
        require_api_key(provider)?;
        let secret_key = provider
            .setting_str(SETTING_SECRET_KEY)
            .ok_or_else(|| {
                ProviderError::Config(format!(
                    "provider '{}' needs settings.{SETTING_SECRET_KEY}",
                    provider.name
                ))
            })?
            .to_string();

        Ok(Self {
            http: ctx.http.clone(),
            media: ctx.media.clone(),
            provider: provider.clone(),
            secret_key,
            poller: TaskPoller::new(PollerConfig::from_provider(
                provider,
                ctx.poll_defaults.clone(),
            )),
        })
    }

    fn token(&self) -> Result<String, ProviderError> {
        sign_access_token(&self.provider.api_key, &self.secret_key)
    }

    async fn collect_images(
        &self,
        request: &GenerationRequest,
        mode: GenerationMode,
    ) -> Result<KlingImages, ProviderError> {
        let mut images = KlingImages::default();
        match mode {
            GenerationMode::ReferenceToVideo => {
                for image in request.images().take(MAX_MULTI_IMAGES) {
                    images.references.push(self.media.raw_base64(&image.content).await?);
                }
            }
            _ => {
                let (first, tail) = request.frame_pair();
                if let Some(first) = first {
                    images.first = Some(self.media.raw_base64(&first.content).await?);
                }
                if mode == GenerationMode::FirstLastFrameToVideo {
                    if let Some(tail) = tail {
                        images.tail = Some(self.media.raw_base64(&tail.content).await?);
                    }
                }
            }
        }
        Ok(images)
    }

    async fn query(
        &self,
        path: &str,
        task_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AsyncTask, ProviderError> {
        let builder = self
            .http
            .get(self.provider.endpoint(&format!("{path}/{task_id}")))
            .bearer_auth(self.token()?);
        let body: Value = http::send_json(builder, cancel).await?;
        check_envelope(&body)?;
        Ok(parse_task(&body, task_id))
    }
}

#[async_trait]
impl GenerationAdapter for KlingAdapter {
    fn driver(&self) -> &'static str {
        DRIVER
    }

    fn capabilities(&self, model: &ModelConfig) -> Capabilities {
        Capabilities {
            supports_async: true,
            ..Capabilities::from_model(model)
        }
    }

    fn validate(
        &self,
        request: &GenerationRequest,
        model: &ModelConfig,
    ) -> Result<(), ProviderError> {
        validate_request(request, model)?;
        if model.generation_mode == GenerationMode::FirstLastFrameToVideo
            && request.image_count() < 2
        {
            return Err(ProviderError::Validation(
                "first/last frame generation needs two images".into(),
            ));
        }
        Ok(())
    }

    async fn generate_content(
        &self,
        request: &GenerationRequest,
        model: &ModelConfig,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, ProviderError> {
        let mode = model.generation_mode;
        let path = model.endpoint_or(endpoint_for(mode));
        let quality_mode = self.provider.setting_str(SETTING_MODE).unwrap_or(DEFAULT_MODE);

        let images = self.collect_images(request, mode).await?;
        let payload = build_payload(request, model, quality_mode, &images);

        let builder = self
            .http
            .post(self.provider.endpoint(path))
            .bearer_auth(self.token()?)
            .json(&payload);
        let body: Value = http::send_json(builder, cancel).await?;
        check_envelope(&body)?;

        let submitted = parse_task(&body, "");
        if submitted.id.is_empty() {
            return Err(ProviderError::Protocol(format!(
                "submit response has no task id: {body}"
            )));
        }
        if submitted.status.is_terminal() {
            return match (submitted.status, submitted.result) {
                (TaskStatus::Succeeded, Some(result)) => Ok(result),
                _ => Err(ProviderError::TaskFailed(
                    submitted.error.unwrap_or_else(|| "task failed on submit".into()),
                )),
            };
        }

        let task_id = submitted.id;
        tracing::info!(provider_id = self.provider.id, task_id = %task_id, "Kling task submitted");
        self.poller
            .run(&task_id, cancel, || self.query(path, &task_id, cancel))
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! MiniMax image and video generation.
//!
//! Images are synchronous: `v1/image_generation` answers with the final
//! URLs. Videos are submit-and-poll: `v1/video_generation` returns a task
//! id, `v1/query/video_generation` reports its status, and a finished task
//! only carries a `file_id` that `v1/files/retrieve` turns into a download
//! URL. Every response has a `base_resp.status_code`; non-zero is an error.

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
use crate::error::ProviderError;
use crate::fields::{first_array, first_string};
use crate::http;
use crate::media::normalize_reference;
use crate::poller::{PollerConfig, TaskPoller};

pub const DRIVER: &str = "minimax";

const IMAGE_ENDPOINT: &str = "v1/image_generation";
const VIDEO_ENDPOINT: &str = "v1/video_generation";
const VIDEO_QUERY_ENDPOINT: &str = "v1/query/video_generation";
const FILE_RETRIEVE_ENDPOINT: &str = "v1/files/retrieve";

/// Most images one image request may produce.
const MAX_IMAGE_COUNT: u32 = 9;

/// Fail on a non-zero `base_resp.status_code`.
pub fn check_base_resp(body: &Value) -> Result<(), ProviderError> {
    let code = body
        .get("base_resp")
        .and_then(|b| b.get("status_code"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    if code == 0 {
        return Ok(());
    }
    Err(ProviderError::Rejected {
        code: code.to_string(),
        message: first_string(body, &["base_resp.status_msg"]).unwrap_or_default(),
    })
}

pub fn build_image_payload(request: &GenerationRequest, model: &ModelConfig) -> Value {
    let mut payload = json!({
        "model": model.code,
        "prompt": request.prompt,
        "response_format": "url",
        "n": request.output_count().min(MAX_IMAGE_COUNT),
    });
    if let Some(size) = model.effective_size(request.output.size.as_deref()) {
        if is_aspect_ratio(&size) {
            payload["aspect_ratio"] = json!(size);
        }
    }
    if let Some(reference) = request.images().next() {
        payload["subject_reference"] = json!([{
            "type": "character",
            "image_file": normalize_reference(&reference.content),
        }]);
    }
    payload
}

pub fn build_video_payload(request: &GenerationRequest, model: &ModelConfig) -> Value {
    let mut payload = json!({
        "model": model.code,
        "prompt": request.prompt,
    });
    if let Some(duration) = model.effective_duration(request.output.duration) {
        payload["duration"] = json!(duration);
    }
    if let Some(size) = model.effective_size(request.output.size.as_deref()) {
        payload["resolution"] = json!(size);
    }

    match model.generation_mode {
        GenerationMode::ReferenceToVideo => {
            let images: Vec<String> = request
                .images()
                .map(|i| normalize_reference(&i.content))
                .collect();
            if !images.is_empty() {
                payload["subject_reference"] = json!([{"type": "character", "image": images}]);
            }
        }
        GenerationMode::ImageToVideo | GenerationMode::FirstLastFrameToVideo => {
            let (first, last) = request.frame_pair();
            if let Some(first) = first {
                payload["first_frame_image"] = json!(normalize_reference(&first.content));
            }
            if model.generation_mode == GenerationMode::FirstLastFrameToVideo {
                if let Some(last) = last {
                    payload["last_frame_image"] = json!(normalize_reference(&last.content));
                }
            }
        }
        _ => {}
    }
    payload
}

/// Image URLs (or base64 payloads) from a synchronous image response.
pub fn parse_image_response(body: &Value) -> Result<GenerationResult, ProviderError> {
    check_base_resp(body)?;

    let mut result = GenerationResult {
        request_id: first_string(body, &["id"]),
        ..Default::default()
    };
    for url in first_array(body, &["data.image_urls"]) {
        if let Some(url) = url.as_str() {
            result.push_output(MediaOutput::new(MediaKind::Image, url));
        }
    }
    for b64 in first_array(body, &["data.image_base64"]) {
        if let Some(b64) = b64.as_str() {
            result.push_output(
                MediaOutput::new(MediaKind::Image, normalize_reference(b64)).with_mime("image/png"),
            );
        }
    }

    if result.outputs.is_empty() {
        return Err(ProviderError::NoImageInResponse { text: String::new() });
    }
    Ok(result)
}

/// Status and `file_id` from a video query response.
pub fn parse_video_status(body: &Value, task_id: &str) -> (TaskStatus, Option<String>) {
    let status = map_status(&first_string(body, &["status"]).unwrap_or_default());
    let file_id = first_string(body, &["file_id"]);
    if status == TaskStatus::Succeeded && file_id.is_none() {
        tracing::warn!(task_id, "Video task succeeded without a file_id");
    }
    (status, file_id)
}

pub struct MinimaxAdapter {
    http: reqwest::Client,
    provider: ProviderConfig,
    poller: TaskPoller,
}

impl MinimaxAdapter {
    pub fn new(provider: &ProviderConfig, ctx: &AdapterContext) -> Result<Self, ProviderError> {
        require_base_url(provider)?;
        require_api_key(provider)?;
        Ok(Self {
            http: ctx.http.clone(),
            provider: provider.clone(),
            poller: TaskPoller::new(PollerConfig::from_provider(
                provider,
                ctx.poll_defaults.clone(),
            )),
        })
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<Value, ProviderError> {
        let builder = self
            .http
            .get(self.provider.endpoint(path))
            .query(query)
            .bearer_auth(&self.provider.api_key);
        let body: Value = http::send_json(builder, cancel).await?;
        check_base_resp(&body)?;
        Ok(body)
    }

    async fn generate_image(
        &self,
        request: &GenerationRequest,
        model: &ModelConfig,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, ProviderError> {
        let builder = self
            .http
            .post(self.provider.endpoint(model.endpoint_or(IMAGE_ENDPOINT)))
            .bearer_auth(&self.provider.api_key)
            .json(&build_image_payload(request, model));
        let body: Value = http::send_json(builder, cancel).await?;
        parse_image_response(&body)
    }

    async fn query_video(
        &self,
        task_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AsyncTask, ProviderError> {
        let body = self
            .get_json(VIDEO_QUERY_ENDPOINT, &[("task_id", task_id)], cancel)
            .await?;
        let (status, file_id) = parse_video_status(&body, task_id);
        let mut task = AsyncTask::new(task_id).with_status(status);

        match (status, file_id) {
            (TaskStatus::Succeeded, Some(file_id)) => {
                let url = self.retrieve_file(&file_id, cancel).await?;
                let mut result = GenerationResult::default().with_task_id(task_id);
                result.push_output(MediaOutput::new(MediaKind::Video, url).with_mime("video/mp4"));
                task = task.with_result(result);
            }
            (TaskStatus::Succeeded, None) => {
                task = task
                    .with_status(TaskStatus::Failed)
                    .with_error("task finished without a file_id");
            }
            (TaskStatus::Failed, _) => {
                task = task.with_error(
                    first_string(&body, &["error_message", "base_resp.status_msg"])
                        .unwrap_or_else(|| "video generation failed".into()),
                );
            }
            _ => {}
        }
        Ok(task)
    }

    async fn retrieve_file(
        &self,
        file_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let body = self
            .get_json(FILE_RETRIEVE_ENDPOINT, &[("file_id", file_id)], cancel)
            .await?;
        first_string(&body, &["file.download_url", "file.backup_download_url"])
            .ok_or_else(|| ProviderError::Protocol(format!("file {file_id} has no download URL")))
    }
}

#[async_trait]
impl GenerationAdapter for MinimaxAdapter {
    fn driver(&self) -> &'static str {
        DRIVER
    }

    fn capabilities(&self, model: &ModelConfig) -> Capabilities {
        Capabilities {
            supports_async: model.generation_mode.produces_video(),
            ..Capabilities::from_model(model)
        }
    }

    fn validate(
        &self,
        request: &GenerationRequest,
        model: &ModelConfig,
    ) -> Result<(), ProviderError> {
        validate_request(request, model)?;
        if !model.generation_mode.produces_video() && request.image_count() > 1 {
            return Err(ProviderError::Validation(
                "image generation accepts a single subject reference".into(),
            ));
        }
        if request.output_count() > MAX_IMAGE_COUNT {
            return Err(ProviderError::Validation(format!(
                "at most {MAX_IMAGE_COUNT} images can be generated at once"
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
        if !model.generation_mode.produces_video() {
            return self.generate_image(request, model, cancel).await;
        }

        let builder = self
            .http
            .post(self.provider.endpoint(model.endpoint_or(VIDEO_ENDPOINT)))
            .bearer_auth(&self.provider.api_key)
            .json(&build_video_payload(request, model));
        let body: Value = http::send_json(builder, cancel).await?;
        check_base_resp(&body)?;

        let task_id = first_string(&body, &["task_id"]).ok_or_else(|| {
            ProviderError::Protocol(format!("submit response has no task_id: {body}"))
        })?;
        tracing::info!(
            provider_id = self.provider.id,
            task_id = %task_id,
            "MiniMax video task submitted",
        );

        self.poller
            .run(&task_id, cancel, || self.query_video(&task_id, cancel))
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

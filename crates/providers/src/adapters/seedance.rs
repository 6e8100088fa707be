//! Volcengine Ark Seedance video generation (submit-and-poll).
//!
//! `POST contents/generations/tasks` returns a task id; the task is then
//! polled at `GET contents/generations/tasks/{id}` until it reaches
//! `succeeded`, `failed` or `cancelled`.
//!
//! How input images are sent depends on the model family and the number of
//! images supplied, see [`select_input_shape`].

use async_trait::async_trait;
use mediagate_core::generation::{
    validate_request, Capabilities, GenerationRequest, GenerationResult, MediaInput, MediaKind,
    MediaOutput,
};
use mediagate_core::provider::{ModelConfig, ProviderConfig};
use mediagate_core::task::{map_status, AsyncTask};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{
    is_aspect_ratio, require_api_key, require_base_url, AdapterContext, GenerationAdapter,
};
use crate::error::ProviderError;
use crate::fields::first_string;
use crate::http;
use crate::media::normalize_reference;
use crate::poller::{PollerConfig, TaskPoller};

pub const DRIVER: &str = "seedance";

const TASKS_ENDPOINT: &str = "contents/generations/tasks";

/// Most reference images a reference-capable model accepts.
pub const MAX_REFERENCE_IMAGES: usize = 4;

// ---------------------------------------------------------------------------
// Input shape
// ---------------------------------------------------------------------------

/// How input images are attached to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputShape {
    /// Prompt only; any images are ignored.
    TextOnly,
    /// One image used as the first frame.
    FirstFrame,
    /// Two images used as first and last frame.
    FirstLastFrame,
    /// Up to [`MAX_REFERENCE_IMAGES`] reference images.
    References(usize),
}

/// Choose the input shape for `model_code` given `image_count` images.
///
/// | model family     | 0    | 1           | 2                | 3+                    |
/// |------------------|------|-------------|------------------|-----------------------|
/// | `*-t2v`          | text | text        | text             | text                  |
/// | `*-lite-i2v`     | text | first frame | first+last frame | references (max 4)    |
/// | anything else    | text | first frame | first+last frame | first+last frame      |
pub fn select_input_shape(model_code: &str, image_count: usize) -> InputShape {
    let code = model_code.to_ascii_lowercase();
    if image_count == 0 || code.ends_with("-t2v") || code.contains("-t2v-") {
        return InputShape::TextOnly;
    }
    match image_count {
        1 => InputShape::FirstFrame,
        2 => InputShape::FirstLastFrame,
        n if code.contains("lite-i2v") => InputShape::References(n.min(MAX_REFERENCE_IMAGES)),
        _ => InputShape::FirstLastFrame,
    }
}

fn image_item(image: &MediaInput, role: &str) -> Value {
    json!({
        "type": "image_url",
        "image_url": {"url": normalize_reference(&image.content)},
        "role": role,
    })
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Prompt with the inline generation flags Seedance reads from the text.
fn prompt_with_flags(request: &GenerationRequest, model: &ModelConfig, watermark: bool) -> String {
    let mut prompt = request.prompt.trim().to_string();
    if let Some(size) = model.effective_size(request.output.size.as_deref()) {
        if is_aspect_ratio(&size) {
            prompt.push_str(&format!(" --ratio {size}"));
        } else {
            prompt.push_str(&format!(" --resolution {size}"));
        }
    }
    if let Some(duration) = model.effective_duration(request.output.duration) {
        prompt.push_str(&format!(" --duration {duration}"));
    }
    prompt.push_str(&format!(" --watermark {watermark}"));
    prompt
}

pub fn build_payload(request: &GenerationRequest, model: &ModelConfig, watermark: bool) -> Value {
    let mut content = vec![json!({
        "type": "text",
        "text": prompt_with_flags(request, model, watermark),
    })];

    match select_input_shape(&model.code, request.image_count()) {
        InputShape::TextOnly => {}
        InputShape::FirstFrame => {
            if let (Some(first), _) = request.frame_pair() {
                content.push(image_item(first, "first_frame"));
            }
        }
        InputShape::FirstLastFrame => {
            let (first, last) = request.frame_pair();
            if let Some(first) = first {
                content.push(image_item(first, "first_frame"));
            }
            if let Some(last) = last {
                content.push(image_item(last, "last_frame"));
            }
        }
        InputShape::References(n) => {
            content.extend(request.images().take(n).map(|i| image_item(i, "reference_image")));
        }
    }

    json!({"model": model.code, "content": content})
}

/// Interpret a task query response.
pub fn parse_task(body: &Value, fallback_id: &str) -> AsyncTask {
    let id = first_string(body, &["id", "task_id"]).unwrap_or_else(|| fallback_id.to_string());
    let status = map_status(&first_string(body, &["status"]).unwrap_or_default());
    let mut task = AsyncTask::new(id.clone()).with_status(status);

    if let Some(error) = first_string(body, &["error.message", "error.code"]) {
        task = task.with_error(error);
    }
    if let Some(url) = first_string(body, &["content.video_url", "content.url"]) {
        let mut result = GenerationResult::default().with_task_id(id);
        result.push_output(MediaOutput::new(MediaKind::Video, url).with_mime("video/mp4"));
        if let Some(frame) = first_string(body, &["content.last_frame_url"]) {
            result.push_output(MediaOutput::new(MediaKind::Image, frame));
        }
        task = task.with_result(result);
    }
    task
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct SeedanceAdapter {
    http: reqwest::Client,
    provider: ProviderConfig,
    poller: TaskPoller,
}

impl SeedanceAdapter {
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

    async fn submit(
        &self,
        payload: &Value,
        model: &ModelConfig,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let builder = self
            .http
            .post(self.provider.endpoint(model.endpoint_or(TASKS_ENDPOINT)))
            .bearer_auth(&self.provider.api_key)
            .json(payload);
        let body: Value = http::send_json(builder, cancel).await?;

        first_string(&body, &["id", "task_id", "data.id"]).ok_or_else(|| {
            ProviderError::Protocol(format!("submit response has no task id: {body}"))
        })
    }

    async fn query(
        &self,
        task_id: &str,
        model: &ModelConfig,
        cancel: &CancellationToken,
    ) -> Result<AsyncTask, ProviderError> {
        let url = self
            .provider
            .endpoint(&format!("{}/{task_id}", model.endpoint_or(TASKS_ENDPOINT)));
        let builder = self.http.get(url).bearer_auth(&self.provider.api_key);
        let body: Value = http::send_json(builder, cancel).await?;
        Ok(parse_task(&body, task_id))
    }
}

#[async_trait]
impl GenerationAdapter for SeedanceAdapter {
    fn driver(&self) -> &'static str {
        DRIVER
    }

    fn capabilities(&self, model: &ModelConfig) -> Capabilities {
        let base = Capabilities::from_model(model);
        Capabilities {
            max_images: if base.max_images == 0 {
                MAX_REFERENCE_IMAGES as u32
            } else {
                base.max_images
            },
            supports_async: true,
            ..base
        }
    }

    fn validate(
        &self,
        request: &GenerationRequest,
        model: &ModelConfig,
    ) -> Result<(), ProviderError> {
        validate_request(request, model)?;
        if request.image_count() > MAX_REFERENCE_IMAGES {
            return Err(ProviderError::Validation(format!(
                "at most {MAX_REFERENCE_IMAGES} images are accepted"
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

        let task_id = self.submit(&payload, model, cancel).await?;
        tracing::info!(
            provider_id = self.provider.id,
            task_id = %task_id,
            "Seedance task submitted",
        );

        self.poller
            .run(&task_id, cancel, || self.query(&task_id, model, cancel))
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use mediagate_core::generation::{GenerationMode, MediaRole};
    use mediagate_core::task::TaskStatus;

    use super::*;
    use crate::adapters::testing;

    #[test]
    fn input_shape_table() {
        let cases = [
            ("doubao-seedance-1-0-pro-250528", 0, InputShape::TextOnly),
            ("doubao-seedance-1-0-pro-250528", 1, InputShape::FirstFrame),
            ("doubao-seedance-1-0-pro-250528", 2, InputShape::FirstLastFrame),
            ("doubao-seedance-1-0-pro-250528", 4, InputShape::FirstLastFrame),
            ("doubao-seedance-1-0-lite-t2v-250428", 2, InputShape::TextOnly),
            ("doubao-seedance-1-0-lite-i2v-250428", 1, InputShape::FirstFrame),
            ("doubao-seedance-1-0-lite-i2v-250428", 2, InputShape::FirstLastFrame),
            ("doubao-seedance-1-0-lite-i2v-250428", 3, InputShape::References(3)),
            ("doubao-seedance-1-0-lite-i2v-250428", 6, InputShape::References(4)),
            ("Doubao-Seedance-1-0-Lite-I2V", 3, InputShape::References(3)),
        ];
        for (code, count, expected) in cases {
            assert_eq!(select_input_shape(code, count), expected, "{code} with {count} images");
        }
    }

    #[test]
    fn explicit_roles_override_submission_order() {
        let mut request = GenerationRequest::new(10, "a sunrise");
        request.inputs.push(MediaInput::image("https://x/end.png").with_role(MediaRole::LastFrame));
        request.inputs.push(MediaInput::image("https://x/start.png"));
        let model = testing::model("doubao-seedance-1-0-pro-250528", GenerationMode::FirstLastFrameToVideo);

        let payload = build_payload(&request, &model, false);
        let content = payload["content"].as_array().unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(content[1]["role"], "first_frame");
        assert_eq!(content[1]["image_url"]["url"], "https://x/start.png");
        assert_eq!(content[2]["role"], "last_frame");
        assert_eq!(content[2]["image_url"]["url"], "https://x/end.png");
    }

    #[test]
    fn reference_images_are_inlined_as_data_urls() {
        let mut request = GenerationRequest::new(10, "a dance");
        for _ in 0..3 {
            request.inputs.push(MediaInput::image("QUJD"));
        }
        let model = testing::model("doubao-seedance-1-0-lite-i2v-250428", GenerationMode::ReferenceToVideo);

        let payload = build_payload(&request, &model, false);
        let content = payload["content"].as_array().unwrap();
        assert_eq!(content.len(), 4);
        assert!(content[1..].iter().all(|c| c["role"] == "reference_image"));
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,QUJD");
    }

    #[test]
    fn prompt_carries_generation_flags() {
        let mut request = GenerationRequest::new(10, "waves ");
        request.output.size = Some("16:9".into());
        request.output.duration = Some(10);
        let model = testing::model("doubao-seedance-1-0-pro-250528", GenerationMode::TextToVideo);

        let payload = build_payload(&request, &model, true);
        assert_eq!(
            payload["content"][0]["text"],
            "waves --ratio 16:9 --duration 10 --watermark true"
        );
    }

    #[test]
    fn task_fixtures_are_normalised() {
        let running: Value = serde_json::from_str(r#"{"id":"cgt-1","status":"running"}"#).unwrap();
        let task = parse_task(&running, "cgt-1");
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.result.is_none());

        let done: Value = serde_json::from_str(
            r#"{"id":"cgt-1","status":"succeeded","content":{"video_url":"https://v/1.mp4"}}"#,
        )
        .unwrap();
        let task = parse_task(&done, "cgt-1");
        assert_eq!(task.status, TaskStatus::Succeeded);
        let result = task.result.unwrap();
        assert_eq!(result.outputs[0].kind, MediaKind::Video);
        assert_eq!(result.task_id.as_deref(), Some("cgt-1"));

        let failed: Value = serde_json::from_str(
            r#"{"id":"cgt-1","status":"failed","error":{"code":"OutputVideoSensitiveContentDetected","message":"policy"}}"#,
        )
        .unwrap();
        let task = parse_task(&failed, "cgt-1");
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("policy"));
    }

    #[test]
    fn capabilities_report_async() {
        let adapter = SeedanceAdapter::new(
            &testing::provider(DRIVER, serde_json::json!({})),
            &testing::context(),
        )
        .unwrap();
        let caps = adapter.capabilities(&testing::model("m", GenerationMode::ImageToVideo));
        assert!(caps.supports_async);
        assert_eq!(caps.max_images, 4);
    }
}

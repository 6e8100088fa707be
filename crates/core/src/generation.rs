//! Generation request/result shapes, capabilities, and request validation.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::provider::ModelConfig;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of media carried by an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Text,
    Image,
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

/// What an input image is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaRole {
    #[default]
    Reference,
    FirstFrame,
    LastFrame,
}

/// How a model turns inputs into outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    TextToImage,
    ImageToImage,
    TextToVideo,
    ImageToVideo,
    FirstLastFrameToVideo,
    ReferenceToVideo,
}

impl GenerationMode {
    pub const ALL: [GenerationMode; 6] = [
        Self::TextToImage,
        Self::ImageToImage,
        Self::TextToVideo,
        Self::ImageToVideo,
        Self::FirstLastFrameToVideo,
        Self::ReferenceToVideo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextToImage => "text_to_image",
            Self::ImageToImage => "image_to_image",
            Self::TextToVideo => "text_to_video",
            Self::ImageToVideo => "image_to_video",
            Self::FirstLastFrameToVideo => "first_last_frame_to_video",
            Self::ReferenceToVideo => "reference_to_video",
        }
    }

    /// Whether at least one input image is mandatory.
    pub fn requires_image(self) -> bool {
        !matches!(self, Self::TextToImage | Self::TextToVideo)
    }

    pub fn produces_video(self) -> bool {
        !matches!(self, Self::TextToImage | Self::ImageToImage)
    }

    /// Media kind of the primary output.
    pub fn output_kind(self) -> MediaKind {
        if self.produces_video() {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One typed media input. `content` is a URL, a data URL, or bare base64.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInput {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub content: String,
    #[serde(default)]
    pub role: MediaRole,
}

impl MediaInput {
    pub fn image(content: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Image,
            content: content.into(),
            role: MediaRole::Reference,
        }
    }

    pub fn with_role(mut self, role: MediaRole) -> Self {
        self.role = role;
        self
    }
}

/// Output shaping options; unset fields fall back to model defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub count: Option<u32>,
}

/// A single "generate content" request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model_id: DbId,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub inputs: Vec<MediaInput>,
    #[serde(default)]
    pub output: OutputConfig,
    /// Used only to route the completion notification.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Opaque to the core; passed through to the usage record.
    #[serde(default)]
    pub tag_ids: Vec<DbId>,
}

impl GenerationRequest {
    pub fn new(model_id: DbId, prompt: impl Into<String>) -> Self {
        Self {
            model_id,
            prompt: prompt.into(),
            inputs: Vec::new(),
            output: OutputConfig::default(),
            client_id: None,
            tag_ids: Vec::new(),
        }
    }

    /// Image inputs in submission order.
    pub fn images(&self) -> impl Iterator<Item = &MediaInput> {
        self.inputs.iter().filter(|i| i.kind == MediaKind::Image)
    }

    pub fn image_count(&self) -> usize {
        self.images().count()
    }

    /// First image explicitly tagged with `role`.
    pub fn image_with_role(&self, role: MediaRole) -> Option<&MediaInput> {
        self.images().find(|i| i.role == role)
    }

    /// First and last frame images: explicit roles win, untagged images
    /// fill the gaps in submission order.
    pub fn frame_pair(&self) -> (Option<&MediaInput>, Option<&MediaInput>) {
        let mut untagged = self.images().filter(|i| i.role == MediaRole::Reference);
        let first = self
            .image_with_role(MediaRole::FirstFrame)
            .or_else(|| untagged.next());
        let last = self
            .image_with_role(MediaRole::LastFrame)
            .or_else(|| untagged.next());
        (first.or_else(|| self.images().next()), last)
    }

    /// Requested output count, at least one.
    pub fn output_count(&self) -> u32 {
        self.output.count.unwrap_or(1).max(1)
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// One generated asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaOutput {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    /// Remote URL, data URL, or storage locator.
    pub url: String,
    #[serde(default)]
    pub mime: Option<String>,
}

impl MediaOutput {
    pub fn new(kind: MediaKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            mime: None,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

/// Unified result every adapter produces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub outputs: Vec<MediaOutput>,
    #[serde(default)]
    pub text: Option<String>,
    /// Provider-side job identifier for async providers.
    #[serde(default)]
    pub task_id: Option<String>,
    /// Provider-side request identifier, when one is reported.
    #[serde(default)]
    pub request_id: Option<String>,
}

impl GenerationResult {
    /// Append an output unless one with the same locator already exists.
    ///
    /// Returns `true` when the output was added.
    pub fn push_output(&mut self, output: MediaOutput) -> bool {
        if output.url.is_empty() || self.outputs.iter().any(|o| o.url == output.url) {
            return false;
        }
        self.outputs.push(output);
        true
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// What an adapter can do with a given model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub input_modalities: Vec<MediaKind>,
    pub output_modalities: Vec<MediaKind>,
    pub max_images: u32,
    pub supported_sizes: Vec<String>,
    pub supported_durations: Vec<u32>,
    pub supports_stream: bool,
    pub supports_cancel: bool,
    pub supports_async: bool,
}

impl Capabilities {
    /// Baseline capabilities declared by the model record itself.
    pub fn from_model(model: &ModelConfig) -> Self {
        let output_modalities = if model.output_modalities.is_empty() {
            vec![model.generation_mode.output_kind()]
        } else {
            model.output_modalities.clone()
        };
        Self {
            input_modalities: model.input_modalities.clone(),
            output_modalities,
            max_images: model.max_images,
            supported_sizes: model.supported_sizes.clone(),
            supported_durations: model.supported_durations.clone(),
            supports_stream: model.supports_stream,
            supports_cancel: model.supports_cancel,
            supports_async: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check a request against the model it targets.
///
/// Rejects a blank prompt, a missing reference image for image-driven
/// modes, too many images, zero outputs, and sizes/durations outside the
/// model's declared lists (empty lists accept anything).
pub fn validate_request(request: &GenerationRequest, model: &ModelConfig) -> Result<(), CoreError> {
    if request.prompt.trim().is_empty() {
        return Err(CoreError::Validation("prompt is required".into()));
    }

    let images = request.image_count();
    if model.generation_mode.requires_image() && images == 0 {
        return Err(CoreError::Validation(format!(
            "model '{}' ({}) requires at least one reference image",
            model.code,
            model.generation_mode.as_str()
        )));
    }
    if model.max_images > 0 && images > model.max_images as usize {
        return Err(CoreError::Validation(format!(
            "model '{}' accepts at most {} images, got {images}",
            model.code, model.max_images
        )));
    }
    if request.inputs.iter().any(|i| i.content.trim().is_empty()) {
        return Err(CoreError::Validation("media input content is empty".into()));
    }

    if request.output.count == Some(0) {
        return Err(CoreError::Validation("output count must be at least 1".into()));
    }
    if let Some(size) = request.output.size.as_deref() {
        if !model.supported_sizes.is_empty() && !model.supported_sizes.iter().any(|s| s == size) {
            return Err(CoreError::Validation(format!(
                "size '{size}' is not supported. Must be one of: {}",
                model.supported_sizes.join(", ")
            )));
        }
    }
    if let Some(duration) = request.output.duration {
        if !model.supported_durations.is_empty() && !model.supported_durations.contains(&duration) {
            return Err(CoreError::Validation(format!(
                "duration {duration}s is not supported. Must be one of: {:?}",
                model.supported_durations
            )));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

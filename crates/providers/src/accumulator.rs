//! Folding streamed chunks into one [`GenerationResult`].

use mediagate_core::generation::{GenerationResult, MediaKind, MediaOutput};

use crate::error::ProviderError;
use crate::media::mime_of_data_url;

/// Collects text fragments and image locators from an event stream.
///
/// Text from separate chunks is newline-joined in arrival order. Images are
/// de-duplicated by locator.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    texts: Vec<String>,
    result: GenerationResult,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the text carried by one chunk. Empty fragments are skipped.
    pub fn push_text(&mut self, fragment: &str) {
        if !fragment.is_empty() {
            self.texts.push(fragment.to_string());
        }
    }

    /// Record an image locator (remote URL or data URL).
    ///
    /// Returns `true` if the image was new.
    pub fn push_image(&mut self, url: &str) -> bool {
        let url = url.trim();
        let mut output = MediaOutput::new(MediaKind::Image, url);
        if let Some(mime) = mime_of_data_url(url) {
            output = output.with_mime(mime);
        }
        self.result.push_output(output)
    }

    pub fn push_output(&mut self, output: MediaOutput) -> bool {
        self.result.push_output(output)
    }

    pub fn set_request_id(&mut self, request_id: &str) {
        if self.result.request_id.is_none() && !request_id.is_empty() {
            self.result.request_id = Some(request_id.to_string());
        }
    }

    /// Accumulated text so far.
    pub fn text(&self) -> String {
        self.texts.join("\n")
    }

    pub fn image_count(&self) -> usize {
        self.result.outputs.len()
    }

    /// Finish the stream. Fails with [`ProviderError::NoImageInResponse`]
    /// when no media output was captured.
    pub fn finish(mut self) -> Result<GenerationResult, ProviderError> {
        let text = self.text();
        if self.result.outputs.is_empty() {
            return Err(ProviderError::NoImageInResponse { text });
        }
        if !text.is_empty() {
            self.result.text = Some(text);
        }
        Ok(self.result)
    }
}

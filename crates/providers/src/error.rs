use mediagate_core::error::CoreError;

use crate::media::MediaError;

/// Errors raised while resolving or running a provider adapter.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// No constructor is registered for the provider's driver tag.
    #[error("Unsupported provider driver '{0}'")]
    DriverUnsupported(String),

    /// Provider configuration is incomplete or malformed.
    #[error("Provider configuration error: {0}")]
    Config(String),

    /// The request does not satisfy the model's constraints.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The provider answered 2xx but reported an error code in the body.
    #[error("Provider rejected the request ({code}): {message}")]
    Rejected { code: String, message: String },

    /// The response could not be interpreted.
    #[error("Unexpected provider response: {0}")]
    Protocol(String),

    /// The stream ended without any image. `text` holds whatever the model
    /// said instead.
    #[error("No image in provider response{}", text_suffix(.text))]
    NoImageInResponse { text: String },

    /// The provider reported the async task as failed or cancelled.
    #[error("Provider task failed: {0}")]
    TaskFailed(String),

    /// The poller gave up before the task reached a terminal state.
    #[error("Task {task_id} still not finished after {attempts} polls")]
    AttemptsExhausted { task_id: String, attempts: u32 },

    /// The job was cancelled locally (shutdown or deadline).
    #[error("Generation cancelled")]
    Cancelled,

    #[error(transparent)]
    Media(#[from] MediaError),
}

fn text_suffix(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!(": {text}")
    }
}

impl From<CoreError> for ProviderError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::Validation(msg),
            other => Self::Config(other.to_string()),
        }
    }
}

impl ProviderError {
    pub(crate) fn protocol(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Protocol(format!("{context}: {err}"))
    }

    /// Whether the error comes from request validation rather than a failed
    /// call.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::DriverUnsupported(_) | Self::Config(_))
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mediagate_core::error::CoreError;
use mediagate_pipeline::PipelineError;
use mediagate_providers::ProviderError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`PipelineError`] and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent JSON error
/// responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `mediagate_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A rejection from the generation pipeline before any job started.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

type Classified = (StatusCode, &'static str, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Pipeline(err) => classify_pipeline_error(err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => internal(msg),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal(msg: &str) -> Classified {
    tracing::error!(error = %msg, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_core_error(err: &CoreError) -> Classified {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Internal(msg) => internal(msg),
    }
}

/// Synchronous pipeline rejections.
///
/// - Unknown model or provider maps to 404.
/// - Inactive providers, unsupported drivers, provider misconfiguration
///   and requests the model cannot serve map to 400.
/// - Anything else maps to 500 with a sanitized message.
fn classify_pipeline_error(err: &PipelineError) -> Classified {
    match err {
        PipelineError::Core(core) => classify_core_error(core),
        PipelineError::ProviderInactive(id) => (
            StatusCode::BAD_REQUEST,
            "PROVIDER_INACTIVE",
            format!("Provider {id} is not active"),
        ),
        PipelineError::Provider(provider) => match provider {
            ProviderError::DriverUnsupported(_) => {
                (StatusCode::BAD_REQUEST, "UNSUPPORTED_DRIVER", provider.to_string())
            }
            ProviderError::Config(_) => {
                (StatusCode::BAD_REQUEST, "PROVIDER_CONFIG_ERROR", provider.to_string())
            }
            ProviderError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            other => internal(&other.to_string()),
        },
    }
}

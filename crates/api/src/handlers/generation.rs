//! Handlers for submitting generation requests and reading their records.
//!
//! Submission only validates and records the request; the provider exchange
//! runs in the background and its outcome arrives on the notification
//! stream.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use mediagate_core::error::CoreError;
use mediagate_core::generation::{GenerationRequest, MediaInput, OutputConfig};
use mediagate_core::types::DbId;
use serde::Deserialize;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /api/v1/generations`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateGenerationBody {
    #[validate(range(min = 1, message = "model_id must be a positive id"))]
    pub model_id: DbId,
    #[serde(default)]
    #[validate(length(min = 1, max = 8000, message = "prompt must be 1-8000 characters"))]
    pub prompt: String,
    #[serde(default)]
    #[validate(length(max = 16, message = "at most 16 media inputs"))]
    pub inputs: Vec<MediaInput>,
    #[serde(default)]
    #[validate(nested)]
    pub output: OutputBody,
    #[serde(default)]
    #[validate(length(min = 1, max = 128, message = "client_id must be 1-128 characters"))]
    pub client_id: Option<String>,
    #[serde(default)]
    pub tag_ids: Vec<DbId>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct OutputBody {
    #[validate(length(min = 1, max = 32))]
    pub size: Option<String>,
    #[validate(range(min = 1, max = 120))]
    pub duration: Option<u32>,
    #[validate(range(min = 1, max = 16))]
    pub count: Option<u32>,
}

impl CreateGenerationBody {
    fn into_request(self) -> GenerationRequest {
        GenerationRequest {
            model_id: self.model_id,
            prompt: self.prompt,
            inputs: self.inputs,
            output: OutputConfig {
                size: self.output.size,
                duration: self.output.duration,
                count: self.output.count,
            },
            client_id: self.client_id,
            tag_ids: self.tag_ids,
        }
    }
}

/// POST /api/v1/generations
///
/// Validate the request, create its usage record and start the job.
/// Returns 202 with `{record_id, status}`.
pub async fn create_generation(
    State(state): State<AppState>,
    Json(body): Json<CreateGenerationBody>,
) -> AppResult<impl IntoResponse> {
    body.validate()
        .map_err(|e| AppError::Core(CoreError::Validation(e.to_string())))?;

    let model_id = body.model_id;
    let submission = state.orchestrator.submit(body.into_request()).await?;

    tracing::info!(record_id = submission.record_id, model_id, "Generation accepted");

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: submission })))
}

/// GET /api/v1/generations/{id}
///
/// Current state of a usage record.
pub async fn get_generation(
    State(state): State<AppState>,
    Path(record_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let record = state.orchestrator.record(record_id).await?;

    Ok(Json(DataResponse { data: record }))
}

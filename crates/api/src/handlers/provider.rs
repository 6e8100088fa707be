//! Provider maintenance endpoints.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use mediagate_core::types::DbId;
use serde::Serialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub provider_id: DbId,
    /// Whether an adapter was cached for the provider.
    pub invalidated: bool,
}

/// POST /api/v1/providers/{id}/invalidate
///
/// Drop the cached adapter so the next request rebuilds it from the
/// current provider configuration (new key, base URL or settings).
pub async fn invalidate_provider(
    State(state): State<AppState>,
    Path(provider_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let invalidated = state.orchestrator.registry().invalidate(provider_id);
    tracing::info!(provider_id, invalidated, "Provider adapter invalidated");

    Ok(Json(DataResponse {
        data: InvalidateResponse {
            provider_id,
            invalidated,
        },
    }))
}

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// `postgres` or `memory`.
    pub storage_backend: &'static str,
    /// Whether the database is reachable; always true on in-memory stores.
    pub db_healthy: bool,
    /// Generation jobs still running in the background.
    pub jobs_in_flight: usize,
    /// Driver tags the provider registry can construct.
    pub drivers: Vec<String>,
}

/// GET /health -- returns service and database health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (storage_backend, db_healthy) = match &state.pool {
        Some(pool) => ("postgres", mediagate_db::health_check(pool).await.is_ok()),
        None => ("memory", true),
    };

    let status = if db_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        storage_backend,
        db_healthy,
        jobs_in_flight: state.orchestrator.runner().in_flight(),
        drivers: state.orchestrator.registry().drivers(),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

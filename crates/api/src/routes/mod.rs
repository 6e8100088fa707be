pub mod generation;
pub mod health;
pub mod notification;
pub mod provider;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /generations                          submit (POST, 202)
/// /generations/{id}                     usage record (GET)
///
/// /notifications/stream?client_id=      completion events (SSE)
///
/// /providers/{id}/invalidate            drop cached adapter (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/generations", generation::router())
        .nest("/notifications", notification::router())
        .nest("/providers", provider::router())
}

use axum::routing::post;
use axum::Router;

use crate::handlers::provider;
use crate::state::AppState;

/// Routes mounted at `/providers`.
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}/invalidate", post(provider::invalidate_provider))
}

use std::sync::Arc;

use mediagate_events::NotificationBus;
use mediagate_pipeline::GenerationOrchestrator;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool, absent when running on in-memory stores.
    pub pool: Option<mediagate_db::DbPool>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Accepts generation requests and runs them in the background.
    pub orchestrator: Arc<GenerationOrchestrator>,
    /// Cancelled when the server starts shutting down; ends SSE streams.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn bus(&self) -> &Arc<NotificationBus> {
        self.orchestrator.bus()
    }
}

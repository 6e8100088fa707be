use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mediagate_core::memory::{InMemoryCatalog, InMemoryUsageRecords};
use mediagate_core::storage::LocalDiskStorage;
use mediagate_core::usage::{ConfigStore, UsageRecordSink};
use mediagate_events::NotificationBus;
use mediagate_pipeline::{GenerationOrchestrator, JobRunner, OrchestratorDeps};
use mediagate_providers::{AdapterContext, MediaResolver, ProviderRegistry};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediagate_api::config::ServerConfig;
use mediagate_api::router::build_app_router;
use mediagate_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mediagate_api=debug,mediagate_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Stores ---
    let (pool, config_store, records) = build_stores(&config).await;

    let storage = LocalDiskStorage::new(&config.storage_root, &config.storage_public_prefix);
    tracing::info!(root = %config.storage_root, "Local storage ready");

    // --- Providers ---
    let http = reqwest::Client::builder()
        .build()
        .expect("Failed to build HTTP client");
    let media = MediaResolver::new(
        http.clone(),
        Duration::from_secs(config.media_fetch_timeout_secs),
    );
    let registry = ProviderRegistry::builder()
        .with_builtin_drivers()
        .build(AdapterContext::new(http, media.clone()));
    tracing::info!(drivers = ?registry.drivers(), "Provider registry built");

    // --- Notifications ---
    let bus = Arc::new(NotificationBus::new(config.mailbox_capacity));

    // --- Orchestrator ---
    let runner = JobRunner::new();
    let orchestrator = Arc::new(
        GenerationOrchestrator::new(OrchestratorDeps {
            config: config_store,
            records,
            storage: Arc::new(storage),
            registry: Arc::new(registry),
            media,
            bus,
            runner: runner.clone(),
        })
        .with_job_timeout(config.job_timeout()),
    );

    // --- App state ---
    let shutdown = CancellationToken::new();
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        orchestrator,
        shutdown: shutdown.clone(),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, draining generation jobs");

    if !runner.shutdown(config.shutdown_timeout()).await {
        tracing::warn!("Some generation jobs were cancelled before finishing");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Postgres stores when `DATABASE_URL` is set, in-memory stores otherwise.
async fn build_stores(
    config: &ServerConfig,
) -> (
    Option<mediagate_db::DbPool>,
    Arc<dyn ConfigStore>,
    Arc<dyn UsageRecordSink>,
) {
    if let Some(database_url) = &config.database_url {
        let pool = mediagate_db::create_pool(database_url)
            .await
            .expect("Failed to connect to database");
        tracing::info!("Database connection pool created");

        mediagate_db::health_check(&pool)
            .await
            .expect("Database health check failed");

        mediagate_db::run_migrations(&pool)
            .await
            .expect("Failed to run database migrations");
        tracing::info!("Database migrations applied");

        let config_store: Arc<dyn ConfigStore> =
            Arc::new(mediagate_db::stores::PgConfigStore::new(pool.clone()));
        let records: Arc<dyn UsageRecordSink> =
            Arc::new(mediagate_db::stores::PgUsageRecordSink::new(pool.clone()));
        return (Some(pool), config_store, records);
    }

    let catalog = match &config.catalog_path {
        Some(path) => InMemoryCatalog::load(path)
            .await
            .expect("Failed to load provider catalog"),
        None => InMemoryCatalog::new(),
    };
    tracing::warn!(
        providers = catalog.provider_count(),
        "DATABASE_URL not set, using in-memory stores"
    );

    (None, Arc::new(catalog), Arc::new(InMemoryUsageRecords::new()))
}

/// Wait for a termination signal, then cancel `shutdown` so open SSE
/// streams end and graceful shutdown can complete.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }

    shutdown.cancel();
}

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use mediagate_core::generation::{
    GenerationMode, GenerationRequest, GenerationResult, MediaKind, MediaOutput,
};
use mediagate_core::memory::{InMemoryCatalog, InMemoryUsageRecords};
use mediagate_core::provider::{ModelConfig, ProviderConfig};
use mediagate_core::storage::LocalDiskStorage;
use mediagate_events::NotificationBus;
use mediagate_pipeline::{GenerationOrchestrator, JobRunner, OrchestratorDeps};
use mediagate_providers::{
    AdapterContext, GenerationAdapter, MediaResolver, ProviderError, ProviderRegistry,
};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use mediagate_api::config::ServerConfig;
use mediagate_api::router::build_app_router;
use mediagate_api::state::AppState;

pub const ECHO_DRIVER: &str = "echo";

pub const PROVIDER_ID: i64 = 1;
pub const INACTIVE_PROVIDER_ID: i64 = 2;
pub const UNKNOWN_DRIVER_PROVIDER_ID: i64 = 3;

pub const MODEL_OK: i64 = 10;
pub const MODEL_FAIL: i64 = 11;
pub const MODEL_INACTIVE: i64 = 12;
pub const MODEL_UNKNOWN_DRIVER: i64 = 13;
pub const MODEL_EDIT: i64 = 14;

/// Answers with one inline PNG, or fails when the model code is "fail".
struct EchoAdapter;

#[async_trait]
impl GenerationAdapter for EchoAdapter {
    fn driver(&self) -> &'static str {
        ECHO_DRIVER
    }

    async fn generate_content(
        &self,
        _request: &GenerationRequest,
        model: &ModelConfig,
        _cancel: &CancellationToken,
    ) -> Result<GenerationResult, ProviderError> {
        if model.code == "fail" {
            return Err(ProviderError::TaskFailed("content policy violation".into()));
        }
        let mut result = GenerationResult::default();
        result.push_output(MediaOutput::new(MediaKind::Image, "data:image/png;base64,QUJD"));
        Ok(result)
    }
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        job_timeout_secs: 5,
        media_fetch_timeout_secs: 1,
        sse_heartbeat_secs: 1,
        mailbox_capacity: 4,
        storage_root: String::new(),
        storage_public_prefix: String::new(),
        database_url: None,
        catalog_path: None,
    }
}

fn provider(id: i64, driver: &str, is_active: bool) -> ProviderConfig {
    ProviderConfig {
        id,
        name: format!("provider {id}"),
        driver: driver.into(),
        api_key: "key".into(),
        base_url: "http://localhost".into(),
        settings: Default::default(),
        is_active,
    }
}

fn model(id: i64, provider_id: i64, code: &str, mode: GenerationMode) -> ModelConfig {
    ModelConfig {
        id,
        provider_id,
        name: code.into(),
        code: code.into(),
        generation_mode: mode,
        input_modalities: vec![MediaKind::Text, MediaKind::Image],
        output_modalities: vec![MediaKind::Image],
        supported_sizes: vec![],
        default_size: None,
        supported_durations: vec![],
        default_duration: None,
        max_images: 0,
        endpoint: None,
        supports_stream: false,
        supports_cancel: false,
    }
}

fn catalog() -> InMemoryCatalog {
    let catalog = InMemoryCatalog::new();
    catalog.insert_provider(provider(PROVIDER_ID, ECHO_DRIVER, true));
    catalog.insert_provider(provider(INACTIVE_PROVIDER_ID, ECHO_DRIVER, false));
    catalog.insert_provider(provider(UNKNOWN_DRIVER_PROVIDER_ID, "nope", true));
    catalog.insert_model(model(MODEL_OK, PROVIDER_ID, "ok", GenerationMode::TextToImage));
    catalog.insert_model(model(MODEL_FAIL, PROVIDER_ID, "fail", GenerationMode::TextToImage));
    catalog.insert_model(model(
        MODEL_INACTIVE,
        INACTIVE_PROVIDER_ID,
        "ok",
        GenerationMode::TextToImage,
    ));
    catalog.insert_model(model(
        MODEL_UNKNOWN_DRIVER,
        UNKNOWN_DRIVER_PROVIDER_ID,
        "ok",
        GenerationMode::TextToImage,
    ));
    catalog.insert_model(model(MODEL_EDIT, PROVIDER_ID, "ok", GenerationMode::ImageToImage));
    catalog
}

/// A router over in-memory stores and the echo driver, plus handles the
/// tests poke at directly.
pub struct TestApp {
    pub router: Router,
    pub orchestrator: Arc<GenerationOrchestrator>,
    pub shutdown: CancellationToken,
    _storage: tempfile::TempDir,
}

impl TestApp {
    pub fn bus(&self) -> &Arc<NotificationBus> {
        self.orchestrator.bus()
    }
}

/// Build the full application router with all middleware layers.
///
/// Uses the same [`build_app_router`] as `main.rs`, so tests exercise the
/// production middleware stack.
pub fn build_test_app() -> TestApp {
    build_test_app_with_pool(None)
}

pub fn build_test_app_with_pool(pool: Option<sqlx::PgPool>) -> TestApp {
    let config = test_config();
    let storage = tempfile::tempdir().unwrap();

    let http = reqwest::Client::new();
    let media = MediaResolver::new(http.clone(), Duration::from_secs(1));
    let registry = ProviderRegistry::builder()
        .with_builtin_drivers()
        .register(ECHO_DRIVER, |_, _| Ok(Arc::new(EchoAdapter)))
        .build(AdapterContext::new(http, media.clone()));

    let orchestrator = Arc::new(
        GenerationOrchestrator::new(OrchestratorDeps {
            config: Arc::new(catalog()),
            records: Arc::new(InMemoryUsageRecords::new()),
            storage: Arc::new(LocalDiskStorage::new(storage.path(), "")),
            registry: Arc::new(registry),
            media,
            bus: Arc::new(NotificationBus::new(config.mailbox_capacity)),
            runner: JobRunner::new(),
        })
        .with_job_timeout(config.job_timeout()),
    );

    let shutdown = CancellationToken::new();
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        orchestrator: Arc::clone(&orchestrator),
        shutdown: shutdown.clone(),
    };

    TestApp {
        router: build_app_router(state, &config),
        orchestrator,
        shutdown,
        _storage: storage,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post(app: Router, uri: &str) -> Response {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

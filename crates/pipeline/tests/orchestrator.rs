//! Orchestrator runs against a scripted adapter and the in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use mediagate_core::error::CoreError;
use mediagate_core::generation::{
    GenerationMode, GenerationRequest, GenerationResult, MediaInput, MediaKind, MediaOutput,
};
use mediagate_core::memory::{InMemoryCatalog, InMemoryUsageRecords};
use mediagate_core::provider::{ModelConfig, ProviderConfig};
use mediagate_core::storage::LocalDiskStorage;
use mediagate_core::usage::{UsageRecord, UsageRecordSink, UsageStatus};
use mediagate_events::{CompletionStatus, NotificationBus, NotificationEvent};
use mediagate_pipeline::{GenerationOrchestrator, JobRunner, OrchestratorDeps, PipelineError};
use mediagate_providers::{
    AdapterContext, GenerationAdapter, MediaResolver, ProviderError, ProviderRegistry,
};
use tokio_util::sync::CancellationToken;

const FAKE_DRIVER: &str = "scripted";

const PROVIDER_ID: i64 = 1;
const INACTIVE_PROVIDER_ID: i64 = 2;
const UNKNOWN_DRIVER_PROVIDER_ID: i64 = 3;

const MODEL_OK: i64 = 10;
const MODEL_FAIL: i64 = 11;
const MODEL_SLOW: i64 = 12;
const MODEL_EDIT: i64 = 13;
const MODEL_INACTIVE: i64 = 14;
const MODEL_UNKNOWN_DRIVER: i64 = 15;
const MODEL_REMOTE: i64 = 16;

/// Behaves according to the model code.
struct ScriptedAdapter;

#[async_trait]
impl GenerationAdapter for ScriptedAdapter {
    fn driver(&self) -> &'static str {
        FAKE_DRIVER
    }

    async fn generate_content(
        &self,
        _request: &GenerationRequest,
        model: &ModelConfig,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, ProviderError> {
        match model.code.as_str() {
            "fail" => Err(ProviderError::TaskFailed("content policy violation".into())),
            "slow" => {
                cancel.cancelled().await;
                Err(ProviderError::Cancelled)
            }
            "remote" => {
                let mut result = GenerationResult::default().with_task_id("task-9");
                result.push_output(MediaOutput::new(MediaKind::Video, "http://127.0.0.1:1/v.mp4"));
                Ok(result)
            }
            _ => {
                let mut result = GenerationResult {
                    text: Some("one image".into()),
                    ..Default::default()
                };
                result.push_output(MediaOutput::new(MediaKind::Image, "data:image/png;base64,QUJD"));
                result.push_output(MediaOutput::new(MediaKind::Image, "data:image/png;base64,QUJD"));
                Ok(result)
            }
        }
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

struct Harness {
    orchestrator: Arc<GenerationOrchestrator>,
    records: Arc<InMemoryUsageRecords>,
    bus: Arc<NotificationBus>,
    storage_dir: tempfile::TempDir,
}

fn harness(job_timeout: Duration) -> Harness {
    let catalog = InMemoryCatalog::new();
    catalog.insert_provider(provider(PROVIDER_ID, FAKE_DRIVER, true));
    catalog.insert_provider(provider(INACTIVE_PROVIDER_ID, FAKE_DRIVER, false));
    catalog.insert_provider(provider(UNKNOWN_DRIVER_PROVIDER_ID, "nope", true));
    catalog.insert_model(model(MODEL_OK, PROVIDER_ID, "ok", GenerationMode::TextToImage));
    catalog.insert_model(model(MODEL_FAIL, PROVIDER_ID, "fail", GenerationMode::TextToImage));
    catalog.insert_model(model(MODEL_SLOW, PROVIDER_ID, "slow", GenerationMode::TextToImage));
    catalog.insert_model(model(MODEL_EDIT, PROVIDER_ID, "ok", GenerationMode::ImageToImage));
    catalog.insert_model(model(MODEL_INACTIVE, INACTIVE_PROVIDER_ID, "ok", GenerationMode::TextToImage));
    catalog.insert_model(model(
        MODEL_UNKNOWN_DRIVER,
        UNKNOWN_DRIVER_PROVIDER_ID,
        "ok",
        GenerationMode::TextToImage,
    ));
    catalog.insert_model(model(MODEL_REMOTE, PROVIDER_ID, "remote", GenerationMode::TextToVideo));

    let http = reqwest::Client::new();
    let media = MediaResolver::new(http.clone(), Duration::from_secs(1));
    let registry = ProviderRegistry::builder()
        .register(FAKE_DRIVER, |_, _| Ok(Arc::new(ScriptedAdapter)))
        .build(AdapterContext::new(http, media.clone()));

    let storage_dir = tempfile::tempdir().unwrap();
    let records = Arc::new(InMemoryUsageRecords::new());
    let bus = Arc::new(NotificationBus::new(4));

    let orchestrator = GenerationOrchestrator::new(OrchestratorDeps {
        config: Arc::new(catalog),
        records: records.clone(),
        storage: Arc::new(LocalDiskStorage::new(storage_dir.path(), "")),
        registry: Arc::new(registry),
        media,
        bus: bus.clone(),
        runner: JobRunner::new(),
    })
    .with_job_timeout(job_timeout);

    Harness {
        orchestrator: Arc::new(orchestrator),
        records,
        bus,
        storage_dir,
    }
}

fn request(model_id: i64, client_id: &str) -> GenerationRequest {
    let mut request = GenerationRequest::new(model_id, "a red fox in snow");
    request.client_id = Some(client_id.into());
    request
}

async fn next_event(sub: &mut mediagate_events::Subscription) -> NotificationEvent {
    tokio::time::timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("notification within 5s")
        .expect("mailbox open")
}

async fn record(h: &Harness, id: i64) -> UsageRecord {
    h.records.find(id).await.unwrap().unwrap()
}

#[tokio::test]
async fn successful_run_stores_outputs_and_notifies() {
    let h = harness(Duration::from_secs(5));
    let mut sub = h.bus.subscribe("client-a");

    let mut req = request(MODEL_OK, "client-a");
    req.tag_ids = vec![7, 8];
    let submission = h.orchestrator.submit(req).await.unwrap();
    assert_eq!(submission.status, UsageStatus::Processing);

    let event = next_event(&mut sub).await;
    assert_eq!(event.record_id, submission.record_id);
    assert_eq!(event.status, CompletionStatus::Success);
    assert!(event.error.is_none());

    let rec = record(&h, submission.record_id).await;
    assert_eq!(rec.status, UsageStatus::Succeeded);
    assert_eq!(rec.tag_ids, vec![7, 8]);
    assert_eq!(rec.output_text.as_deref(), Some("one image"));
    assert_eq!(rec.output_media.len(), 1);
    assert!(rec.output_media[0].starts_with("outputs/ok_"));
    assert!(rec.output_media[0].ends_with(&format!("_{}_0.png", submission.record_id)));

    let stored = std::fs::read(h.storage_dir.path().join(&rec.output_media[0])).unwrap();
    assert_eq!(stored, b"ABC");
}

#[tokio::test]
async fn concurrent_jobs_on_one_model_keep_separate_outputs() {
    let h = harness(Duration::from_secs(5));
    let first = h
        .orchestrator
        .submit(GenerationRequest::new(MODEL_OK, "first"))
        .await
        .unwrap();
    let second = h
        .orchestrator
        .submit(GenerationRequest::new(MODEL_OK, "second"))
        .await
        .unwrap();

    assert!(h.orchestrator.runner().shutdown(Duration::from_secs(5)).await);

    let a = record(&h, first.record_id).await;
    let b = record(&h, second.record_id).await;
    assert_eq!(a.status, UsageStatus::Succeeded);
    assert_eq!(b.status, UsageStatus::Succeeded);
    assert_eq!(a.output_media.len(), 1);
    assert_eq!(b.output_media.len(), 1);
    assert_ne!(a.output_media, b.output_media);
    for locator in a.output_media.iter().chain(&b.output_media) {
        assert!(h.storage_dir.path().join(locator).exists());
    }
}

#[tokio::test]
async fn input_images_are_stored_by_digest() {
    let h = harness(Duration::from_secs(5));
    let mut sub = h.bus.subscribe("client-b");

    let mut req = request(MODEL_EDIT, "client-b");
    req.inputs.push(MediaInput::image("QUJD"));
    req.inputs.push(MediaInput::image("data:image/png;base64,QUJD"));
    let submission = h.orchestrator.submit(req).await.unwrap();
    next_event(&mut sub).await;

    let rec = record(&h, submission.record_id).await;
    let digest = mediagate_core::hashing::sha256_hex(b"ABC");
    assert_eq!(rec.input_media, vec![format!("inputs/{digest}.png")]);
}

#[tokio::test]
async fn provider_failure_is_recorded_and_published() {
    let h = harness(Duration::from_secs(5));
    let mut sub = h.bus.subscribe("client-c");

    let submission = h.orchestrator.submit(request(MODEL_FAIL, "client-c")).await.unwrap();
    let event = next_event(&mut sub).await;

    assert_eq!(event.status, CompletionStatus::Failure);
    assert!(event.error.as_deref().unwrap().contains("content policy violation"));

    let rec = record(&h, submission.record_id).await;
    assert_eq!(rec.status, UsageStatus::Failed);
    assert!(rec.error_text.unwrap().contains("content policy violation"));
    assert!(rec.output_media.is_empty());
}

#[tokio::test]
async fn job_deadline_fails_the_record() {
    let h = harness(Duration::from_millis(50));
    let mut sub = h.bus.subscribe("client-d");

    let submission = h.orchestrator.submit(request(MODEL_SLOW, "client-d")).await.unwrap();
    let event = next_event(&mut sub).await;

    assert_eq!(event.status, CompletionStatus::Failure);
    assert!(event.error.unwrap().contains("timed out"));
    assert_eq!(record(&h, submission.record_id).await.status, UsageStatus::Failed);
}

#[tokio::test]
async fn unstored_remote_output_is_kept_with_annotation() {
    let h = harness(Duration::from_secs(5));
    let mut sub = h.bus.subscribe("client-e");

    let submission = h.orchestrator.submit(request(MODEL_REMOTE, "client-e")).await.unwrap();
    let event = next_event(&mut sub).await;

    assert_eq!(event.status, CompletionStatus::Success);
    assert!(event.error.as_deref().unwrap().starts_with("output 0:"));

    let rec = record(&h, submission.record_id).await;
    assert_eq!(rec.status, UsageStatus::Succeeded);
    assert_eq!(rec.output_media, vec!["http://127.0.0.1:1/v.mp4".to_string()]);
    assert_eq!(rec.external_task_code.as_deref(), Some("task-9"));
}

#[tokio::test]
async fn shutdown_cancels_running_jobs() {
    let h = harness(Duration::from_secs(60));
    let mut sub = h.bus.subscribe("client-f");

    let submission = h.orchestrator.submit(request(MODEL_SLOW, "client-f")).await.unwrap();
    assert!(!h.orchestrator.runner().shutdown(Duration::from_millis(20)).await);

    let event = sub.try_recv().expect("failure published before shutdown returns");
    assert_eq!(event.status, CompletionStatus::Failure);
    assert_eq!(record(&h, submission.record_id).await.status, UsageStatus::Failed);

    assert_matches!(
        h.orchestrator.submit(request(MODEL_OK, "client-f")).await,
        Err(PipelineError::Core(CoreError::Internal(_)))
    );
}

#[tokio::test]
async fn synchronous_rejections_create_no_record() {
    let h = harness(Duration::from_secs(5));

    assert_matches!(
        h.orchestrator.submit(request(999, "x")).await,
        Err(PipelineError::Core(CoreError::NotFound { entity: "Model", id: 999 }))
    );
    assert_matches!(
        h.orchestrator.submit(request(MODEL_INACTIVE, "x")).await,
        Err(PipelineError::ProviderInactive(INACTIVE_PROVIDER_ID))
    );
    assert_matches!(
        h.orchestrator.submit(request(MODEL_UNKNOWN_DRIVER, "x")).await,
        Err(PipelineError::Provider(ProviderError::DriverUnsupported(d))) if d == "nope"
    );
    assert_matches!(
        h.orchestrator.submit(request(MODEL_EDIT, "x")).await,
        Err(PipelineError::Provider(ProviderError::Validation(_)))
    );

    let mut blank = request(MODEL_OK, "x");
    blank.prompt = "   ".into();
    let err = h.orchestrator.submit(blank).await.unwrap_err();
    assert!(err.is_client_error());

    assert!(h.records.is_empty());
}

#[tokio::test]
async fn requests_without_client_id_still_complete() {
    let h = harness(Duration::from_secs(5));
    let submission = h
        .orchestrator
        .submit(GenerationRequest::new(MODEL_OK, "no listener"))
        .await
        .unwrap();

    assert!(h.orchestrator.runner().shutdown(Duration::from_secs(5)).await);
    assert_eq!(record(&h, submission.record_id).await.status, UsageStatus::Succeeded);
}

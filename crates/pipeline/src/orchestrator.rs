//! End-to-end handling of one generation request.
//!
//! The request path only runs [`GenerationOrchestrator::submit`]; the
//! provider exchange happens in a background job owned by the
//! [`JobRunner`]. Inside the job nothing is retried: the adapter's own
//! polling budget is the only retry there is.

use std::sync::Arc;
use std::time::Duration;

use mediagate_core::error::CoreError;
use mediagate_core::generation::{GenerationRequest, GenerationResult};
use mediagate_core::hashing::sha256_hex;
use mediagate_core::provider::{ModelConfig, ProviderConfig};
use mediagate_core::storage::{SaveOptions, StorageSink, CATEGORY_INPUTS, CATEGORY_OUTPUTS};
use mediagate_core::types::DbId;
use mediagate_core::usage::{
    ConfigStore, CreateUsageRecord, UsageRecord, UsageRecordSink, UsageRecordUpdate, UsageStatus,
};
use mediagate_events::{NotificationBus, NotificationEvent};
use mediagate_providers::{GenerationAdapter, MediaResolver, ProviderError, ProviderRegistry};
use serde::Serialize;

use crate::error::PipelineError;
use crate::runner::JobRunner;

/// Deadline for one provider exchange, independent of the HTTP request.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(300);

/// Separator used when several warnings end up in one text column.
const WARNING_SEPARATOR: &str = "; ";

/// Collaborators the orchestrator is wired with.
pub struct OrchestratorDeps {
    pub config: Arc<dyn ConfigStore>,
    pub records: Arc<dyn UsageRecordSink>,
    pub storage: Arc<dyn StorageSink>,
    pub registry: Arc<ProviderRegistry>,
    pub media: MediaResolver,
    pub bus: Arc<NotificationBus>,
    pub runner: JobRunner,
}

/// What the caller gets back when a request is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub record_id: DbId,
    pub status: UsageStatus,
}

/// Everything a background job needs, resolved on the request path.
struct Job {
    record_id: DbId,
    request: GenerationRequest,
    model: ModelConfig,
    adapter: Arc<dyn GenerationAdapter>,
}

pub struct GenerationOrchestrator {
    config: Arc<dyn ConfigStore>,
    records: Arc<dyn UsageRecordSink>,
    storage: Arc<dyn StorageSink>,
    registry: Arc<ProviderRegistry>,
    media: MediaResolver,
    bus: Arc<NotificationBus>,
    runner: JobRunner,
    job_timeout: Duration,
}

impl GenerationOrchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            config: deps.config,
            records: deps.records,
            storage: deps.storage,
            registry: deps.registry,
            media: deps.media,
            bus: deps.bus,
            runner: deps.runner,
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    /// Look up a usage record.
    pub async fn record(&self, id: DbId) -> Result<UsageRecord, PipelineError> {
        self.records
            .find(id)
            .await?
            .ok_or(PipelineError::Core(CoreError::NotFound {
                entity: "UsageRecord",
                id,
            }))
    }

    /// Accept a request and start it in the background.
    ///
    /// Everything that can be rejected synchronously is checked here:
    /// the model and its provider exist, the provider is active, its driver
    /// is registered and the adapter accepts the request shape. The usage
    /// record exists before this returns.
    pub async fn submit(
        self: &Arc<Self>,
        request: GenerationRequest,
    ) -> Result<Submission, PipelineError> {
        if request.prompt.trim().is_empty() {
            return Err(CoreError::Validation("prompt is required".into()).into());
        }
        if self.runner.is_shutting_down() {
            return Err(CoreError::Internal("server is shutting down".into()).into());
        }

        let model = self
            .config
            .model(request.model_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Model",
                id: request.model_id,
            })?;
        let provider = self.active_provider(model.provider_id).await?;

        let adapter = self.registry.resolve(&provider)?;
        adapter.validate(&request, &model)?;

        let record_id = self
            .records
            .create(&CreateUsageRecord {
                provider_id: provider.id,
                model_id: model.id,
                client_id: request.client_id.clone(),
                prompt: request.prompt.clone(),
                tag_ids: request.tag_ids.clone(),
            })
            .await?;

        tracing::info!(
            record_id,
            provider_id = provider.id,
            driver = %provider.driver,
            model = %model.code,
            mode = model.generation_mode.as_str(),
            "Generation accepted",
        );

        let job = Job {
            record_id,
            request,
            model,
            adapter,
        };
        let this = Arc::clone(self);
        self.runner.spawn(async move { this.run_job(job).await });

        Ok(Submission {
            record_id,
            status: UsageStatus::Processing,
        })
    }

    async fn active_provider(&self, provider_id: DbId) -> Result<ProviderConfig, PipelineError> {
        let provider = self
            .config
            .provider(provider_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Provider",
                id: provider_id,
            })?;
        if !provider.is_active {
            return Err(PipelineError::ProviderInactive(provider_id));
        }
        Ok(provider)
    }

    // ---- background job ----

    async fn run_job(&self, job: Job) {
        let record_id = job.record_id;
        let (input_media, mut warnings) = self.persist_inputs(&job.request).await;

        let cancel = self.runner.child_token();
        let outcome = tokio::time::timeout(
            self.job_timeout,
            job.adapter.generate_content(&job.request, &job.model, &cancel),
        )
        .await;

        let outcome = match outcome {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                Err(ProviderError::TaskFailed(format!(
                    "generation timed out after {}s",
                    self.job_timeout.as_secs()
                )))
            }
        };

        match outcome {
            Ok(result) => {
                let (output_media, output_warnings) =
                    self.persist_outputs(record_id, &job.model, &result).await;
                warnings.extend(output_warnings);
                let annotation = merge_warnings(None, &warnings);

                tracing::info!(
                    record_id,
                    outputs = output_media.len(),
                    warnings = warnings.len(),
                    "Generation succeeded",
                );
                self.update_record(
                    record_id,
                    UsageRecordUpdate {
                        status: Some(UsageStatus::Succeeded),
                        input_media: Some(input_media),
                        output_media: Some(output_media),
                        output_text: result.text.clone(),
                        error_text: annotation.clone(),
                        external_task_code: result.task_id.clone(),
                    },
                )
                .await;
                self.notify(
                    job.request.client_id.as_deref(),
                    NotificationEvent::success(record_id, annotation),
                );
            }
            Err(e) => {
                tracing::warn!(record_id, error = %e, "Generation failed");
                let error_text = merge_warnings(Some(e.to_string()), &warnings).unwrap_or_default();
                let external_task_code = match &e {
                    ProviderError::AttemptsExhausted { task_id, .. } => Some(task_id.clone()),
                    _ => None,
                };
                self.update_record(
                    record_id,
                    UsageRecordUpdate {
                        status: Some(UsageStatus::Failed),
                        input_media: Some(input_media),
                        error_text: Some(error_text.clone()),
                        external_task_code,
                        ..Default::default()
                    },
                )
                .await;
                self.notify(
                    job.request.client_id.as_deref(),
                    NotificationEvent::failure(record_id, error_text),
                );
            }
        }
    }

    /// Store every input image under the digest of its bytes.
    async fn persist_inputs(&self, request: &GenerationRequest) -> (Vec<String>, Vec<String>) {
        let references: Vec<&str> = request.images().map(|i| i.content.as_str()).collect();
        if references.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let batch = self.media.resolve_batch(&references).await;
        let mut warnings: Vec<String> = batch
            .errors
            .iter()
            .map(|(index, e)| format!("input {index}: {e}"))
            .collect();

        let mut locators = Vec::with_capacity(batch.resolved.len());
        for (index, media) in batch.resolved {
            let options =
                SaveOptions::new(CATEGORY_INPUTS, sha256_hex(&media.bytes), &media.extension)
                    .skip_if_exists();
            match self.storage.save(&media.bytes, &options).await {
                Ok(locator) => push_unique(&mut locators, locator),
                Err(e) => {
                    tracing::warn!(index, error = %e, "Failed to store input media");
                    warnings.push(format!("input {index}: {e}"));
                }
            }
        }
        (locators, warnings)
    }

    /// Store every output under
    /// `{model_code}_{yyyyMMddHHmmss}_{record_id}_{index}`.
    ///
    /// An output that cannot be stored keeps its provider URL as locator;
    /// inline data URLs are dropped instead.
    async fn persist_outputs(
        &self,
        record_id: DbId,
        model: &ModelConfig,
        result: &GenerationResult,
    ) -> (Vec<String>, Vec<String>) {
        let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();
        let prefix = storage_safe(&model.code);

        let mut locators = Vec::with_capacity(result.outputs.len());
        let mut warnings = Vec::new();
        for (index, output) in result.outputs.iter().enumerate() {
            let stored = match self.media.resolve(&output.url).await {
                Ok(media) => {
                    let options = SaveOptions::new(
                        CATEGORY_OUTPUTS,
                        format!("{prefix}_{stamp}_{record_id}_{index}"),
                        &media.extension,
                    );
                    self.storage.save(&media.bytes, &options).await.map_err(|e| e.to_string())
                }
                Err(e) => Err(e.to_string()),
            };

            match stored {
                Ok(locator) => push_unique(&mut locators, locator),
                Err(e) => {
                    tracing::warn!(index, error = %e, "Failed to store output media");
                    warnings.push(format!("output {index}: {e}"));
                    if !output.url.starts_with("data:") {
                        push_unique(&mut locators, output.url.clone());
                    }
                }
            }
        }
        (locators, warnings)
    }

    async fn update_record(&self, record_id: DbId, update: UsageRecordUpdate) {
        if let Err(e) = self.records.update(record_id, &update).await {
            tracing::error!(record_id, error = %e, "Failed to update usage record");
        }
    }

    fn notify(&self, client_id: Option<&str>, event: NotificationEvent) {
        let Some(client_id) = client_id.filter(|c| !c.is_empty()) else {
            return;
        };
        let delivered = self.bus.publish(client_id, event);
        tracing::debug!(client_id, delivered, "Completion notification published");
    }
}

fn push_unique(locators: &mut Vec<String>, locator: String) {
    if !locators.contains(&locator) {
        locators.push(locator);
    }
}

/// Join an optional primary message with any warnings.
fn merge_warnings(primary: Option<String>, warnings: &[String]) -> Option<String> {
    let parts: Vec<&str> = primary
        .as_deref()
        .into_iter()
        .chain(warnings.iter().map(String::as_str))
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(WARNING_SEPARATOR))
    }
}

/// Model codes may contain path separators (`org/model`).
fn storage_safe(code: &str) -> String {
    let cleaned: String = code
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.replace("..", "_");
    if cleaned.is_empty() {
        "output".to_string()
    } else {
        cleaned
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

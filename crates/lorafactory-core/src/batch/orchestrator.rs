//! Bounded-concurrency batch execution.
//!
//! Work items run in sequential chunks of the job's concurrency limit; all
//! items of a chunk run concurrently and the next chunk starts only once
//! every item of the current one has resolved. Item failures are recorded on
//! the item and never abort the batch.

use super::job::{GenerationJob, ReferenceAsset};
use super::prompts;
use crate::config::Config;
use crate::error::{FactoryError, ProviderError, Result};
use crate::params::ParameterTranslator;
use crate::provider::{AssetData, CaptionRequest, EditRequest, ImageProvider, ImageRequest};
use crate::types::{
    BatchProgress, BatchSummary, GenerationMetadata, GenerationMode, ItemFailure, ItemResult,
    ItemState, ParamMap, PromptRecord, Stage,
};
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const EVENT_BUFFER: usize = 64;

/// Lifecycle of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    SynthesizingPrompts,
    Running,
    Completed,
    Stopped,
}

impl BatchState {
    fn is_busy(self) -> bool {
        matches!(self, BatchState::SynthesizingPrompts | BatchState::Running)
    }
}

/// Something a running batch reports.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    /// One item resolved, successfully or not
    Item(ItemResult),
    /// Counts after the preceding item
    Progress(BatchProgress),
    /// The batch ended; always the last event
    Finished(BatchSummary),
}

/// Handle to a running batch.
#[derive(Debug)]
pub struct BatchRun {
    events: mpsc::Receiver<BatchEvent>,
    handle: JoinHandle<BatchSummary>,
}

impl BatchRun {
    /// Next event, or `None` once the batch has finished and all events were read.
    pub async fn next_event(&mut self) -> Option<BatchEvent> {
        self.events.recv().await
    }

    /// Stop listening and wait for the summary.
    pub async fn finish(self) -> Result<BatchSummary> {
        drop(self.events);
        self.handle
            .await
            .map_err(|e| FactoryError::Batch(e.to_string()))
    }

    /// Read every event and return the item results in completion order.
    pub async fn collect(mut self) -> Result<(Vec<ItemResult>, BatchSummary)> {
        let mut items = Vec::new();
        while let Some(event) = self.events.recv().await {
            if let BatchEvent::Item(item) = event {
                items.push(item);
            }
        }
        let summary = self.finish().await?;
        Ok((items, summary))
    }
}

/// Limits the orchestrator enforces before any network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorOptions {
    pub max_count: usize,
    pub max_upload_bytes: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl OrchestratorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_count: config.batch.max_count,
            max_upload_bytes: (config.limits.max_upload_mb as usize).saturating_mul(1024 * 1024),
        }
    }
}

/// Runs generation jobs. Cloning shares state, so a clone can stop a batch
/// started from another.
#[derive(Clone)]
pub struct Orchestrator {
    options: OrchestratorOptions,
    state: Arc<Mutex<BatchState>>,
    stop: Arc<AtomicBool>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(OrchestratorOptions::default())
    }
}

impl Orchestrator {
    pub fn new(options: OrchestratorOptions) -> Self {
        Self {
            options,
            state: Arc::new(Mutex::new(BatchState::Idle)),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> BatchState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Request a stop. In-flight items finish; no further chunk starts.
    pub fn stop_batch(&self) {
        if self.state().is_busy() {
            tracing::info!("Stop requested, finishing in-flight items");
        }
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Start a batch.
    ///
    /// Validation, credential checks, prompt synthesis and the reference
    /// upload happen before this returns; their failures fail the call.
    /// Everything after is reported through the returned [`BatchRun`].
    pub async fn run_batch(
        &self,
        provider: Arc<dyn ImageProvider>,
        prompt_provider: Arc<dyn ImageProvider>,
        translator: &ParameterTranslator,
        job: GenerationJob,
    ) -> Result<BatchRun> {
        job.validate(self.options.max_count)?;
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.is_busy() {
                return Err(FactoryError::InvalidJob(
                    "a batch is already running".to_string(),
                ));
            }
            *state = BatchState::Idle;
        }
        self.stop.store(false, Ordering::SeqCst);

        match self.prepare(provider, prompt_provider, translator, job).await {
            Ok(run) => Ok(run),
            Err(e) => {
                self.set_state(BatchState::Idle);
                Err(e)
            }
        }
    }

    async fn prepare(
        &self,
        provider: Arc<dyn ImageProvider>,
        prompt_provider: Arc<dyn ImageProvider>,
        translator: &ParameterTranslator,
        job: GenerationJob,
    ) -> Result<BatchRun> {
        if !provider.is_authenticated() {
            return Err(ProviderError::Unauthenticated {
                provider: provider.id().to_string(),
            }
            .into());
        }

        let records = match &job.prompts {
            Some(supplied) => prompts::normalize(supplied.clone(), job.count),
            None => {
                self.set_state(BatchState::SynthesizingPrompts);
                self.synthesize(prompt_provider.as_ref(), &job).await?
            }
        };
        if records.is_empty() {
            return Err(FactoryError::InvalidJob("no usable prompts".to_string()));
        }

        let reference = match (job.mode, &job.reference) {
            (GenerationMode::ReferenceVariation, Some(asset)) => {
                Some(self.upload_reference(provider.as_ref(), asset).await?)
            }
            _ => None,
        };

        let primary_model = job.primary_model().to_string();
        let primary_params =
            translator.map_parameters(&primary_model, provider.id(), &job.parameters, &job.overrides);
        let edit_model = match job.mode {
            GenerationMode::PairedTransform => job.edit_model_id.clone(),
            _ => None,
        };
        let edit_params = edit_model
            .as_deref()
            .map(|model| translator.map_parameters(model, provider.id(), &job.parameters, &job.overrides))
            .unwrap_or_default();

        let concurrency = job.effective_concurrency();
        let plan = Arc::new(ItemPlan {
            mode: job.mode,
            provider,
            caption_provider: prompt_provider,
            primary_model,
            primary_params,
            edit_model,
            edit_params,
            transformation: job.transformation.trim().to_string(),
            reference,
            caption_model: job.caption_model_id.clone(),
            trigger_word: job.trigger_word.clone(),
            stop: self.stop.clone(),
        });

        tracing::info!(
            "Starting {} batch: {} items on {}, {} at a time",
            job.mode,
            records.len(),
            plan.provider.id(),
            concurrency
        );
        self.set_state(BatchState::Running);

        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let handle = tokio::spawn(drive(
            plan,
            records,
            concurrency,
            tx,
            self.state.clone(),
            self.stop.clone(),
        ));
        Ok(BatchRun { events, handle })
    }

    async fn synthesize(
        &self,
        prompt_provider: &dyn ImageProvider,
        job: &GenerationJob,
    ) -> Result<Vec<PromptRecord>> {
        if !prompt_provider.is_authenticated() {
            return Err(ProviderError::Unauthenticated {
                provider: prompt_provider.id().to_string(),
            }
            .into());
        }
        let model = job.prompt_model_id.as_deref().ok_or_else(|| {
            FactoryError::InvalidJob("prompt_model_id is required".to_string())
        })?;

        tracing::info!(
            "Synthesizing {} prompts with {} ({model})",
            job.count,
            prompt_provider.id()
        );
        let request = prompts::prompt_request(job, model);
        let records = prompt_provider.generate_prompts(&request).await?;
        Ok(prompts::normalize(records, job.count))
    }

    async fn upload_reference(
        &self,
        provider: &dyn ImageProvider,
        asset: &ReferenceAsset,
    ) -> Result<String> {
        match asset {
            ReferenceAsset::Locator(locator) => Ok(locator.clone()),
            ReferenceAsset::Bytes { data, format } => {
                if data.len() > self.options.max_upload_bytes {
                    return Err(FactoryError::InvalidJob(format!(
                        "reference asset is {} bytes, the limit is {}",
                        data.len(),
                        self.options.max_upload_bytes
                    )));
                }
                let locator = provider
                    .upload_asset(&AssetData::from_bytes(data, format))
                    .await?;
                tracing::debug!("Reference uploaded to {}", provider.id());
                Ok(locator)
            }
        }
    }

    fn set_state(&self, next: BatchState) {
        set_state(&self.state, next);
    }
}

fn set_state(state: &Mutex<BatchState>, next: BatchState) {
    *state.lock().unwrap_or_else(|e| e.into_inner()) = next;
}

async fn drive(
    plan: Arc<ItemPlan>,
    records: Vec<PromptRecord>,
    concurrency: usize,
    tx: mpsc::Sender<BatchEvent>,
    state: Arc<Mutex<BatchState>>,
    stop: Arc<AtomicBool>,
) -> BatchSummary {
    let start = Instant::now();
    let mut progress = BatchProgress {
        completed: 0,
        failed: 0,
        total: records.len(),
    };
    let mut stopped = false;

    let items: Vec<(usize, PromptRecord)> = records
        .into_iter()
        .enumerate()
        .map(|(i, record)| (i + 1, record))
        .collect();

    for chunk in items.chunks(concurrency) {
        if stop.load(Ordering::SeqCst) {
            stopped = true;
            break;
        }

        let mut running: FuturesUnordered<_> = chunk
            .iter()
            .cloned()
            .map(|(sequence_id, record)| {
                let plan = plan.clone();
                async move { plan.run_item(sequence_id, record).await }
            })
            .collect();

        while let Some(result) = running.next().await {
            if result.is_success() {
                progress.completed += 1;
            } else {
                progress.failed += 1;
            }
            // A dropped receiver only means nobody is listening.
            let _ = tx.send(BatchEvent::Item(result)).await;
            let _ = tx.send(BatchEvent::Progress(progress)).await;
        }
    }

    let summary = BatchSummary {
        completed: progress.completed,
        failed: progress.failed,
        total: progress.total,
        stopped,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };
    set_state(
        &state,
        if stopped {
            BatchState::Stopped
        } else {
            BatchState::Completed
        },
    );
    tracing::info!(
        "Batch finished: {} completed, {} failed, {} total{}",
        summary.completed,
        summary.failed,
        summary.total,
        if stopped { " (stopped)" } else { "" }
    );
    let _ = tx.send(BatchEvent::Finished(summary)).await;
    summary
}

/// Everything an item needs, shared by all items of a batch.
struct ItemPlan {
    mode: GenerationMode,
    provider: Arc<dyn ImageProvider>,
    caption_provider: Arc<dyn ImageProvider>,
    primary_model: String,
    primary_params: ParamMap,
    edit_model: Option<String>,
    edit_params: ParamMap,
    transformation: String,
    reference: Option<String>,
    caption_model: Option<String>,
    trigger_word: Option<String>,
    stop: Arc<AtomicBool>,
}

struct StageFailure {
    stage: Stage,
    provider_id: String,
    error: ProviderError,
}

fn failed_at(stage: Stage, provider: &dyn ImageProvider) -> impl FnOnce(ProviderError) -> StageFailure {
    let provider_id = provider.id().to_string();
    move |error| StageFailure {
        stage,
        provider_id,
        error,
    }
}

impl ItemPlan {
    async fn run_item(&self, sequence_id: usize, record: PromptRecord) -> ItemResult {
        let start = Instant::now();
        let mut result = ItemResult {
            sequence_id,
            mode: self.mode,
            provider_id: self.provider.id().to_string(),
            state: ItemState::InProgress,
            prompt: record.prompt.clone(),
            edit_prompt: None,
            primary: None,
            derived: None,
            caption: None,
            failure: None,
            metadata: GenerationMetadata {
                model_id: self.primary_model.clone(),
                edit_model_id: self.edit_model.clone(),
                caption_model_id: self.caption_model.clone(),
                parameters: self.primary_params.clone(),
                elapsed_ms: 0,
            },
        };

        match self.execute(&record, &mut result).await {
            Ok(()) => result.state = ItemState::Completed,
            Err(failure) => {
                tracing::warn!(
                    "Item {sequence_id} failed at {} stage: {}",
                    failure.stage,
                    failure.error
                );
                if failure.error.is_fatal() {
                    // No later item can succeed either.
                    self.stop.store(true, Ordering::SeqCst);
                }
                result.state = ItemState::Failed;
                result.failure = Some(ItemFailure {
                    provider_id: failure.provider_id,
                    stage: failure.stage,
                    kind: failure.error.kind(),
                    message: failure.error.to_string(),
                });
            }
        }
        result.metadata.elapsed_ms = start.elapsed().as_millis() as u64;
        result
    }

    async fn execute(
        &self,
        record: &PromptRecord,
        result: &mut ItemResult,
    ) -> std::result::Result<(), StageFailure> {
        let primary = match &self.reference {
            Some(reference) => {
                self.provider
                    .edit_image(&EditRequest {
                        source: reference.clone(),
                        prompt: record.prompt.clone(),
                        model_id: self.primary_model.clone(),
                        params: self.primary_params.clone(),
                    })
                    .await
            }
            None => {
                self.provider
                    .generate_image(&ImageRequest {
                        prompt: record.prompt.clone(),
                        model_id: self.primary_model.clone(),
                        params: self.primary_params.clone(),
                    })
                    .await
            }
        }
        .map_err(failed_at(Stage::Primary, self.provider.as_ref()))?;
        result.primary = Some(primary.clone());

        if let Some(edit_model) = &self.edit_model {
            let edit_prompt = record
                .edit
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .unwrap_or(self.transformation.as_str())
                .to_string();
            result.edit_prompt = Some(edit_prompt.clone());

            let derived = self
                .provider
                .edit_image(&EditRequest {
                    source: primary,
                    prompt: edit_prompt,
                    model_id: edit_model.clone(),
                    params: self.edit_params.clone(),
                })
                .await
                .map_err(failed_at(Stage::Derived, self.provider.as_ref()))?;
            result.derived = Some(derived);
        }

        let caption = match &self.caption_model {
            Some(model_id) => {
                let locator = result
                    .derived
                    .clone()
                    .or_else(|| result.primary.clone())
                    .unwrap_or_default();
                self.caption_provider
                    .caption_image(&CaptionRequest {
                        locator,
                        model_id: model_id.clone(),
                    })
                    .await
                    .map_err(failed_at(Stage::Caption, self.caption_provider.as_ref()))?
            }
            None => record
                .action
                .clone()
                .filter(|a| !a.trim().is_empty())
                .or_else(|| result.edit_prompt.clone())
                .unwrap_or_else(|| record.prompt.clone()),
        };
        result.caption = Some(with_trigger(self.trigger_word.as_deref(), caption));
        Ok(())
    }
}

/// Prefix `caption` with the trigger word unless it already starts with it.
fn with_trigger(trigger: Option<&str>, caption: String) -> String {
    match trigger.map(str::trim).filter(|t| !t.is_empty()) {
        Some(trigger) if !caption.starts_with(trigger) => format!("{trigger}, {caption}"),
        _ => caption,
    }
}

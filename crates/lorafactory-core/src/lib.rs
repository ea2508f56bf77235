//! LoRAFactory Core - provider-agnostic batch generation engine.
//!
//! Drives heterogeneous generative-image and LLM backends through one
//! capability contract to produce LoRA training datasets: synthesized
//! prompts, primary images, optional edited twins and captions.
//!
//! # Architecture
//!
//! ```text
//! Job → Prompt synthesis → [Primary → Derived → Caption] × N → ItemResult stream
//!                          (chunks of `concurrency_limit`)
//! ```
//!
//! Providers live in a [`ProviderRegistry`], per-model parameter schemas in a
//! [`SchemaStore`], and the [`ParameterTranslator`] maps generic values to
//! each provider's wire shape. [`LoraFactory`] owns one of each.
//!
//! # Usage
//!
//! ```rust,ignore
//! use lorafactory_core::{BatchEvent, Config, LoraFactory};
//!
//! #[tokio::main]
//! async fn main() -> lorafactory_core::Result<()> {
//!     let factory = LoraFactory::new(Config::load()?)?;
//!     let mut job = factory.job("studio portraits");
//!     job.transformation = "relight with a single hard key light".into();
//!
//!     let mut run = factory.run(job).await?;
//!     while let Some(event) = run.next_event().await {
//!         if let BatchEvent::Item(item) = event {
//!             println!("{} -> {:?}", item.sequence_id, item.derived);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod output;
pub mod params;
pub mod provider;
pub mod schema;
pub mod types;

pub use batch::{
    BatchEvent, BatchRun, BatchState, GenerationJob, Orchestrator, OrchestratorOptions,
    ReferenceAsset,
};
pub use config::Config;
pub use error::{ConfigError, ErrorKind, FactoryError, ProviderError, ProviderResult, Result};
pub use output::{ManifestWriter, OutputFormat};
pub use params::{cost_multiplier, validate_parameters, ParameterTranslator, ValidationReport};
pub use provider::{ImageProvider, ProviderFactory, ProviderRegistry};
pub use schema::{ModelSchema, SchemaOrigin, SchemaStore};
pub use types::{
    BatchProgress, BatchSummary, Capability, GenerationMode, ItemResult, ItemState, ParamMap,
    PromptRecord,
};

use std::sync::Arc;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Composition root owning the registry, schema store, translator and
/// orchestrator for one process.
pub struct LoraFactory {
    config: Config,
    registry: ProviderRegistry,
    schemas: SchemaStore,
    translator: ParameterTranslator,
    orchestrator: Orchestrator,
}

impl LoraFactory {
    /// Build every provider the configuration names.
    pub fn new(config: Config) -> Result<Self> {
        let registry = ProviderFactory::build_registry(&config)?;
        Ok(Self::with_registry(config, registry))
    }

    /// Use a caller-assembled registry.
    pub fn with_registry(config: Config, registry: ProviderRegistry) -> Self {
        tracing::debug!(
            "Initializing LoRAFactory v{} with {} providers",
            VERSION,
            registry.get_all().len()
        );
        Self {
            schemas: SchemaStore::from_config(&config),
            orchestrator: Orchestrator::new(OrchestratorOptions::from_config(&config)),
            translator: ParameterTranslator::new(),
            registry,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ProviderRegistry {
        &mut self.registry
    }

    pub fn schemas(&self) -> &SchemaStore {
        &self.schemas
    }

    pub fn translator(&self) -> &ParameterTranslator {
        &self.translator
    }

    /// Shared handle; clones can stop a running batch.
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// A job filled from the configured batch defaults, on the active provider.
    pub fn job(&self, theme: impl Into<String>) -> GenerationJob {
        let mut job = GenerationJob::from_config(&self.config.batch, theme);
        job.provider_id = self.registry.active().id().to_string();
        job
    }

    /// Validate the job's provider-shaped primary parameters against the
    /// model schema.
    pub async fn validate_job(&self, job: &GenerationJob) -> ValidationReport {
        let model_id = job.primary_model();
        let schema = self.schemas.fetch_schema(model_id).await;
        let mut values = self.translator.map_parameters(
            model_id,
            &job.provider_id,
            &job.parameters,
            &job.overrides,
        );
        // The prompt travels on the request, not in the parameter map.
        let sample_prompt = job
            .prompts
            .as_ref()
            .and_then(|p| p.first())
            .map(|p| p.prompt.clone())
            .unwrap_or_else(|| job.theme.clone());
        values
            .entry("prompt".to_string())
            .or_insert(serde_json::Value::String(sample_prompt));
        validate_parameters(&schema, &values)
    }

    /// Resolve the job's providers and start the batch.
    ///
    /// Schema violations are logged, not enforced: the backend has the final
    /// say on its own parameters.
    pub async fn run(&self, job: GenerationJob) -> Result<BatchRun> {
        let provider = self.provider(&job.provider_id)?;
        let prompt_provider = self.provider(job.prompt_provider())?;

        for capability in required_capabilities(&job) {
            let target = match capability {
                Capability::GenerateTextPrompts | Capability::CaptionImage => &prompt_provider,
                _ => &provider,
            };
            if !target.supports(capability) {
                return Err(ProviderError::unsupported(target.id(), capability, None).into());
            }
        }

        let report = self.validate_job(&job).await;
        for issue in &report.errors {
            tracing::warn!("Parameter '{}': {}", issue.field, issue.message);
        }

        self.orchestrator
            .run_batch(provider, prompt_provider, &self.translator, job)
            .await
    }

    /// Request a stop of the running batch.
    pub fn stop(&self) {
        self.orchestrator.stop_batch();
    }

    fn provider(&self, id: &str) -> Result<Arc<dyn ImageProvider>> {
        self.registry
            .get(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()).into())
    }
}

/// Capabilities a job needs, in pipeline order.
fn required_capabilities(job: &GenerationJob) -> Vec<Capability> {
    let mut needed = Vec::new();
    if job.prompts.is_none() {
        needed.push(Capability::GenerateTextPrompts);
    }
    match job.mode {
        GenerationMode::Single => needed.push(Capability::GenerateImage),
        GenerationMode::PairedTransform => {
            needed.push(Capability::GenerateImage);
            needed.push(Capability::EditImage);
        }
        GenerationMode::ReferenceVariation => {
            if matches!(job.reference, Some(ReferenceAsset::Bytes { .. })) {
                needed.push(Capability::UploadAsset);
            }
            needed.push(Capability::EditImage);
        }
    }
    if job.caption_model_id.is_some() {
        needed.push(Capability::CaptionImage);
    }
    needed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{EditRequest, ImageRequest};
    use async_trait::async_trait;

    /// Generates and edits, but has no text capabilities.
    struct ImageOnly;

    #[async_trait]
    impl ImageProvider for ImageOnly {
        fn id(&self) -> &str {
            "images"
        }
        fn name(&self) -> &str {
            "Images"
        }
        fn capabilities(&self) -> &[Capability] {
            &[Capability::GenerateImage, Capability::EditImage]
        }
        fn set_credential(&self, _secret: Option<&str>) {}
        fn is_authenticated(&self) -> bool {
            true
        }
        async fn generate_image(&self, request: &ImageRequest) -> ProviderResult<String> {
            Ok(format!("https://img.test/{}.png", request.prompt.len()))
        }
        async fn edit_image(&self, request: &EditRequest) -> ProviderResult<String> {
            Ok(format!("{}?edited", request.source))
        }
    }

    fn factory() -> (LoraFactory, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.schema.discovery = false;
        config.general.cache_dir = dir.path().to_path_buf();
        let registry = ProviderRegistry::new(Arc::new(ImageOnly));
        (LoraFactory::with_registry(config, registry), dir)
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_new_builds_configured_providers() {
        let mut config = Config::default();
        config.schema.discovery = false;
        let factory = LoraFactory::new(config).unwrap();
        assert_eq!(factory.registry().active().id(), "fal");
        assert!(factory.registry().get("openrouter").is_some());
        assert_eq!(factory.job("cats").provider_id, "fal");
    }

    #[tokio::test]
    async fn test_unknown_provider_is_not_found() {
        let (factory, _dir) = factory();
        let mut job = factory.job("cats");
        job.provider_id = "nope".to_string();
        let err = factory.run(job).await.unwrap_err();
        assert!(matches!(
            err,
            FactoryError::Provider(ProviderError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_capability_fails_before_running() {
        let (factory, _dir) = factory();
        let mut job = factory.job("cats");
        job.prompt_provider_id = None;
        job.transformation = "make it snow".to_string();
        let err = factory.run(job).await.unwrap_err();
        assert!(matches!(
            err,
            FactoryError::Provider(ProviderError::CapabilityUnsupported {
                capability: Capability::GenerateTextPrompts,
                ..
            })
        ));
        assert_eq!(factory.orchestrator().state(), BatchState::Idle);
    }

    #[tokio::test]
    async fn test_run_with_supplied_prompts() {
        let (factory, _dir) = factory();
        let mut job = factory.job("cats");
        job.mode = GenerationMode::PairedTransform;
        job.prompt_provider_id = None;
        job.transformation = "make it snow".to_string();
        job.count = 2;
        job.prompts = Some(vec![
            PromptRecord::new("a cat on a sofa"),
            PromptRecord::new("a cat in a box"),
        ]);

        let (items, summary) = factory.run(job).await.unwrap().collect().await.unwrap();
        assert_eq!((summary.completed, summary.total), (2, 2));
        assert!(items
            .iter()
            .all(|i| i.derived.as_deref().is_some_and(|d| d.ends_with("?edited"))));
    }

    #[tokio::test]
    async fn test_validate_job_reports_out_of_range_values() {
        let (factory, _dir) = factory();
        let mut job = factory.job("cats");
        job.mode = GenerationMode::Single;
        job.model_id = "fal-ai/flux/dev".to_string();
        job.parameters
            .insert("num_images".to_string(), serde_json::json!(9));

        let report = factory.validate_job(&job).await;
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].field, "num_images");

        job.parameters.insert("num_images".to_string(), serde_json::json!(2));
        assert!(factory.validate_job(&job).await.valid);
    }
}

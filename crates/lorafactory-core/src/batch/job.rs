//! Job descriptions accepted by the orchestrator.

use crate::config::{BatchConfig, MAX_CONCURRENCY};
use crate::error::{FactoryError, Result};
use crate::types::{GenerationMode, ParamMap, PromptRecord};

/// Reference asset for reference-variation jobs.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceAsset {
    /// Raw bytes plus a format hint such as "png"; uploaded before the run
    Bytes { data: Vec<u8>, format: String },
    /// An already reachable locator; used as is
    Locator(String),
}

/// A high-level description of one batch.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub mode: GenerationMode,
    pub count: usize,
    /// Requested parallelism; see [`GenerationJob::effective_concurrency`]
    pub concurrency_limit: usize,
    pub provider_id: String,
    pub model_id: String,
    /// Model for the derived asset (paired) or the variation (reference)
    pub edit_model_id: Option<String>,
    /// Provider for prompt synthesis and captions; defaults to `provider_id`
    pub prompt_provider_id: Option<String>,
    pub prompt_model_id: Option<String>,
    pub theme: String,
    pub transformation: String,
    pub reference: Option<ReferenceAsset>,
    /// Generic parameter values
    pub parameters: ParamMap,
    /// Static overrides; generic values win on conflict
    pub overrides: ParamMap,
    pub caption_model_id: Option<String>,
    pub trigger_word: Option<String>,
    /// Caller-supplied prompts; skips synthesis when present
    pub prompts: Option<Vec<PromptRecord>>,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl GenerationJob {
    /// A job filled from the configured batch defaults.
    pub fn from_config(config: &BatchConfig, theme: impl Into<String>) -> Self {
        Self {
            mode: config.mode,
            count: config.count,
            concurrency_limit: config.concurrency,
            provider_id: config.provider.clone(),
            model_id: config.image_model.clone(),
            edit_model_id: non_empty(&config.edit_model),
            prompt_provider_id: non_empty(&config.prompt_provider),
            prompt_model_id: non_empty(&config.prompt_model),
            theme: theme.into(),
            transformation: String::new(),
            reference: None,
            parameters: config.parameters.clone(),
            overrides: ParamMap::new(),
            caption_model_id: non_empty(&config.caption_model),
            trigger_word: non_empty(&config.trigger_word),
            prompts: None,
        }
    }

    /// Parallelism actually used: clamped to `1..=MAX_CONCURRENCY`, then
    /// capped at `count`.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency_limit
            .clamp(1, MAX_CONCURRENCY)
            .min(self.count.max(1))
    }

    /// Provider used for prompt synthesis and captions.
    pub fn prompt_provider(&self) -> &str {
        self.prompt_provider_id
            .as_deref()
            .unwrap_or(self.provider_id.as_str())
    }

    /// Model producing the primary asset.
    ///
    /// Reference variations edit the reference, so they prefer the edit model.
    pub fn primary_model(&self) -> &str {
        match (self.mode, self.edit_model_id.as_deref()) {
            (GenerationMode::ReferenceVariation, Some(edit)) => edit,
            _ => &self.model_id,
        }
    }

    /// Reject jobs that cannot run. Performs no I/O.
    pub fn validate(&self, max_count: usize) -> Result<()> {
        let invalid = |msg: String| Err(FactoryError::InvalidJob(msg));

        if self.count == 0 {
            return invalid("count must be at least 1".to_string());
        }
        if self.count > max_count {
            return invalid(format!(
                "count {} exceeds the limit of {max_count}",
                self.count
            ));
        }
        if self.provider_id.trim().is_empty() {
            return invalid("provider_id must not be empty".to_string());
        }
        if self.model_id.trim().is_empty() {
            return invalid("model_id must not be empty".to_string());
        }

        match &self.prompts {
            Some(prompts) if prompts.is_empty() => {
                return invalid("supplied prompt list is empty".to_string());
            }
            Some(prompts) if prompts.iter().any(|p| p.prompt.trim().is_empty()) => {
                return invalid("supplied prompts must not be blank".to_string());
            }
            Some(_) => {}
            None => {
                if self.theme.trim().is_empty() {
                    return invalid("theme is required when prompts are synthesized".to_string());
                }
                if self.prompt_model_id.is_none() {
                    return invalid(
                        "prompt_model_id is required when prompts are synthesized".to_string(),
                    );
                }
            }
        }

        match self.mode {
            GenerationMode::PairedTransform => {
                if self.edit_model_id.is_none() {
                    return invalid("paired-transform jobs need an edit model".to_string());
                }
                let every_prompt_has_edit = self.prompts.as_ref().is_some_and(|prompts| {
                    prompts
                        .iter()
                        .all(|p| p.edit.as_deref().is_some_and(|e| !e.trim().is_empty()))
                });
                if self.transformation.trim().is_empty() && !every_prompt_has_edit {
                    return invalid(
                        "paired-transform jobs need a transformation or per-prompt edits"
                            .to_string(),
                    );
                }
            }
            GenerationMode::ReferenceVariation => {
                if self.reference.is_none() {
                    return invalid("reference-variation jobs need a reference asset".to_string());
                }
            }
            GenerationMode::Single => {}
        }
        Ok(())
    }
}

//! Core data types shared by providers, the translator and the orchestrator.
//!
//! The result types in this module are what callers (and the archive
//! packager downstream) receive for every work item of a batch.

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};

/// A flat map of parameter name to JSON value.
///
/// `serde_json::Map` is ordered by key, which keeps translated payloads
/// deterministic.
pub type ParamMap = serde_json::Map<String, serde_json::Value>;

/// One named operation a provider may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    GenerateImage,
    EditImage,
    GenerateTextPrompts,
    CaptionImage,
    UploadAsset,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::GenerateImage,
        Capability::EditImage,
        Capability::GenerateTextPrompts,
        Capability::CaptionImage,
        Capability::UploadAsset,
    ];
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::GenerateImage => "generate-image",
            Capability::EditImage => "edit-image",
            Capability::GenerateTextPrompts => "generate-text-prompts",
            Capability::CaptionImage => "caption-image",
            Capability::UploadAsset => "upload-asset",
        };
        f.write_str(name)
    }
}

/// How the items of a job are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationMode {
    /// Generate a base image, then derive an edited twin from it.
    #[default]
    PairedTransform,
    /// Generate one image per prompt.
    Single,
    /// Edit a shared reference asset once per prompt.
    ReferenceVariation,
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationMode::PairedTransform => write!(f, "paired-transform"),
            GenerationMode::Single => write!(f, "single"),
            GenerationMode::ReferenceVariation => write!(f, "reference-variation"),
        }
    }
}

/// One synthesized prompt, as returned by a provider's prompt generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
    /// Prompt for the primary asset
    pub prompt: String,

    /// Edit instruction for the derived asset (paired mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit: Option<String>,

    /// Short action text describing the transformation, used as the caption
    /// when captioning is disabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl PromptRecord {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            edit: None,
            action: None,
        }
    }
}

/// Lifecycle of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemState {
    Queued,
    InProgress,
    Completed,
    Failed,
}

/// Pipeline stage an item failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Prompt,
    Reference,
    Primary,
    Derived,
    Caption,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Prompt => write!(f, "prompt"),
            Stage::Reference => write!(f, "reference"),
            Stage::Primary => write!(f, "primary"),
            Stage::Derived => write!(f, "derived"),
            Stage::Caption => write!(f, "caption"),
        }
    }
}

/// Why a single item failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub provider_id: String,
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

/// Generation metadata recorded alongside each item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationMetadata {
    /// Model used for the primary asset
    pub model_id: String,

    /// Model used for the derived asset, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_model_id: Option<String>,

    /// Model used for captioning, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption_model_id: Option<String>,

    /// Provider-shaped parameters sent with the primary request
    pub parameters: ParamMap,

    /// Wall-clock time spent on the item
    pub elapsed_ms: u64,
}

/// Result record for one work item.
///
/// Carries enough identifying fields for a packager to name and archive the
/// assets without consulting any other state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResult {
    /// 1-based position of the item in its job
    pub sequence_id: usize,

    pub mode: GenerationMode,

    pub provider_id: String,

    pub state: ItemState,

    /// Prompt used for the primary asset
    pub prompt: String,

    /// Edit instruction used for the derived asset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_prompt: Option<String>,

    /// Locator of the primary asset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,

    /// Locator of the derived asset (paired mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived: Option<String>,

    /// Caption or action text, trigger word already applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ItemFailure>,

    pub metadata: GenerationMetadata,
}

impl ItemResult {
    pub fn is_success(&self) -> bool {
        self.state == ItemState::Completed
    }
}

/// Running totals, reported after every item resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchProgress {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl BatchProgress {
    pub fn resolved(&self) -> usize {
        self.completed + self.failed
    }
}

/// Terminal summary of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,

    /// True if the caller stopped the batch before every item ran
    pub stopped: bool,

    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_serializes_kebab_case() {
        let json = serde_json::to_string(&Capability::GenerateTextPrompts).unwrap();
        assert_eq!(json, "\"generate-text-prompts\"");
        assert_eq!(Capability::EditImage.to_string(), "edit-image");
    }

    #[test]
    fn test_prompt_record_optional_fields_omitted() {
        let json = serde_json::to_value(PromptRecord::new("a cat")).unwrap();
        assert_eq!(json, serde_json::json!({"prompt": "a cat"}));
    }

    #[test]
    fn test_item_state_wire_names() {
        let json = serde_json::to_string(&ItemState::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
    }

    #[test]
    fn test_progress_resolved() {
        let p = BatchProgress {
            completed: 2,
            failed: 1,
            total: 5,
        };
        assert_eq!(p.resolved(), 3);
    }
}

//! Error types for the LoRAFactory orchestration engine.
//!
//! Provider errors follow the capability contract's taxonomy so the
//! orchestrator can decide per error whether it ends one work item or the
//! whole batch.

use crate::types::Capability;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for LoRAFactory operations.
#[derive(Error, Debug)]
pub enum FactoryError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Provider errors that are fatal to the whole operation
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The job description was rejected before any network call
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// The batch driver task ended abnormally
    #[error("Batch task failed: {0}")]
    Batch(String),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Why a generation call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationCause {
    /// Connection failure or an unclassified non-2xx response
    Transport,
    /// The backend rejected the request parameters
    Validation,
    /// The backend refused the prompt or output on policy grounds
    ContentPolicy,
    /// A polled task did not reach a terminal state in time
    Timeout,
}

impl std::fmt::Display for GenerationCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationCause::Transport => write!(f, "transport"),
            GenerationCause::Validation => write!(f, "validation"),
            GenerationCause::ContentPolicy => write!(f, "content policy"),
            GenerationCause::Timeout => write!(f, "timeout"),
        }
    }
}

/// Errors raised by provider adapters, the registry and the schema store.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// No credential configured at call time; raised before any network I/O
    #[error("Provider '{provider}' has no credential configured")]
    Unauthenticated { provider: String },

    /// Asset upload failed in transport or was rejected by the backend
    #[error("Upload to '{provider}' failed: {message}")]
    Upload {
        provider: String,
        message: String,
        status_code: Option<u16>,
    },

    /// Image generation or editing failed
    #[error("Generation on '{provider}' failed ({cause}): {message}")]
    Generation {
        provider: String,
        cause: GenerationCause,
        message: String,
        status_code: Option<u16>,
    },

    /// The provider (or provider/model pair) does not offer this operation
    #[error("Provider '{provider}' does not support {capability}{}", model.as_ref().map(|m| format!(" for model '{m}'")).unwrap_or_default())]
    CapabilityUnsupported {
        provider: String,
        capability: Capability,
        model: Option<String>,
    },

    /// A structured result could not be extracted from the response
    #[error("Could not parse response from '{provider}': {message}")]
    Parse { provider: String, message: String },

    /// Not even the built-in minimal schema could be produced
    #[error("No schema available for model '{0}'")]
    SchemaUnavailable(String),

    /// Unknown provider id
    #[error("Provider not found: {0}")]
    NotFound(String),
}

/// Serializable classification of a [`ProviderError`], stored on failed items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    Upload,
    Generation { cause: GenerationCause },
    CapabilityUnsupported,
    Parse,
    SchemaUnavailable,
    NotFound,
}

impl ProviderError {
    /// Shorthand for a transport-level generation failure.
    pub fn transport(provider: &str, message: impl Into<String>) -> Self {
        ProviderError::Generation {
            provider: provider.to_string(),
            cause: GenerationCause::Transport,
            message: message.into(),
            status_code: None,
        }
    }

    /// Shorthand for a parse failure.
    pub fn parse(provider: &str, message: impl Into<String>) -> Self {
        ProviderError::Parse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// Shorthand for an unsupported operation.
    pub fn unsupported(provider: &str, capability: Capability, model: Option<&str>) -> Self {
        ProviderError::CapabilityUnsupported {
            provider: provider.to_string(),
            capability,
            model: model.map(String::from),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            ProviderError::Upload { .. } => ErrorKind::Upload,
            ProviderError::Generation { cause, .. } => ErrorKind::Generation { cause: *cause },
            ProviderError::CapabilityUnsupported { .. } => ErrorKind::CapabilityUnsupported,
            ProviderError::Parse { .. } => ErrorKind::Parse,
            ProviderError::SchemaUnavailable(_) => ErrorKind::SchemaUnavailable,
            ProviderError::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Whether this error indicates a configuration problem that no retry or
    /// sibling item can recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProviderError::Unauthenticated { .. } | ProviderError::NotFound(_)
        )
    }
}

/// Convenience type alias for LoRAFactory results.
pub type Result<T> = std::result::Result<T, FactoryError>;

/// Convenience type alias for provider-level results.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

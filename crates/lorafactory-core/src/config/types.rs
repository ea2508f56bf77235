//! Sub-configuration structs with their defaults.

use crate::types::{GenerationMode, ParamMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory for the persistent schema cache
    pub cache_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("~/.lorafactory/cache"),
        }
    }
}

/// Batch defaults applied when the caller does not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Provider used for image generation
    pub provider: String,

    /// Provider used for prompt synthesis and captioning
    pub prompt_provider: String,

    /// Generation mode
    pub mode: GenerationMode,

    /// Number of items per job
    pub count: usize,

    /// Items running concurrently (1..=10)
    pub concurrency: usize,

    /// Hard ceiling on `count`, enforced before any network call
    pub max_count: usize,

    /// Model for the primary asset
    pub image_model: String,

    /// Model for the derived asset in paired and reference modes
    pub edit_model: String,

    /// Model used for prompt synthesis
    pub prompt_model: String,

    /// Model used for captioning; empty disables captioning
    pub caption_model: String,

    /// Token prepended to every caption; empty disables it
    pub trigger_word: String,

    /// Generic parameter values applied to every item
    pub parameters: ParamMap,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            provider: "fal".to_string(),
            prompt_provider: "openrouter".to_string(),
            mode: GenerationMode::PairedTransform,
            count: 10,
            concurrency: 3,
            max_count: 100,
            image_model: "fal-ai/flux/dev".to_string(),
            edit_model: "fal-ai/nano-banana/edit".to_string(),
            prompt_model: "openai/gpt-4o-mini".to_string(),
            caption_model: String::new(),
            trigger_word: String::new(),
            parameters: ParamMap::new(),
        }
    }
}

/// Retry policy for create-task/poll backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between status checks in milliseconds
    pub interval_ms: u64,

    /// Status checks before the task counts as timed out
    pub max_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            max_attempts: 60,
        }
    }
}

/// Schema discovery and caching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Whether to query the backend for live schemas
    pub discovery: bool,

    /// Discovery URL; `{model}` is replaced with the model id
    pub discovery_url: String,

    /// Lifetime of disk-cached schemas in hours
    pub cache_ttl_hours: u64,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            discovery: true,
            discovery_url: "https://fal.ai/api/openapi/queue/openapi.json?endpoint_id={model}"
                .to_string(),
            cache_ttl_hours: 168,
        }
    }
}

/// Resource limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Maximum reference asset size in megabytes
    pub max_upload_mb: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 300_000,
            max_upload_mb: 20,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log format: pretty, json
    pub format: String,

    /// Directory for the daily log file; empty disables file logging
    pub file_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_dir: String::new(),
        }
    }
}

/// Provider settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Provider activated at startup; also the one that cannot be unregistered
    pub default: Option<String>,

    pub fal: FalConfig,
    pub kie: KieConfig,
    pub openrouter: OpenRouterConfig,

    /// Backends described entirely by configuration
    pub custom: Vec<TemplateProviderConfig>,
}

/// fal.ai (immediate-subscribe) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FalConfig {
    /// API base URL
    pub endpoint: String,

    /// API key (supports `${ENV_VAR}` syntax)
    pub api_key: String,

    /// Models that accept edits in addition to those with "edit" in their id
    pub edit_models: Vec<String>,
}

impl Default for FalConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://fal.run".to_string(),
            api_key: "${FAL_KEY}".to_string(),
            edit_models: Vec::new(),
        }
    }
}

/// Kie.ai (create-task/poll) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KieConfig {
    pub endpoint: String,
    pub api_key: String,
    pub edit_models: Vec<String>,
}

impl Default for KieConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.kie.ai".to_string(),
            api_key: "${KIE_API_KEY}".to_string(),
            edit_models: Vec::new(),
        }
    }
}

/// OpenRouter (chat-completion) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenRouterConfig {
    pub endpoint: String,
    pub api_key: String,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://openrouter.ai/api/v1".to_string(),
            api_key: "${OPENROUTER_API_KEY}".to_string(),
        }
    }
}

/// How a template provider authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum AuthScheme {
    /// `Authorization: Bearer <secret>`
    #[default]
    Bearer,
    /// A named header with an optional value prefix
    Header {
        name: String,
        #[serde(default)]
        prefix: String,
    },
    /// A query string parameter
    Query { name: String },
    /// No authentication; the adapter never reports `Unauthenticated`
    None,
}

/// One templated operation of a template provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointTemplate {
    /// HTTP method
    #[serde(default = "default_method")]
    pub method: String,

    /// Path appended to `base_url`; may contain `{{placeholders}}`
    pub path: String,

    /// JSON body template; string values may contain `{{placeholders}}`
    #[serde(default)]
    pub body: Option<serde_json::Value>,

    /// Merge the translated parameters into the top level of the body
    #[serde(default)]
    pub merge_params: bool,

    /// Dot path to the result inside the response, e.g. `data.0.url`
    pub response_path: String,
}

fn default_method() -> String {
    "POST".to_string()
}

/// Templates for each contract operation; absent ones are unsupported.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateOperations {
    pub upload_asset: Option<EndpointTemplate>,
    pub generate_image: Option<EndpointTemplate>,
    pub edit_image: Option<EndpointTemplate>,
    pub generate_prompts: Option<EndpointTemplate>,
    pub caption_image: Option<EndpointTemplate>,
}

/// A backend described entirely by configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateProviderConfig {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub auth: AuthScheme,

    /// Extra static headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub operations: TemplateOperations,
}

//! Per-model parameter schemas.
//!
//! A [`SchemaStore`] always resolves a model id to some [`ModelSchema`],
//! walking memory, the disk cache, live discovery and the static fallback
//! table before settling on a minimal prompt-only schema.

mod cache;
mod discovery;
pub(crate) mod fallback;

pub use cache::DiskCache;
pub use discovery::{parse_document, HttpSchemaSource};
pub use fallback::fallback_schema;

use crate::config::Config;
use crate::error::ProviderResult;
use crate::types::ParamMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Never shown to users; set by the orchestrator or adapters.
const HIDDEN_PARAMS: &[&str] = &[
    "sync_mode",
    "webhook_url",
    "image_url",
    "image_urls",
    "mask_url",
];

const BASIC_PARAMS: &[&str] = &[
    "prompt",
    "image_size",
    "aspect_ratio",
    "resolution",
    "num_images",
    "quality",
];

/// Primitive or structural kind of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Enum,
    Union,
    /// Arrays, objects and other values the caller never edits directly
    Hidden,
}

/// Presentation group of a parameter. Never consulted by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Basic,
    Advanced,
    Hidden,
}

impl Category {
    /// Static name rule: a short hidden deny-list, a basic allow-list,
    /// everything else advanced.
    pub fn for_name(name: &str) -> Self {
        if HIDDEN_PARAMS.contains(&name) {
            Category::Hidden
        } else if BASIC_PARAMS.contains(&name) {
            Category::Basic
        } else {
            Category::Advanced
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Allowed values for enums
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Value>,
}

/// One alternative of a union-typed parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum UnionShape {
    /// A named preset; an empty list accepts any string
    Preset { values: Vec<String> },
    /// An object with the given fields, all required
    Custom { fields: BTreeMap<String, ParamKind> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub kind: ParamKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub constraints: Constraints,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Alternatives of a union parameter
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shapes: Vec<UnionShape>,
}

impl ParameterDescriptor {
    /// New optional descriptor; the category follows the name rule.
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        let name = name.into();
        Self {
            category: Category::for_name(&name),
            name,
            kind,
            required: false,
            default: None,
            constraints: Constraints::default(),
            description: None,
            shapes: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn range(mut self, minimum: f64, maximum: f64) -> Self {
        self.constraints.minimum = Some(minimum);
        self.constraints.maximum = Some(maximum);
        self
    }

    pub fn values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.constraints.values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn shape(mut self, shape: UnionShape) -> Self {
        self.shapes.push(shape);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Value used when building a schema's default set: the declared
    /// default, or a neutral value for a required field that lacks one.
    fn default_or_neutral(&self) -> Option<Value> {
        if let Some(default) = &self.default {
            return Some(default.clone());
        }
        if !self.required {
            return None;
        }
        let value = match self.kind {
            ParamKind::String | ParamKind::Hidden => Value::String(String::new()),
            ParamKind::Integer => self
                .constraints
                .minimum
                .map(|m| Value::from(m.ceil() as i64))
                .unwrap_or_else(|| Value::from(0)),
            ParamKind::Number => Value::from(self.constraints.minimum.unwrap_or(0.0)),
            ParamKind::Boolean => Value::Bool(false),
            ParamKind::Enum => self.constraints.values.first()?.clone(),
            ParamKind::Union => match self.shapes.first()? {
                UnionShape::Preset { values } => {
                    Value::String(values.first().cloned().unwrap_or_default())
                }
                UnionShape::Custom { fields } => Value::Object(
                    fields
                        .iter()
                        .map(|(name, kind)| {
                            let neutral = match kind {
                                ParamKind::Boolean => Value::Bool(false),
                                ParamKind::Integer | ParamKind::Number => Value::from(0),
                                _ => Value::String(String::new()),
                            };
                            (name.clone(), neutral)
                        })
                        .collect(),
                ),
            },
        };
        Some(value)
    }
}

/// Which resolution layer produced a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaOrigin {
    Memory,
    Disk,
    Live,
    Fallback,
    Minimal,
}

impl std::fmt::Display for SchemaOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SchemaOrigin::Memory => "memory",
            SchemaOrigin::Disk => "disk",
            SchemaOrigin::Live => "live",
            SchemaOrigin::Fallback => "fallback",
            SchemaOrigin::Minimal => "minimal",
        };
        f.write_str(name)
    }
}

/// Ordered parameter descriptors for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub model_id: String,
    pub parameters: Vec<ParameterDescriptor>,
    pub required: BTreeSet<String>,
    pub source: SchemaOrigin,
}

impl ModelSchema {
    pub fn new(
        model_id: impl Into<String>,
        source: SchemaOrigin,
        parameters: Vec<ParameterDescriptor>,
    ) -> Self {
        let required = parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.clone())
            .collect();
        Self {
            model_id: model_id.into(),
            parameters,
            required,
            source,
        }
    }

    /// Schema exposing only a required free-text prompt.
    pub fn minimal(model_id: &str) -> Self {
        Self::new(
            model_id,
            SchemaOrigin::Minimal,
            vec![ParameterDescriptor::new("prompt", ParamKind::String)
                .required()
                .describe("Text prompt")],
        )
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// The schema's default value set.
    pub fn defaults(&self) -> ParamMap {
        self.parameters
            .iter()
            .filter_map(|p| p.default_or_neutral().map(|v| (p.name.clone(), v)))
            .collect()
    }

    fn with_source(mut self, source: SchemaOrigin) -> Self {
        self.source = source;
        self
    }
}

/// Live schema discovery backend.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn discover(&self, model_id: &str) -> ProviderResult<ModelSchema>;
}

/// Resolves model ids to schemas through the fallback chain.
pub struct SchemaStore {
    memory: RwLock<HashMap<String, ModelSchema>>,
    disk: Option<DiskCache>,
    source: Option<Arc<dyn SchemaSource>>,
}

impl Default for SchemaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaStore {
    /// Store with only the memory layer and the static tables.
    pub fn new() -> Self {
        Self {
            memory: RwLock::new(HashMap::new()),
            disk: None,
            source: None,
        }
    }

    pub fn with_disk_cache(mut self, disk: DiskCache) -> Self {
        self.disk = Some(disk);
        self
    }

    pub fn with_source(mut self, source: Arc<dyn SchemaSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Store wired to the configured cache directory and discovery URL.
    pub fn from_config(config: &Config) -> Self {
        let ttl = Duration::from_secs(config.schema.cache_ttl_hours.saturating_mul(3600));
        let mut store = Self::new().with_disk_cache(DiskCache::new(config.cache_dir(), ttl));
        if config.schema.discovery {
            let timeout = Duration::from_millis(config.limits.request_timeout_ms);
            store = store.with_source(Arc::new(HttpSchemaSource::new(
                &config.schema.discovery_url,
                timeout,
            )));
        }
        store
    }

    /// Resolve a schema. Never fails: every layer falls through to the next.
    pub async fn fetch_schema(&self, model_id: &str) -> ModelSchema {
        if let Some(schema) = self.from_memory(model_id) {
            return schema.with_source(SchemaOrigin::Memory);
        }

        if let Some(disk) = &self.disk {
            if let Some(schema) = disk.load(model_id) {
                tracing::debug!("Schema for {model_id} loaded from disk cache");
                self.remember(&schema);
                return schema.with_source(SchemaOrigin::Disk);
            }
        }

        if let Some(source) = &self.source {
            match source.discover(model_id).await {
                Ok(schema) => {
                    let schema = schema.with_source(SchemaOrigin::Live);
                    tracing::debug!(
                        "Discovered {} parameters for {model_id}",
                        schema.parameters.len()
                    );
                    if let Some(disk) = &self.disk {
                        if let Err(e) = disk.store(&schema) {
                            tracing::warn!("Failed to cache schema for {model_id}: {e}");
                        }
                    }
                    self.remember(&schema);
                    return schema;
                }
                Err(e) => tracing::warn!("Schema discovery for {model_id} failed: {e}"),
            }
        }

        if let Some(schema) = fallback_schema(model_id) {
            tracing::debug!("Using built-in schema for {model_id}");
            self.remember(&schema);
            return schema;
        }

        tracing::warn!("No schema known for {model_id}, using prompt-only schema");
        ModelSchema::minimal(model_id)
    }

    /// Purge memory and disk caches.
    pub fn clear_cache(&self) -> std::io::Result<usize> {
        self.memory
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        match &self.disk {
            Some(disk) => disk.clear(),
            None => Ok(0),
        }
    }

    fn from_memory(&self, model_id: &str) -> Option<ModelSchema> {
        self.memory
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(model_id)
            .cloned()
    }

    fn remember(&self, schema: &ModelSchema) {
        self.memory
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(schema.model_id.clone(), schema.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        result: Option<ModelSchema>,
    }

    #[async_trait]
    impl SchemaSource for CountingSource {
        async fn discover(&self, model_id: &str) -> ProviderResult<ModelSchema> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .clone()
                .ok_or_else(|| ProviderError::SchemaUnavailable(model_id.to_string()))
        }
    }

    fn live_schema(model_id: &str) -> ModelSchema {
        ModelSchema::new(
            model_id,
            SchemaOrigin::Live,
            vec![
                ParameterDescriptor::new("prompt", ParamKind::String).required(),
                ParameterDescriptor::new("steps", ParamKind::Integer).range(1.0, 50.0),
            ],
        )
    }

    #[test]
    fn test_category_rule() {
        assert_eq!(Category::for_name("sync_mode"), Category::Hidden);
        assert_eq!(Category::for_name("image_size"), Category::Basic);
        assert_eq!(Category::for_name("guidance_scale"), Category::Advanced);
    }

    #[tokio::test]
    async fn test_unknown_model_resolves_to_minimal_schema() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            result: None,
        });
        let store = SchemaStore::new().with_source(source.clone());

        let schema = store.fetch_schema("acme/unknown-model").await;
        assert_eq!(schema.source, SchemaOrigin::Minimal);
        assert_eq!(schema.parameters.len(), 1);
        let prompt = schema.get("prompt").unwrap();
        assert!(prompt.required);
        assert_eq!(prompt.kind, ParamKind::String);
        assert!(schema.required.contains("prompt"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_live_result_is_memoized() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            result: Some(live_schema("acme/model")),
        });
        let store = SchemaStore::new().with_source(source.clone());

        let first = store.fetch_schema("acme/model").await;
        let second = store.fetch_schema("acme/model").await;
        assert_eq!(first.source, SchemaOrigin::Live);
        assert_eq!(second.source, SchemaOrigin::Memory);
        assert_eq!(first.parameters, second.parameters);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_discovery_falls_back_to_table() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            result: None,
        });
        let store = SchemaStore::new().with_source(source);
        let schema = store.fetch_schema("fal-ai/flux/dev").await;
        assert_eq!(schema.source, SchemaOrigin::Fallback);
        assert!(schema.get("num_inference_steps").is_some());
    }

    #[tokio::test]
    async fn test_disk_layer_is_written_and_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            result: Some(live_schema("acme/model")),
        });
        let store = SchemaStore::new()
            .with_disk_cache(DiskCache::new(dir.path().to_path_buf(), Duration::from_secs(3600)))
            .with_source(source.clone());
        store.fetch_schema("acme/model").await;

        // A second store sharing the directory is served from disk.
        let other = SchemaStore::new()
            .with_disk_cache(DiskCache::new(dir.path().to_path_buf(), Duration::from_secs(3600)))
            .with_source(source.clone());
        let schema = other.fetch_schema("acme/model").await;
        assert_eq!(schema.source, SchemaOrigin::Disk);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        assert_eq!(other.clear_cache().unwrap(), 1);
        let schema = other.fetch_schema("acme/model").await;
        assert_eq!(schema.source, SchemaOrigin::Live);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_defaults_fill_required_fields() {
        let schema = ModelSchema::new(
            "m",
            SchemaOrigin::Fallback,
            vec![
                ParameterDescriptor::new("prompt", ParamKind::String).required(),
                ParameterDescriptor::new("steps", ParamKind::Integer)
                    .range(1.0, 50.0)
                    .default_value(json!(28)),
                ParameterDescriptor::new("seed", ParamKind::Integer),
                ParameterDescriptor::new("format", ParamKind::Enum)
                    .required()
                    .values(["jpeg", "png"]),
            ],
        );
        let defaults = schema.defaults();
        assert_eq!(defaults.get("prompt"), Some(&json!("")));
        assert_eq!(defaults.get("steps"), Some(&json!(28)));
        assert_eq!(defaults.get("format"), Some(&json!("jpeg")));
        assert!(!defaults.contains_key("seed"));
    }
}

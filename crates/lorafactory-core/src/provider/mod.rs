//! Provider abstraction over heterogeneous generative backends.
//!
//! Every backend implements [`ImageProvider`]. Operations a backend does not
//! offer fall back to the trait's default bodies, which report
//! [`ProviderError::CapabilityUnsupported`].

pub(crate) mod chat;
pub(crate) mod extract;
pub(crate) mod factory;
pub(crate) mod http;
pub(crate) mod poll;
pub(crate) mod registry;
pub(crate) mod subscribe;
pub(crate) mod task;
pub(crate) mod template;

pub use chat::ChatProvider;
pub use factory::ProviderFactory;
pub use poll::{PollPolicy, RemoteTask, TaskStatus};
pub use registry::ProviderRegistry;
pub use subscribe::SubscribeProvider;
pub use task::TaskProvider;
pub use template::TemplateProvider;

use crate::error::{ProviderError, ProviderResult};
use crate::types::{Capability, ParamMap, PromptRecord};
use async_trait::async_trait;
use base64::Engine;
use std::sync::RwLock;

/// Base64-encoded binary asset ready to upload or embed.
#[derive(Debug, Clone)]
pub struct AssetData {
    /// Base64-encoded bytes
    pub data: String,
    /// MIME type (e.g., "image/jpeg", "image/png")
    pub media_type: String,
}

impl AssetData {
    /// Create an `AssetData` from raw bytes and a format string.
    ///
    /// The format is the file extension or format identifier (e.g., "jpeg", "png").
    pub fn from_bytes(bytes: &[u8], format: &str) -> Self {
        let media_type = match format.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "gif" => "image/gif",
            other => {
                tracing::warn!("Unknown image format '{other}', defaulting to image/jpeg");
                "image/jpeg"
            }
        };

        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            media_type: media_type.to_string(),
        }
    }

    /// Return a data URL usable as an embeddable locator.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

/// Request for a new image.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub model_id: String,
    /// Provider-shaped parameters produced by the translator
    pub params: ParamMap,
}

/// Request to edit an existing asset.
#[derive(Debug, Clone)]
pub struct EditRequest {
    /// Locator of the source asset
    pub source: String,
    pub prompt: String,
    pub model_id: String,
    pub params: ParamMap,
}

/// Request for a structured list of prompts from a text model.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model_id: String,
}

/// Request for a caption of an existing asset.
#[derive(Debug, Clone)]
pub struct CaptionRequest {
    pub locator: String,
    pub model_id: String,
}

impl CaptionRequest {
    /// Instruction sent alongside the image.
    pub fn instruction(&self) -> &'static str {
        "Write a single-sentence caption for this image suitable for training an \
         image model. Describe the subject, setting, lighting, and style. \
         Reply with the caption only."
    }
}

/// The capability contract every backend implements.
///
/// Uses `async_trait` because native async fn in trait is not object-safe
/// (the registry holds `Arc<dyn ImageProvider>`).
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Stable identifier (e.g., "fal", "kie").
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Operations this provider offers.
    fn capabilities(&self) -> &[Capability];

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Replace the credential. `None` or an empty secret clears it.
    fn set_credential(&self, secret: Option<&str>);

    /// Whether calls would currently pass the credential check.
    fn is_authenticated(&self) -> bool;

    async fn upload_asset(&self, _asset: &AssetData) -> ProviderResult<String> {
        Err(ProviderError::unsupported(
            self.id(),
            Capability::UploadAsset,
            None,
        ))
    }

    async fn generate_image(&self, request: &ImageRequest) -> ProviderResult<String> {
        Err(ProviderError::unsupported(
            self.id(),
            Capability::GenerateImage,
            Some(&request.model_id),
        ))
    }

    async fn edit_image(&self, request: &EditRequest) -> ProviderResult<String> {
        Err(ProviderError::unsupported(
            self.id(),
            Capability::EditImage,
            Some(&request.model_id),
        ))
    }

    async fn generate_prompts(&self, request: &PromptRequest) -> ProviderResult<Vec<PromptRecord>> {
        Err(ProviderError::unsupported(
            self.id(),
            Capability::GenerateTextPrompts,
            Some(&request.model_id),
        ))
    }

    async fn caption_image(&self, request: &CaptionRequest) -> ProviderResult<String> {
        Err(ProviderError::unsupported(
            self.id(),
            Capability::CaptionImage,
            Some(&request.model_id),
        ))
    }
}

/// Thread-safe holder for a provider secret.
#[derive(Debug, Default)]
pub struct Credential(RwLock<Option<String>>);

impl Credential {
    pub fn new(secret: Option<&str>) -> Self {
        let credential = Self::default();
        credential.set(secret);
        credential
    }

    /// Store a secret; blank values clear the credential.
    pub fn set(&self, secret: Option<&str>) {
        let cleaned = secret
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = cleaned;
    }

    pub fn is_set(&self) -> bool {
        self.0.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Current secret, or `Unauthenticated` for `provider`.
    pub fn require(&self, provider: &str) -> ProviderResult<String> {
        self.0
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| ProviderError::Unauthenticated {
                provider: provider.to_string(),
            })
    }
}

/// Resolve `${ENV_VAR}` references in config strings.
pub fn resolve_env_var(value: &str) -> Option<String> {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).ok().filter(|v| !v.is_empty())
    } else if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Whether `model_id` accepts a source image.
///
/// Edit endpoints conventionally carry "edit" in their id; `extra` lists
/// additional edit-capable models from configuration.
pub fn supports_edit(model_id: &str, extra: &[String]) -> bool {
    model_id.to_ascii_lowercase().contains("edit") || extra.iter().any(|m| m == model_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_from_bytes_jpeg() {
        let asset = AssetData::from_bytes(&[0xFF, 0xD8, 0xFF], "jpeg");
        assert_eq!(asset.media_type, "image/jpeg");
        assert!(!asset.data.is_empty());
    }

    #[test]
    fn test_asset_from_bytes_png_uppercase() {
        let asset = AssetData::from_bytes(&[0x89, 0x50, 0x4E, 0x47], "PNG");
        assert_eq!(asset.media_type, "image/png");
    }

    #[test]
    fn test_asset_data_url() {
        let asset = AssetData::from_bytes(&[1, 2, 3], "webp");
        assert_eq!(asset.data_url(), "data:image/webp;base64,AQID");
    }

    #[test]
    fn test_credential_blank_is_unauthenticated() {
        let credential = Credential::new(Some("   "));
        assert!(!credential.is_set());
        let err = credential.require("fal").unwrap_err();
        assert!(matches!(err, ProviderError::Unauthenticated { .. }));

        credential.set(Some("secret"));
        assert_eq!(credential.require("fal").unwrap(), "secret");

        credential.set(None);
        assert!(!credential.is_set());
    }

    #[test]
    fn test_resolve_env_var() {
        // Non-env-var strings pass through
        assert_eq!(resolve_env_var("plain-key"), Some("plain-key".to_string()));
        // Empty returns None
        assert_eq!(resolve_env_var(""), None);
        // Unset env var returns None
        assert_eq!(resolve_env_var("${DEFINITELY_NOT_SET_XYZ_123}"), None);
    }

    #[test]
    fn test_supports_edit() {
        assert!(supports_edit("fal-ai/nano-banana/edit", &[]));
        assert!(!supports_edit("fal-ai/flux/dev", &[]));
        assert!(supports_edit("fal-ai/flux/dev", &["fal-ai/flux/dev".to_string()]));
    }
}

//! Builds provider instances from configuration.

use super::{
    resolve_env_var, ChatProvider, ImageProvider, PollPolicy, ProviderRegistry, SubscribeProvider,
    TaskProvider, TemplateProvider,
};
use crate::config::Config;
use crate::error::{ProviderError, ProviderResult};
use std::sync::Arc;
use std::time::Duration;

/// Creates the built-in and configured providers.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create a single provider by id.
    ///
    /// Missing API keys are not an error here: the provider starts
    /// unauthenticated and fails its calls until a credential is set.
    pub fn create(id: &str, config: &Config) -> ProviderResult<Arc<dyn ImageProvider>> {
        let timeout = Duration::from_millis(config.limits.request_timeout_ms);
        let providers = &config.providers;

        let provider: Arc<dyn ImageProvider> = match id {
            "fal" => {
                let cfg = &providers.fal;
                Arc::new(
                    SubscribeProvider::new(
                        &cfg.endpoint,
                        resolve_env_var(&cfg.api_key).as_deref(),
                        timeout,
                    )
                    .with_edit_models(cfg.edit_models.clone()),
                )
            }
            "kie" => {
                let cfg = &providers.kie;
                Arc::new(
                    TaskProvider::new(
                        &cfg.endpoint,
                        resolve_env_var(&cfg.api_key).as_deref(),
                        PollPolicy::from_config(&config.polling),
                        timeout,
                    )
                    .with_edit_models(cfg.edit_models.clone()),
                )
            }
            "openrouter" => {
                let cfg = &providers.openrouter;
                Arc::new(ChatProvider::new(
                    &cfg.endpoint,
                    resolve_env_var(&cfg.api_key).as_deref(),
                    timeout,
                ))
            }
            other => {
                let cfg = providers
                    .custom
                    .iter()
                    .find(|c| c.id == other)
                    .ok_or_else(|| ProviderError::NotFound(format!("provider '{other}'")))?;
                Arc::new(TemplateProvider::new(cfg.clone(), timeout))
            }
        };

        if !provider.is_authenticated() {
            tracing::debug!("Provider '{id}' has no credential yet");
        }
        Ok(provider)
    }

    /// Build a registry holding every built-in and custom provider, with the
    /// configured default provider active.
    pub fn build_registry(config: &Config) -> ProviderResult<ProviderRegistry> {
        let default_id = config.default_provider();
        let mut registry = ProviderRegistry::new(Self::create(default_id, config)?);

        let builtin = ["fal", "kie", "openrouter"].into_iter();
        let custom = config.providers.custom.iter().map(|c| c.id.as_str());
        for id in builtin.chain(custom).filter(|id| *id != default_id) {
            registry.register(Self::create(id, config)?);
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointTemplate, TemplateOperations, TemplateProviderConfig};
    use crate::types::Capability;

    fn custom(id: &str) -> TemplateProviderConfig {
        TemplateProviderConfig {
            id: id.to_string(),
            name: String::new(),
            base_url: "https://api.acme.test".to_string(),
            api_key: String::new(),
            auth: Default::default(),
            headers: Default::default(),
            operations: TemplateOperations {
                caption_image: Some(EndpointTemplate {
                    method: "POST".to_string(),
                    path: "/caption".to_string(),
                    body: None,
                    merge_params: false,
                    response_path: "text".to_string(),
                }),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_build_registry_registers_builtins_and_custom() {
        let mut config = Config::default();
        config.providers.custom.push(custom("acme"));
        let registry = ProviderFactory::build_registry(&config).unwrap();

        let ids: Vec<_> = registry.get_all().iter().map(|p| p.id().to_string()).collect();
        assert_eq!(ids, ["fal", "kie", "openrouter", "acme"]);
        assert_eq!(registry.active().id(), "fal");

        let acme = registry.get("acme").unwrap();
        assert_eq!(acme.capabilities(), &[Capability::CaptionImage]);
    }

    #[test]
    fn test_configured_default_is_active() {
        let mut config = Config::default();
        config.providers.default = Some("kie".to_string());
        let registry = ProviderFactory::build_registry(&config).unwrap();
        assert_eq!(registry.active().id(), "kie");
        assert_eq!(registry.default_id(), "kie");
        assert_eq!(registry.get_all()[0].id(), "kie");
    }

    #[test]
    fn test_unknown_provider_is_not_found() {
        let config = Config::default();
        let err = ProviderFactory::create("midjourney", &config).err().unwrap();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[test]
    fn test_literal_key_authenticates() {
        let mut config = Config::default();
        config.providers.fal.api_key = "literal-key".to_string();
        let provider = ProviderFactory::create("fal", &config).unwrap();
        assert!(provider.is_authenticated());
    }
}

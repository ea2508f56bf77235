//! Registry of provider instances with exactly one active provider.

use super::ImageProvider;
use crate::error::{ProviderError, ProviderResult};
use std::sync::Arc;

/// Owns every provider of a session.
///
/// The registry is created around its default provider, so there is always
/// an active one. Providers are kept in registration order.
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn ImageProvider>>,
    default_id: String,
    active: Arc<dyn ImageProvider>,
}

impl ProviderRegistry {
    /// Create a registry whose default (and initially active) provider is `default`.
    pub fn new(default: Arc<dyn ImageProvider>) -> Self {
        Self {
            default_id: default.id().to_string(),
            providers: vec![default.clone()],
            active: default,
        }
    }

    /// Add a provider, replacing any registered under the same id.
    pub fn register(&mut self, provider: Arc<dyn ImageProvider>) {
        let id = provider.id().to_string();
        match self.providers.iter().position(|p| p.id() == id) {
            Some(index) => {
                tracing::debug!("Replacing provider '{id}'");
                self.providers[index] = provider.clone();
                if self.active.id() == id {
                    self.active = provider;
                }
            }
            None => {
                tracing::debug!("Registered provider '{id}'");
                self.providers.push(provider);
            }
        }
    }

    /// Remove a provider. Returns `false` for the default or an unknown id.
    ///
    /// Removing the active provider re-activates the default.
    pub fn unregister(&mut self, id: &str) -> bool {
        if id == self.default_id {
            tracing::warn!("Refusing to unregister default provider '{id}'");
            return false;
        }
        let Some(index) = self.providers.iter().position(|p| p.id() == id) else {
            return false;
        };
        self.providers.remove(index);

        if self.active.id() == id {
            if let Some(default) = self.get(&self.default_id) {
                self.active = default;
            }
        }
        true
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ImageProvider>> {
        self.providers.iter().find(|p| p.id() == id).cloned()
    }

    /// Every provider in registration order.
    pub fn get_all(&self) -> &[Arc<dyn ImageProvider>] {
        &self.providers
    }

    pub fn active(&self) -> Arc<dyn ImageProvider> {
        self.active.clone()
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    pub fn set_active(&mut self, id: &str) -> ProviderResult<()> {
        let provider = self
            .get(id)
            .ok_or_else(|| ProviderError::NotFound(format!("provider '{id}'")))?;
        tracing::debug!("Active provider: {id}");
        self.active = provider;
        Ok(())
    }

    /// Forward a credential change to one provider.
    pub fn set_credential(&self, id: &str, secret: Option<&str>) -> ProviderResult<()> {
        let provider = self
            .get(id)
            .ok_or_else(|| ProviderError::NotFound(format!("provider '{id}'")))?;
        provider.set_credential(secret);
        Ok(())
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.id()).collect::<Vec<_>>(),
            )
            .field("default_id", &self.default_id)
            .field("active", &self.active.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Credential;
    use crate::types::Capability;
    use async_trait::async_trait;

    struct StubProvider {
        id: String,
        credential: Credential,
    }

    impl StubProvider {
        fn arc(id: &str) -> Arc<dyn ImageProvider> {
            Arc::new(Self {
                id: id.to_string(),
                credential: Credential::default(),
            })
        }
    }

    #[async_trait]
    impl ImageProvider for StubProvider {
        fn id(&self) -> &str {
            &self.id
        }
        fn name(&self) -> &str {
            &self.id
        }
        fn capabilities(&self) -> &[Capability] {
            &[]
        }
        fn set_credential(&self, secret: Option<&str>) {
            self.credential.set(secret);
        }
        fn is_authenticated(&self) -> bool {
            self.credential.is_set()
        }
    }

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new(StubProvider::arc("fal"));
        registry.register(StubProvider::arc("kie"));
        registry.register(StubProvider::arc("openrouter"));
        registry
    }

    #[test]
    fn test_get_all_keeps_registration_order() {
        let registry = registry();
        let ids: Vec<_> = registry.get_all().iter().map(|p| p.id().to_string()).collect();
        assert_eq!(ids, ["fal", "kie", "openrouter"]);
        assert_eq!(registry.active().id(), "fal");
    }

    #[test]
    fn test_set_active_unknown_is_not_found() {
        let mut registry = registry();
        let err = registry.set_active("midjourney").unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
        assert_eq!(registry.active().id(), "fal");
    }

    #[test]
    fn test_default_cannot_be_unregistered() {
        let mut registry = registry();
        assert!(!registry.unregister("fal"));
        assert!(registry.get("fal").is_some());
    }

    #[test]
    fn test_unregister_active_reactivates_default() {
        let mut registry = registry();
        registry.set_active("kie").unwrap();
        assert!(registry.unregister("kie"));
        assert_eq!(registry.active().id(), "fal");
        assert!(registry.get("kie").is_none());
        assert!(!registry.unregister("kie"));
    }

    #[test]
    fn test_register_replaces_same_id() {
        let mut registry = registry();
        registry.set_active("kie").unwrap();
        let replacement = StubProvider::arc("kie");
        registry.register(replacement.clone());
        assert_eq!(registry.get_all().len(), 3);
        assert!(Arc::ptr_eq(&registry.active(), &replacement));
    }

    #[test]
    fn test_set_credential_forwards_to_provider() {
        let registry = registry();
        registry.set_credential("kie", Some("secret")).unwrap();
        assert!(registry.get("kie").unwrap().is_authenticated());
        assert!(!registry.get("fal").unwrap().is_authenticated());
        assert!(registry.set_credential("nope", Some("x")).is_err());
    }
}

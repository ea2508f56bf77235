//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

/// Upper bound on concurrently running work items.
pub const MAX_CONCURRENCY: usize = 10;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.concurrency == 0 || self.batch.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::ValidationError(format!(
                "batch.concurrency must be between 1 and {MAX_CONCURRENCY}"
            )));
        }
        if self.batch.max_count == 0 {
            return Err(ConfigError::ValidationError(
                "batch.max_count must be > 0".into(),
            ));
        }
        if self.batch.count == 0 || self.batch.count > self.batch.max_count {
            return Err(ConfigError::ValidationError(
                "batch.count must be between 1 and batch.max_count".into(),
            ));
        }
        if self.polling.interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "polling.interval_ms must be > 0".into(),
            ));
        }
        if self.polling.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "polling.max_attempts must be > 0".into(),
            ));
        }
        if self.limits.request_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.request_timeout_ms must be > 0".into(),
            ));
        }
        if self.schema.discovery && !self.schema.discovery_url.contains("{model}") {
            return Err(ConfigError::ValidationError(
                "schema.discovery_url must contain a {model} placeholder".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for custom in &self.providers.custom {
            if custom.id.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "providers.custom entries need a non-empty id".into(),
                ));
            }
            if matches!(custom.id.as_str(), "fal" | "kie" | "openrouter") || !seen.insert(&custom.id)
            {
                return Err(ConfigError::ValidationError(format!(
                    "providers.custom id '{}' is already in use",
                    custom.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplateProviderConfig;

    fn custom(id: &str) -> TemplateProviderConfig {
        TemplateProviderConfig {
            id: id.to_string(),
            name: String::new(),
            base_url: "https://example.test".to_string(),
            api_key: String::new(),
            auth: Default::default(),
            headers: Default::default(),
            operations: Default::default(),
        }
    }

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_concurrency() {
        let mut config = Config::default();
        config.batch.concurrency = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch.concurrency"));

        config.batch.concurrency = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_count_over_ceiling() {
        let mut config = Config::default();
        config.batch.count = config.batch.max_count + 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch.count"));
    }

    #[test]
    fn test_validate_rejects_zero_poll_attempts() {
        let mut config = Config::default();
        config.polling.max_attempts = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_validate_rejects_discovery_url_without_placeholder() {
        let mut config = Config::default();
        config.schema.discovery_url = "https://example.test/schema".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("{model}"));
    }

    #[test]
    fn test_validate_rejects_duplicate_custom_ids() {
        let mut config = Config::default();
        config.providers.custom = vec![custom("acme"), custom("acme")];
        assert!(config.validate().is_err());

        config.providers.custom = vec![custom("fal")];
        assert!(config.validate().is_err());
    }
}

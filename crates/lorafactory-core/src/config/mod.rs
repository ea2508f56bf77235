//! Configuration management for LoRAFactory.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. Every section implements `Default`, so a partial file is fine.

mod types;
mod validate;

pub use types::*;
pub use validate::MAX_CONCURRENCY;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Batch defaults
    pub batch: BatchConfig,

    /// Poll-style provider retry policy
    pub polling: PollingConfig,

    /// Schema discovery and caching
    pub schema: SchemaConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Provider settings
    pub providers: ProvidersConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.lorafactory.lorafactory/config.toml
    /// - Linux: ~/.config/lorafactory/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\lorafactory\config\config.toml
    ///
    /// Falls back to ~/.lorafactory/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "lorafactory", "lorafactory")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".lorafactory").join("config.toml")
            })
    }

    /// Get the resolved schema cache directory (with ~ expansion).
    pub fn cache_dir(&self) -> PathBuf {
        let path_str = self.general.cache_dir.to_string_lossy();
        let expanded = shellexpand::tilde(&path_str);
        PathBuf::from(expanded.into_owned()).join("schemas")
    }

    /// Id of the provider activated at startup.
    pub fn default_provider(&self) -> &str {
        self.providers
            .default
            .as_deref()
            .unwrap_or(self.batch.provider.as_str())
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

//! Command implementations.

pub mod config;
pub mod providers;
pub mod run;
pub mod schema;

use lorafactory_core::Config;
use serde_json::Value;
use std::path::Path;

/// Load the explicit config file, or the default one.
///
/// An explicit path must load. A broken default file only warns, so a bad
/// edit never locks the user out of `config init --force`.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = explicit {
        return Config::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display()));
    }
    match Config::load() {
        Ok(config) => Ok(config),
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `lorafactory config path`."
            );
            Ok(Config::default())
        }
    }
}

/// Parse a `key=value` flag. The value is read as JSON when it parses,
/// otherwise kept as a string.
pub fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing parameter name in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

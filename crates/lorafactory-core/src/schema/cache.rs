//! Disk cache for discovered schemas, one JSON file per model.

use super::ModelSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    /// Unix seconds when the schema was written
    fetched_at: u64,
    schema: ModelSchema,
}

/// Persistent schema cache with a time-to-live.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
    ttl: Duration,
}

impl DiskCache {
    pub fn new(dir: PathBuf, ttl: Duration) -> Self {
        Self { dir, ttl }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cached schema for `model_id`, if present and not expired.
    ///
    /// Unreadable or corrupt entries count as misses.
    pub fn load(&self, model_id: &str) -> Option<ModelSchema> {
        let path = self.path_for(model_id);
        let content = std::fs::read_to_string(&path).ok()?;
        let entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Ignoring corrupt schema cache {:?}: {e}", path);
                return None;
            }
        };

        // Distinct ids can share a file name.
        if entry.schema.model_id != model_id {
            tracing::debug!(
                "Schema cache {:?} holds {}, not {model_id}",
                path,
                entry.schema.model_id
            );
            return None;
        }

        let age = now_secs().saturating_sub(entry.fetched_at);
        if age > self.ttl.as_secs() {
            tracing::debug!("Schema cache for {model_id} expired ({age}s old)");
            return None;
        }
        Some(entry.schema)
    }

    pub fn store(&self, schema: &ModelSchema) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let entry = CacheEntry {
            fetched_at: now_secs(),
            schema: schema.clone(),
        };
        let json = serde_json::to_string_pretty(&entry)?;
        std::fs::write(self.path_for(&schema.model_id), json)
    }

    /// Delete every cached schema. Returns the number of files removed.
    pub fn clear(&self) -> std::io::Result<usize> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn path_for(&self, model_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(model_id)))
    }
}

/// Model ids contain slashes; flatten them into a single file name.
fn file_stem(model_id: &str) -> String {
    model_id
        .replace('/', "__")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem_flattens_model_ids() {
        assert_eq!(file_stem("fal-ai/flux/dev"), "fal-ai__flux__dev");
        assert_eq!(file_stem("a b:c"), "a_b_c");
    }

    #[test]
    fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("schemas"), Duration::from_secs(60));
        let schema = ModelSchema::minimal("fal-ai/flux/dev");

        cache.store(&schema).unwrap();
        assert!(dir.path().join("schemas/fal-ai__flux__dev.json").exists());
        assert_eq!(cache.load("fal-ai/flux/dev"), Some(schema));
        assert_eq!(cache.load("fal-ai/other"), None);
    }

    #[test]
    fn test_colliding_file_name_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().to_path_buf(), Duration::from_secs(60));
        assert_eq!(file_stem("acme/flux"), file_stem("acme__flux"));

        let schema = ModelSchema::minimal("acme/flux");
        cache.store(&schema).unwrap();
        assert_eq!(cache.load("acme__flux"), None);
        assert_eq!(cache.load("acme/flux"), Some(schema));
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().to_path_buf(), Duration::from_secs(60));
        let entry = CacheEntry {
            fetched_at: now_secs() - 3600,
            schema: ModelSchema::minimal("m"),
        };
        std::fs::write(
            dir.path().join("m.json"),
            serde_json::to_string(&entry).unwrap(),
        )
        .unwrap();
        assert_eq!(cache.load("m"), None);
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().to_path_buf(), Duration::from_secs(60));
        std::fs::write(dir.path().join("m.json"), "{not json").unwrap();
        assert_eq!(cache.load("m"), None);
    }

    #[test]
    fn test_clear_missing_dir_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("never-created"), Duration::from_secs(60));
        assert_eq!(cache.clear().unwrap(), 0);
    }
}

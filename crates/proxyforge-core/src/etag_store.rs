//! Persisted `source URL → {validator, last-modified, body digest}`
//! mapping. Backed by a small JSON file so it survives process
//! restarts without pulling in a second SQLite handle.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EtagRecord {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub body_digest: Option<String>,
}

/// Loads/saves the validator map used to drive `304` skipping across runs.
#[derive(Debug, Default)]
pub struct EtagStore {
    path: Option<PathBuf>,
    records: HashMap<String, EtagRecord>,
}

impl EtagStore {
    /// Load from `path` if it exists; a missing or unreadable file starts
    /// an empty store rather than failing the run.
    pub fn load(path: &Path) -> Self {
        let records = std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        Self {
            path: Some(path.to_path_buf()),
            records,
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<&EtagRecord> {
        self.records.get(url)
    }

    pub fn update(&mut self, url: &str, record: EtagRecord) {
        self.records.insert(url.to_string(), record);
    }

    /// Best-effort persist; I/O errors here degrade gracefully.
    pub fn save(&self) {
        let Some(path) = &self.path else { return };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(&self.records) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    tracing::warn!(error = %e, "failed to persist etag store");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialise etag store"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etags.json");

        let mut store = EtagStore::load(&path);
        store.update(
            "https://example.com/a",
            EtagRecord {
                etag: Some("\"abc\"".into()),
                last_modified: None,
                body_digest: Some("deadbeef".into()),
            },
        );
        store.save();

        let reloaded = EtagStore::load(&path);
        assert_eq!(reloaded.get("https://example.com/a").unwrap().etag.as_deref(), Some("\"abc\""));
    }

    #[test]
    fn missing_file_starts_empty() {
        let store = EtagStore::load(Path::new("/nonexistent/path/etags.json"));
        assert!(store.get("https://example.com").is_none());
    }
}

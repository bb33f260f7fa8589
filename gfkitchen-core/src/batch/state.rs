//! Persisted per-recipe progress, so a restarted run picks up where it stopped.
//!
//! The state file is rewritten atomically after every item transition.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generate::ErrorKind;
use crate::persist::write_json_atomic;
use crate::types::{CompletionSet, GeneratedImage};

/// Current state file schema version.
pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to read state file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse state file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported state file version {found} (expected {STATE_VERSION})")]
    Version { found: u32 },

    #[error("Failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Done,
    Failed,
}

/// Progress record for one recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemState {
    pub status: ItemStatus,
    /// Generation calls made for this item, across all runs.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub updated_at: DateTime<Utc>,
}

impl ItemState {
    fn pending() -> Self {
        Self {
            status: ItemStatus::Pending,
            attempts: 0,
            url: None,
            local_path: None,
            last_error: None,
            error_kind: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    updated_at: DateTime<Utc>,
    items: BTreeMap<String, ItemState>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            items: BTreeMap::new(),
        }
    }
}

/// Number of items per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub done: usize,
    pub failed: usize,
}

/// File-backed map of slug to item state.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    file: StateFile,
}

impl StateStore {
    /// Load the state file, or start empty if it does not exist yet.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        let file = if path.exists() {
            let content = fs::read_to_string(path).map_err(|source| StateError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let file: StateFile =
                serde_json::from_str(&content).map_err(|source| StateError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            if file.version != STATE_VERSION {
                return Err(StateError::Version {
                    found: file.version,
                });
            }
            file
        } else {
            StateFile::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, slug: &str) -> Option<&ItemState> {
        self.file.items.get(slug)
    }

    /// All tracked items, sorted by slug.
    pub fn items(&self) -> impl Iterator<Item = (&str, &ItemState)> {
        self.file.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Slugs with the given status.
    pub fn slugs_with_status(&self, status: ItemStatus) -> impl Iterator<Item = &str> {
        self.file
            .items
            .iter()
            .filter(move |(_, item)| item.status == status)
            .map(|(slug, _)| slug.as_str())
    }

    /// Slugs a new run should skip: every `done` item, plus `failed` ones if asked.
    pub fn completion_set(&self, include_failed: bool) -> CompletionSet {
        self.file
            .items
            .iter()
            .filter(|(_, item)| {
                item.status == ItemStatus::Done
                    || (include_failed && item.status == ItemStatus::Failed)
            })
            .map(|(slug, _)| slug.as_str())
            .collect()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for item in self.file.items.values() {
            match item.status {
                ItemStatus::Pending => counts.pending += 1,
                ItemStatus::Done => counts.done += 1,
                ItemStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Add a pending entry for every slug not tracked yet, then persist.
    pub fn register_pending<'s>(
        &mut self,
        slugs: impl IntoIterator<Item = &'s str>,
    ) -> Result<(), StateError> {
        let mut added = 0;
        for slug in slugs {
            if !self.file.items.contains_key(slug) {
                self.file.items.insert(slug.to_string(), ItemState::pending());
                added += 1;
            }
        }

        if added > 0 || !self.path.exists() {
            tracing::debug!(added, path = %self.path.display(), "registered pending items");
            self.save()?;
        }
        Ok(())
    }

    /// Record a successful generation after `calls` generation calls and persist.
    pub fn mark_done(
        &mut self,
        slug: &str,
        image: &GeneratedImage,
        calls: u32,
    ) -> Result<(), StateError> {
        let item = self.entry(slug);
        item.status = ItemStatus::Done;
        item.attempts += calls;
        item.url = Some(image.url.clone());
        item.local_path = image.local_path.clone();
        item.last_error = None;
        item.error_kind = None;
        item.updated_at = Utc::now();
        self.save()
    }

    /// Record a failure after `calls` generation calls and persist.
    pub fn mark_failed(
        &mut self,
        slug: &str,
        error: &str,
        kind: ErrorKind,
        url: Option<&str>,
        calls: u32,
    ) -> Result<(), StateError> {
        let item = self.entry(slug);
        item.status = ItemStatus::Failed;
        item.attempts += calls;
        item.last_error = Some(error.to_string());
        item.error_kind = Some(kind);
        if let Some(url) = url {
            item.url = Some(url.to_string());
        }
        item.updated_at = Utc::now();
        self.save()
    }

    fn entry(&mut self, slug: &str) -> &mut ItemState {
        self.file
            .items
            .entry(slug.to_string())
            .or_insert_with(ItemState::pending)
    }

    /// Write the state file atomically.
    pub fn save(&mut self) -> Result<(), StateError> {
        self.file.updated_at = Utc::now();
        write_json_atomic(&self.path, &self.file).map_err(|source| StateError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn image(url: &str) -> GeneratedImage {
        GeneratedImage {
            url: url.to_string(),
            local_path: None,
            content_type: None,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::load(&dir.path().join("state.json")).unwrap();
        assert_eq!(store.counts(), StatusCounts::default());
    }

    #[test]
    fn transitions_are_persisted_and_reloaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let mut store = StateStore::load(&path).unwrap();
        store.register_pending(["a", "b", "c"]).unwrap();
        store.mark_done("a", &image("https://img/a.png"), 1).unwrap();
        store
            .mark_failed("b", "API returned error: 400 - nope", ErrorKind::Permanent, None, 1)
            .unwrap();

        let reloaded = StateStore::load(&path).unwrap();
        assert_eq!(
            reloaded.counts(),
            StatusCounts {
                pending: 1,
                done: 1,
                failed: 1
            }
        );
        let a = reloaded.get("a").unwrap();
        assert_eq!(a.url.as_deref(), Some("https://img/a.png"));
        assert_eq!(a.attempts, 1);
        assert_eq!(reloaded.get("b").unwrap().error_kind, Some(ErrorKind::Permanent));
        assert_eq!(
            reloaded.slugs_with_status(ItemStatus::Done).collect::<Vec<_>>(),
            vec!["a"]
        );
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[test]
    fn register_pending_keeps_existing_status() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let mut store = StateStore::load(&path).unwrap();
        store.mark_done("a", &image("https://img/a.png"), 1).unwrap();
        store.register_pending(["a", "b"]).unwrap();

        assert_eq!(store.get("a").unwrap().status, ItemStatus::Done);
        assert_eq!(store.get("b").unwrap().status, ItemStatus::Pending);
    }

    #[test]
    fn completion_set_from_done_and_optionally_failed() {
        let dir = TempDir::new().unwrap();
        let mut store = StateStore::load(&dir.path().join("state.json")).unwrap();
        store.register_pending(["a", "b", "c"]).unwrap();
        store.mark_done("a", &image("https://img/a.png"), 1).unwrap();
        store.mark_failed("b", "boom", ErrorKind::Transient, None, 1).unwrap();

        let retry_failed = store.completion_set(false);
        assert!(retry_failed.contains("a"));
        assert!(!retry_failed.contains("b"));
        assert_eq!(retry_failed.len(), 1);

        let skip_failed = store.completion_set(true);
        assert!(skip_failed.contains("b"));
        assert!(!skip_failed.contains("c"));
    }

    #[test]
    fn failure_after_done_clears_nothing_but_status() {
        let dir = TempDir::new().unwrap();
        let mut store = StateStore::load(&dir.path().join("state.json")).unwrap();
        store.mark_failed("a", "timeout", ErrorKind::Transient, Some("https://img/a.png"), 1).unwrap();
        store.mark_done("a", &image("https://img/a2.png"), 1).unwrap();

        let a = store.get("a").unwrap();
        assert_eq!(a.status, ItemStatus::Done);
        assert_eq!(a.attempts, 2);
        assert!(a.last_error.is_none());
        assert_eq!(a.url.as_deref(), Some("https://img/a2.png"));
    }

    #[test]
    fn rejects_unknown_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(
            &path,
            r#"{"version": 99, "updated_at": "2026-01-01T00:00:00Z", "items": {}}"#,
        )
        .unwrap();

        assert!(matches!(
            StateStore::load(&path),
            Err(StateError::Version { found: 99 })
        ));
    }
}

//! Timestamped JSON snapshots of batch progress.
//!
//! Each checkpoint is a new file `{label}-{unix_millis}.json`; existing files are
//! never overwritten. The map keys are sorted, so two snapshots of the same
//! results differ only in their timestamp.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::persist::write_json_atomic;
use crate::types::GeneratedImage;

use super::BatchCounts;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid checkpoint label {0:?}: only lowercase letters, digits and '-' are allowed")]
    InvalidLabel(String),

    #[error("Failed to parse checkpoint {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Summary block stored under the `metadata` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointMetadata {
    pub total_generated: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub succeeded: usize,
    #[serde(default)]
    pub skipped: usize,
    #[serde(default)]
    pub failed: usize,
}

/// On-disk checkpoint: slug → URL entries next to a `metadata` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(flatten)]
    pub images: BTreeMap<String, String>,
    pub metadata: CheckpointMetadata,
}

/// A checkpoint file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointFile {
    pub path: PathBuf,
    pub millis: i64,
    pub seq: u32,
}

/// True when a checkpoint is due after `succeeded` successes.
pub fn should_checkpoint(succeeded: usize, every: usize) -> bool {
    every > 0 && succeeded > 0 && succeeded % every == 0
}

/// Writes checkpoint files into one directory.
#[derive(Debug)]
pub struct CheckpointWriter {
    dir: PathBuf,
    label: String,
}

impl CheckpointWriter {
    /// The label becomes the file name prefix, so it is limited to `[a-z0-9-]`.
    pub fn new(
        dir: impl Into<PathBuf>,
        label: impl Into<String>,
    ) -> Result<Self, CheckpointError> {
        let label = label.into();
        let valid = !label.is_empty()
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid {
            return Err(CheckpointError::InvalidLabel(label));
        }

        Ok(Self {
            dir: dir.into(),
            label,
        })
    }

    /// Serialize the current results and counters to a new checkpoint file.
    pub fn write(
        &mut self,
        results: &BTreeMap<String, GeneratedImage>,
        counts: BatchCounts,
    ) -> Result<PathBuf, CheckpointError> {
        let now = Utc::now();
        let checkpoint = Checkpoint {
            images: results
                .iter()
                .map(|(slug, image)| (slug.clone(), image.url.clone()))
                .collect(),
            metadata: CheckpointMetadata {
                total_generated: results.len(),
                timestamp: now,
                label: self.label.clone(),
                succeeded: counts.succeeded,
                skipped: counts.skipped,
                failed: counts.failed,
            },
        };

        fs::create_dir_all(&self.dir).map_err(|source| CheckpointError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.unused_path(now.timestamp_millis());
        write_json_atomic(&path, &checkpoint).map_err(|source| CheckpointError::Io {
            path: path.clone(),
            source,
        })?;

        tracing::info!(
            path = %path.display(),
            total_generated = checkpoint.metadata.total_generated,
            "checkpoint written"
        );
        Ok(path)
    }

    fn unused_path(&self, millis: i64) -> PathBuf {
        let base = self.dir.join(format!("{}-{}.json", self.label, millis));
        if !base.exists() {
            return base;
        }
        (1u32..)
            .map(|n| self.dir.join(format!("{}-{}-{}.json", self.label, millis, n)))
            .find(|p| !p.exists())
            .unwrap_or(base)
    }
}

/// Parse `{label}-{millis}[-{seq}].json` into (millis, seq).
fn parse_checkpoint_name(path: &Path) -> Option<(i64, u32)> {
    if path.extension()? != "json" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let parts: Vec<&str> = stem.split('-').collect();

    // Millisecond timestamps have at least 13 digits; the label may contain short numbers.
    fn is_millis(s: &str) -> bool {
        s.len() >= 13 && s.chars().all(|c| c.is_ascii_digit())
    }

    match parts.as_slice() {
        [.., millis, seq] if is_millis(millis) => Some((millis.parse().ok()?, seq.parse().ok()?)),
        [.., millis] if is_millis(millis) => Some((millis.parse().ok()?, 0)),
        _ => None,
    }
}

/// All checkpoint files in `dir`, oldest first.
pub fn list_checkpoints(dir: &Path) -> Result<Vec<CheckpointFile>, CheckpointError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir).map_err(|source| CheckpointError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<CheckpointFile> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter_map(|path| {
            parse_checkpoint_name(&path).map(|(millis, seq)| CheckpointFile { path, millis, seq })
        })
        .collect();

    files.sort_by(|a, b| (a.millis, a.seq, &a.path).cmp(&(b.millis, b.seq, &b.path)));
    Ok(files)
}

/// Read one checkpoint file.
pub fn load_checkpoint(path: &Path) -> Result<Checkpoint, CheckpointError> {
    let content = fs::read_to_string(path).map_err(|source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| CheckpointError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a listed checkpoint, logging and skipping files that cannot be read.
fn load_or_skip(file: &CheckpointFile) -> Option<Checkpoint> {
    match load_checkpoint(&file.path) {
        Ok(checkpoint) => Some(checkpoint),
        Err(e) => {
            tracing::warn!(path = %file.path.display(), error = %e, "skipping unreadable checkpoint");
            None
        }
    }
}

/// The newest readable checkpoint in `dir`, if any.
pub fn latest_checkpoint(dir: &Path) -> Result<Option<(PathBuf, Checkpoint)>, CheckpointError> {
    Ok(list_checkpoints(dir)?
        .into_iter()
        .rev()
        .find_map(|file| load_or_skip(&file).map(|checkpoint| (file.path, checkpoint))))
}

/// Union of every readable checkpoint's slug → URL map. Newer files win on conflicts.
pub fn merge_checkpoints(dir: &Path) -> Result<BTreeMap<String, String>, CheckpointError> {
    let mut merged = BTreeMap::new();
    for file in list_checkpoints(dir)? {
        if let Some(checkpoint) = load_or_skip(&file) {
            merged.extend(checkpoint.images);
        }
    }
    Ok(merged)
}

/// Delete all but the newest `keep` checkpoints. Returns the deleted paths.
pub fn prune_checkpoints(dir: &Path, keep: usize) -> Result<Vec<PathBuf>, CheckpointError> {
    let files = list_checkpoints(dir)?;
    let excess = files.len().saturating_sub(keep);

    let mut removed = Vec::with_capacity(excess);
    for file in files.into_iter().take(excess) {
        fs::remove_file(&file.path).map_err(|source| CheckpointError::Io {
            path: file.path.clone(),
            source,
        })?;
        removed.push(file.path);
    }
    Ok(removed)
}

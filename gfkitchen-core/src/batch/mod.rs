//! Sequential, rate-limited image generation over a recipe catalog.
//!
//! This module provides:
//! - `BatchRunner` walking descriptors in order with delays, pauses and backoff
//! - `StateStore` persisting per-recipe progress between runs
//! - `CheckpointWriter` writing timestamped slug → URL snapshots
//!
//! # Configuration
//!
//! - `GFK_DATA_DIR` (optional): root for `state.json`, `checkpoints/` and `images/`.
//!   Defaults to `~/.gfkitchen/image-generation`.

mod checkpoint;
mod runner;
mod state;

pub use checkpoint::{
    latest_checkpoint, list_checkpoints, load_checkpoint, merge_checkpoints, prune_checkpoints,
    should_checkpoint, Checkpoint, CheckpointError, CheckpointFile, CheckpointMetadata,
    CheckpointWriter,
};
pub use runner::{BatchRunner, ItemError};
pub use state::{ItemState, ItemStatus, StateError, StateStore, StatusCounts, STATE_VERSION};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::error::CatalogError;
use crate::generate::ErrorKind;
use crate::types::GeneratedImage;

// ============================================================================
// Configuration
// ============================================================================

/// Pacing and checkpoint settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Sleep after every generation attempt, success or failure.
    pub delay: Duration,
    /// Take a longer pause after this many successes. 0 disables.
    pub pause_every: usize,
    pub pause: Duration,
    /// Sleep after a rate-limited response. A larger `Retry-After` wins.
    pub rate_limit_backoff: Duration,
    /// How many times a rate-limited item is retried within the same run.
    pub rate_limit_retries: u32,
    /// Write a checkpoint after this many successes. 0 leaves only the final one.
    pub checkpoint_every: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(2500),
            pause_every: 10,
            pause: Duration::from_secs(15),
            rate_limit_backoff: Duration::from_secs(60),
            rate_limit_retries: 0,
            checkpoint_every: 5,
        }
    }
}

/// On-disk layout under the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPaths {
    pub root: PathBuf,
}

impl BatchPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Use `GFK_DATA_DIR`, else `~/.gfkitchen/image-generation`, else a relative `data/` dir.
    pub fn from_env() -> Self {
        if let Ok(dir) = std::env::var("GFK_DATA_DIR") {
            if !dir.trim().is_empty() {
                return Self::new(dir);
            }
        }

        match dirs::home_dir() {
            Some(home) => Self::new(home.join(".gfkitchen").join("image-generation")),
            None => Self::new(PathBuf::from("data").join("image-generation")),
        }
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join("state.json")
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.root.join("checkpoints")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }
}

// ============================================================================
// Results
// ============================================================================

/// Running counters, also stored in checkpoint metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounts {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    pub slug: String,
    pub error: String,
    pub kind: ErrorKind,
}

/// Outcome of one run.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub rate_limit_backoffs: usize,
    pub results: BTreeMap<String, GeneratedImage>,
    pub failures: Vec<FailedItem>,
    pub checkpoints: Vec<PathBuf>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn counts(&self) -> BatchCounts {
        BatchCounts {
            succeeded: self.succeeded,
            skipped: self.skipped,
            failed: self.failed,
        }
    }
}

/// Progress notifications for whoever drives the runner.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent<'a> {
    Skipped {
        position: usize,
        total: usize,
        slug: &'a str,
    },
    Succeeded {
        position: usize,
        total: usize,
        slug: &'a str,
        image: &'a GeneratedImage,
    },
    Failed {
        position: usize,
        total: usize,
        slug: &'a str,
        error: &'a str,
        kind: ErrorKind,
    },
    Backoff {
        slug: &'a str,
        wait: Duration,
        retrying: bool,
    },
    Pause {
        succeeded: usize,
        wait: Duration,
    },
    Checkpoint {
        path: &'a std::path::Path,
        total_generated: usize,
    },
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that abort a run. Per-item failures are recorded, not returned.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Invalid recipe catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Final checkpoint failed: {0}")]
    Checkpoint(#[from] CheckpointError),
}

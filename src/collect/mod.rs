//! Result collection
//!
//! Copies the probe's results directory from scratch back to the
//! submission directory. Collection is best-effort: it never fails the job.

use crate::fs::FileCopier;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default name of the results directory inside scratch
pub const DEFAULT_RESULTS_DIR: &str = "results";

/// What happened during collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CollectOutcome {
    /// Results copied to `destination`
    Collected {
        /// Results directory in the submission directory
        destination: PathBuf,
        /// Files copied
        files: u64,
        /// Bytes copied
        bytes: u64,
    },
    /// The probe produced no results directory
    Absent,
    /// Copy failed part-way; the message is the underlying error
    Failed {
        /// Underlying error
        message: String,
    },
}

impl CollectOutcome {
    /// Check whether anything was copied
    pub fn is_collected(&self) -> bool {
        matches!(self, CollectOutcome::Collected { .. })
    }
}

/// Copies `<scratch>/<name>` to `<submit_dir>/<name>`
#[derive(Debug, Clone)]
pub struct ResultCollector {
    results_dir: String,
}

impl ResultCollector {
    /// Collect a results directory with the given name
    pub fn new(results_dir: impl Into<String>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    /// Name of the directory being collected
    pub fn results_dir(&self) -> &str {
        &self.results_dir
    }

    /// Copy results back if the probe created them
    pub fn collect(&self, scratch: &Path, submit_dir: &Path) -> CollectOutcome {
        let source = scratch.join(&self.results_dir);
        if !source.is_dir() {
            tracing::info!("No {} directory in scratch; nothing to collect", self.results_dir);
            return CollectOutcome::Absent;
        }

        let destination = submit_dir.join(&self.results_dir);
        match FileCopier::default_copier().copy_tree(&source, &destination) {
            Ok(stats) => {
                tracing::info!(
                    "Collected {} file(s), {} into {}",
                    stats.files_copied,
                    humansize::format_size(stats.bytes_copied, humansize::BINARY),
                    destination.display()
                );
                CollectOutcome::Collected {
                    destination,
                    files: stats.files_copied,
                    bytes: stats.bytes_copied,
                }
            }
            Err(e) => {
                tracing::warn!("Result collection failed: {}", e);
                CollectOutcome::Failed { message: e.to_string() }
            }
        }
    }
}

impl Default for ResultCollector {
    fn default() -> Self {
        Self::new(DEFAULT_RESULTS_DIR)
    }
}

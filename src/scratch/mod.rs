//! Per-job scratch directory management
//!
//! Each job instance gets `<tmp_root>/<job_id>` on node-local storage.
//! Inputs are staged into it before the probe runs and the whole tree is
//! removed once results have been collected.

use crate::error::{IoResultExt, Result, SlurmProbeError};
use crate::fs::{remove_path, CopyStats, FileCopier};
use crate::system::JobId;
use std::path::{Path, PathBuf};

/// Handle to a job's scratch directory
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    job_id: JobId,
}

impl ScratchDir {
    /// Compute the scratch path for a job without touching the filesystem
    pub fn path_for(tmp_root: &Path, job_id: &JobId) -> PathBuf {
        tmp_root.join(job_id.as_str())
    }

    /// Create the scratch directory if absent
    pub fn create(tmp_root: &Path, job_id: &JobId) -> Result<Self> {
        let path = Self::path_for(tmp_root, job_id);
        std::fs::create_dir_all(&path).with_path(&path)?;
        tracing::info!("Scratch directory ready at {}", path.display());

        Ok(Self {
            path,
            job_id: job_id.clone(),
        })
    }

    /// Scratch directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Job owning this directory
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Copy every input into the scratch directory under its file name.
    ///
    /// Directories are copied recursively. The first failure aborts staging.
    pub fn stage<P: AsRef<Path>>(&self, inputs: &[P]) -> Result<CopyStats> {
        let copier = FileCopier::default_copier();
        let mut stats = CopyStats::default();

        for input in inputs {
            let input = input.as_ref();
            if !input.exists() {
                return Err(SlurmProbeError::NotFound(input.to_path_buf()));
            }
            let name = input
                .file_name()
                .ok_or_else(|| SlurmProbeError::config(format!("input has no file name: {}", input.display())))?;

            let target = self.path.join(name);
            let staged = copier.copy_tree(input, &target)?;
            tracing::debug!(
                "Staged {} ({})",
                input.display(),
                humansize::format_size(staged.bytes_copied, humansize::BINARY)
            );
            stats.merge(&staged);
        }

        tracing::info!(
            "Staged {} file(s), {} into scratch",
            stats.files_copied,
            humansize::format_size(stats.bytes_copied, humansize::BINARY)
        );
        Ok(stats)
    }

    /// Remove the scratch directory and everything in it
    pub fn remove(self) -> Result<()> {
        if self.path.exists() {
            remove_path(&self.path)?;
        }
        tracing::info!("Removed scratch directory {}", self.path.display());
        Ok(())
    }

    /// Give up ownership without removing the directory
    pub fn keep(self) -> PathBuf {
        tracing::info!("Keeping scratch directory {}", self.path.display());
        self.path
    }
}

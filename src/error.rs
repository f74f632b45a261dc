//! Error types for slurmprobe
//!
//! This module defines all error types used throughout the application,
//! providing detailed error information for debugging and job logs.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for slurmprobe operations
#[derive(Error, Debug)]
pub enum SlurmProbeError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// File or directory not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// Job identifier is empty or would escape the scratch root
    #[error("Invalid job identifier '{0}'")]
    InvalidJobId(String),

    /// Required setting missing or malformed
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Container image was not staged into the scratch directory
    #[error("Container image not found in scratch directory: {0}")]
    ImageMissing(PathBuf),

    /// A subprocess could not be started
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Container image build failed
    #[error("Image build failed: {0}")]
    ImageBuild(String),

    /// sbatch rejected the job script
    #[error("Job submission failed: {0}")]
    Submission(String),

    /// Report serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SlurmProbeError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a spawn error for the given program
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Check if this error is a permission issue
    pub fn is_permission_error(&self) -> bool {
        match self {
            Self::Io { source, .. } | Self::Spawn { source, .. } => {
                source.kind() == std::io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } | Self::NotFound(path) | Self::ImageMissing(path) => Some(path),
            _ => None,
        }
    }
}

/// Result type alias for slurmprobe operations
pub type Result<T> = std::result::Result<T, SlurmProbeError>;

impl From<std::io::Error> for SlurmProbeError {
    fn from(err: std::io::Error) -> Self {
        SlurmProbeError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for SlurmProbeError {
    fn from(err: serde_json::Error) -> Self {
        SlurmProbeError::Serialization(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| SlurmProbeError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = SlurmProbeError::io("/scratch/42", io_err);
        assert_eq!(err.path(), Some(&PathBuf::from("/scratch/42")));
        assert!(err.to_string().contains("/scratch/42"));
    }

    #[test]
    fn test_permission_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(SlurmProbeError::io("/tmp", io_err).is_permission_error());
        assert!(!SlurmProbeError::InvalidJobId("..".into()).is_permission_error());
    }

    #[test]
    fn test_with_path_extension() {
        let res: std::io::Result<()> = Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        let err = res.with_path("/data/in.txt").unwrap_err();
        assert_eq!(err.path(), Some(&PathBuf::from("/data/in.txt")));
    }
}

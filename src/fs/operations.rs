//! File operations
//!
//! Attribute-preserving single file copy and recursive tree copy used
//! for staging job inputs and collecting results.

use crate::error::{IoResultExt, Result, SlurmProbeError};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

/// Copy operation statistics
#[derive(Debug, Clone, Default)]
pub struct CopyStats {
    /// Regular files copied
    pub files_copied: u64,
    /// Directories created
    pub dirs_created: u64,
    /// Bytes copied
    pub bytes_copied: u64,
    /// Duration of the copy
    pub duration: Duration,
}

impl CopyStats {
    /// Fold another set of statistics into this one
    pub fn merge(&mut self, other: &CopyStats) {
        self.files_copied += other.files_copied;
        self.dirs_created += other.dirs_created;
        self.bytes_copied += other.bytes_copied;
        self.duration += other.duration;
    }

    /// Throughput in bytes/second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.bytes_copied as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Options for file copy operations
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Buffer size for reads/writes
    pub buffer_size: usize,
    /// Preserve file permissions
    pub preserve_permissions: bool,
    /// Preserve modification and access time
    pub preserve_mtime: bool,
    /// Follow symlinks instead of recreating them
    pub follow_symlinks: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            buffer_size: 1024 * 1024, // 1MB
            preserve_permissions: true,
            preserve_mtime: true,
            follow_symlinks: false,
        }
    }
}

/// Attribute-preserving file copier
pub struct FileCopier {
    options: CopyOptions,
}

impl FileCopier {
    /// Create a new file copier with the given options
    pub fn new(options: CopyOptions) -> Self {
        Self { options }
    }

    /// Create with default options
    pub fn default_copier() -> Self {
        Self::new(CopyOptions::default())
    }

    /// Copy a single file from source to destination, creating parents
    pub fn copy(&self, source: &Path, dest: &Path) -> Result<CopyStats> {
        let start = Instant::now();

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).with_path(parent)?;
        }

        let bytes_copied = self.copy_buffered(source, dest)?;

        if self.options.preserve_permissions {
            self.copy_permissions(source, dest)?;
        }
        if self.options.preserve_mtime {
            self.copy_mtime(source, dest)?;
        }

        Ok(CopyStats {
            files_copied: 1,
            dirs_created: 0,
            bytes_copied,
            duration: start.elapsed(),
        })
    }

    /// Recursively copy `source` into `dest`.
    ///
    /// `dest` becomes the counterpart of `source`: `source/a/b.txt` lands at
    /// `dest/a/b.txt`. Existing files at the destination are overwritten.
    /// A plain file `source` degrades to [`FileCopier::copy`].
    pub fn copy_tree(&self, source: &Path, dest: &Path) -> Result<CopyStats> {
        let metadata = std::fs::metadata(source).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SlurmProbeError::NotFound(source.to_path_buf()),
            _ => SlurmProbeError::io(source, e),
        })?;

        if !metadata.is_dir() {
            return self.copy(source, dest);
        }

        let start = Instant::now();
        let mut stats = CopyStats::default();

        let walker = WalkDir::new(source).follow_links(self.options.follow_symlinks);
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(source).to_path_buf();
                SlurmProbeError::io(path, std::io::Error::other(e.to_string()))
            })?;

            let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
            let target = dest.join(relative);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                if !target.is_dir() {
                    std::fs::create_dir_all(&target).with_path(&target)?;
                    stats.dirs_created += 1;
                }
            } else if file_type.is_symlink() {
                self.copy_symlink(entry.path(), &target)?;
            } else {
                tracing::debug!("Copying {} -> {}", entry.path().display(), target.display());
                let file_stats = self.copy(entry.path(), &target)?;
                stats.files_copied += file_stats.files_copied;
                stats.bytes_copied += file_stats.bytes_copied;
            }
        }

        stats.duration = start.elapsed();
        Ok(stats)
    }

    /// Buffered copy
    fn copy_buffered(&self, source: &Path, dest: &Path) -> Result<u64> {
        let src_file = File::open(source).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SlurmProbeError::NotFound(source.to_path_buf()),
            _ => SlurmProbeError::io(source, e),
        })?;
        let dst_file = File::create(dest).with_path(dest)?;

        let mut reader = BufReader::with_capacity(self.options.buffer_size, src_file);
        let mut writer = BufWriter::with_capacity(self.options.buffer_size, dst_file);

        let bytes_copied = std::io::copy(&mut reader, &mut writer)
            .map_err(|e| SlurmProbeError::io(source, e))?;

        writer.flush().with_path(dest)?;

        Ok(bytes_copied)
    }

    #[cfg(unix)]
    fn copy_symlink(&self, source: &Path, dest: &Path) -> Result<()> {
        let target = std::fs::read_link(source).with_path(source)?;
        let _ = std::fs::remove_file(dest);
        std::os::unix::fs::symlink(&target, dest).with_path(dest)
    }

    #[cfg(not(unix))]
    fn copy_symlink(&self, source: &Path, dest: &Path) -> Result<()> {
        self.copy(source, dest).map(|_| ())
    }

    /// Copy file permissions
    fn copy_permissions(&self, source: &Path, dest: &Path) -> Result<()> {
        let metadata = std::fs::metadata(source).with_path(source)?;
        std::fs::set_permissions(dest, metadata.permissions()).with_path(dest)?;
        Ok(())
    }

    /// Copy modification time
    fn copy_mtime(&self, source: &Path, dest: &Path) -> Result<()> {
        let metadata = std::fs::metadata(source).with_path(source)?;

        if let Ok(mtime) = metadata.modified() {
            let _ = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(mtime));
        }

        if let Ok(atime) = metadata.accessed() {
            let _ = filetime::set_file_atime(dest, filetime::FileTime::from_system_time(atime));
        }

        Ok(())
    }
}

/// Remove a file or directory
pub fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path).with_path(path)?;
    } else {
        std::fs::remove_file(path).with_path(path)?;
    }
    Ok(())
}

//! Overwrites local configuration files.

use crate::error::{Result, SyncError};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Writes fetched content to local files.
///
/// A missing file is created; an existing file is truncated in place and
/// rewritten, which keeps its ownership and permissions. This is not a
/// rename-based replace: a crash mid-write can leave a truncated file behind.
/// Parent directories are never created.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileWriter;

impl LocalFileWriter {
    /// Create a new writer.
    pub fn new() -> Self {
        Self
    }

    /// Replace the contents of `path` with `content`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::IoError` if the file cannot be opened, written,
    /// or flushed to disk. There is no retry.
    pub fn write(&self, path: impl AsRef<Path>, content: &str) -> Result<()> {
        let path = path.as_ref();
        let io_error = |source| SyncError::IoError {
            path: path.to_path_buf(),
            source,
        };

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(io_error)?;
        file.write_all(content.as_bytes()).map_err(io_error)?;
        file.sync_all().map_err(io_error)?;

        Ok(())
    }
}

//! Custom error types for zipvault.
//!
//! Every variant names the stage that failed and the path it failed on.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error ({path}): {reason}")]
    ConfigLoad { path: PathBuf, reason: String },

    #[error("Failed to create archive {path}: {reason}")]
    ArchiveCreate { path: PathBuf, reason: String },

    #[error("Failed to extract archive {path}: {reason}")]
    ArchiveExtract { path: PathBuf, reason: String },

    #[error("Metadata I/O error ({path}): {reason}")]
    MetadataIo { path: PathBuf, reason: String },

    #[error("Failed to traverse {path}: {reason}")]
    Traversal { path: PathBuf, reason: String },

    #[error("No backup found in {0}")]
    NoBackupFound(PathBuf),

    #[error("Failed to remove old backup {path}: {reason}")]
    RetentionDelete { path: PathBuf, reason: String },

    #[error("Destination {path} is locked: {reason}")]
    Lock { path: PathBuf, reason: String },
}

impl BackupError {
    pub fn config(path: &Path, reason: impl ToString) -> Self {
        Self::ConfigLoad { path: path.to_path_buf(), reason: reason.to_string() }
    }

    pub fn archive_create(path: &Path, reason: impl ToString) -> Self {
        Self::ArchiveCreate { path: path.to_path_buf(), reason: reason.to_string() }
    }

    pub fn archive_extract(path: &Path, reason: impl ToString) -> Self {
        Self::ArchiveExtract { path: path.to_path_buf(), reason: reason.to_string() }
    }

    pub fn metadata_io(path: &Path, reason: impl ToString) -> Self {
        Self::MetadataIo { path: path.to_path_buf(), reason: reason.to_string() }
    }

    pub fn traversal(path: &Path, reason: impl ToString) -> Self {
        Self::Traversal { path: path.to_path_buf(), reason: reason.to_string() }
    }

    pub fn retention_delete(path: &Path, reason: impl ToString) -> Self {
        Self::RetentionDelete { path: path.to_path_buf(), reason: reason.to_string() }
    }

    pub fn lock(path: &Path, reason: impl ToString) -> Self {
        Self::Lock { path: path.to_path_buf(), reason: reason.to_string() }
    }

    /// True when no backup has ever been recorded for the destination.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoBackupFound(_))
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

//! Change detection between two source listings.
//!
//! A file counts as new when its full path, compared as a raw OS string,
//! does not appear in the previous listing. Content and mtime are not
//! consulted, so a file edited in place is not a change.

use crate::fs::walker::DirectoryLister;
use crate::utils::errors::{BackupError, Result};
use std::collections::{BTreeSet, HashSet};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

pub struct ChangeDetector<'a> {
    lister: &'a dyn DirectoryLister,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(lister: &'a dyn DirectoryLister) -> Self {
        Self { lister }
    }

    /// Files under `current` that are absent from the listing of `previous`.
    ///
    /// `previous` is the source directory of the last recorded backup; `None`
    /// (no backup yet) makes every current file new.
    pub fn detect_changes(&self, current: &Path, previous: Option<&Path>) -> Result<BTreeSet<PathBuf>> {
        let current_files = self
            .lister
            .list(current)
            .map_err(|e| BackupError::traversal(current, e))?;

        let previous_files = match previous {
            Some(previous) => self
                .lister
                .list(previous)
                .map_err(|e| BackupError::traversal(previous, e))?,
            None => Vec::new(),
        };

        let changes = diff_listings(current_files, &previous_files);
        tracing::debug!(
            "Change detection: {} new files in {}",
            changes.len(),
            current.display()
        );
        Ok(changes)
    }
}

/// Set difference `current \ previous` on exact path strings
pub fn diff_listings(current: Vec<PathBuf>, previous: &[PathBuf]) -> BTreeSet<PathBuf> {
    let seen: HashSet<&OsStr> = previous.iter().map(|p| p.as_os_str()).collect();
    current
        .into_iter()
        .filter(|path| !seen.contains(path.as_os_str()))
        .collect()
}

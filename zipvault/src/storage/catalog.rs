//! Archives present in a destination, resolved to their backup records.

use super::metadata::{BackupRecord, MetadataStore};
use crate::archive::is_archive;
use crate::fs::walker::DirectoryLister;
use crate::utils::errors::{BackupError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// An archive on disk together with the record that created it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Where the archive was found during the scan
    pub archive: PathBuf,
    pub record: BackupRecord,
}

/// Resolvable archives of one destination, oldest first
#[derive(Debug, Clone, Default)]
pub struct BackupCatalog {
    entries: Vec<CatalogEntry>,
}

impl BackupCatalog {
    /// List archive files in `destination` and resolve each through the index.
    /// Archives without a record are left out.
    pub fn scan(destination: &Path, lister: &dyn DirectoryLister, store: &MetadataStore) -> Result<Self> {
        let files = lister
            .list(destination)
            .map_err(|e| BackupError::traversal(destination, e))?;
        let mut records = store.records_by_archive()?;

        let mut entries = Vec::new();
        for archive in files.into_iter().filter(|path| is_archive(path)) {
            let record = archive.file_name().and_then(|name| records.remove(name));
            match record {
                Some(record) => entries.push(CatalogEntry { archive, record }),
                None => debug!("No backup record for {}, skipping", archive.display()),
            }
        }

        entries.sort_by_key(|entry| entry.record.created_at);
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn most_recent(&self) -> Option<&CatalogEntry> {
        self.entries.last()
    }

    pub fn into_most_recent(mut self) -> Option<CatalogEntry> {
        self.entries.pop()
    }
}

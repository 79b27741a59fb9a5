//! Retention cleanup: deletes archives older than the retention window.

use super::catalog::BackupCatalog;
use super::metadata::MetadataStore;
use crate::fs::walker::DirectoryLister;
use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// Archives that resolved to a backup record
    pub examined: usize,
    pub removed: Vec<PathBuf>,
}

pub struct RetentionManager<'a> {
    lister: &'a dyn DirectoryLister,
}

impl<'a> RetentionManager<'a> {
    pub fn new(lister: &'a dyn DirectoryLister) -> Self {
        Self { lister }
    }

    pub fn cleanup_old_backups(&self, destination: &Path, retention_days: u32) -> Result<CleanupReport> {
        self.cleanup_old_backups_at(destination, retention_days, Utc::now())
    }

    /// Delete every archive whose record is more than `retention_days` days
    /// older than `now`. Archives without a record are never touched.
    pub fn cleanup_old_backups_at(
        &self,
        destination: &Path,
        retention_days: u32,
        now: DateTime<Utc>,
    ) -> Result<CleanupReport> {
        let store = MetadataStore::new(destination);
        let catalog = BackupCatalog::scan(destination, self.lister, &store)?;
        let max_age = Duration::days(i64::from(retention_days));

        let mut report = CleanupReport {
            examined: catalog.len(),
            removed: Vec::new(),
        };

        for entry in catalog.entries() {
            let age = now - entry.record.created_at;
            if age <= max_age {
                debug!("Keeping {} (age {}s)", entry.archive.display(), age.num_seconds());
                continue;
            }

            if let Err(e) = fs::remove_file(&entry.archive) {
                // Keep the index in step with what is already gone
                if !report.removed.is_empty() {
                    store.forget(&report.removed)?;
                }
                return Err(BackupError::retention_delete(&entry.archive, e));
            }
            info!("Removed old backup {}", entry.archive.display());
            report.removed.push(entry.archive.clone());
        }

        if !report.removed.is_empty() {
            store.forget(&report.removed)?;
        }

        info!(
            "Retention ({} days): {} archives examined, {} removed",
            retention_days,
            report.examined,
            report.removed.len()
        );
        Ok(report)
    }
}

//! Backup and restore orchestration.
//!
//! `backup` runs: lock destination → (detect changes) → write archive →
//! store record → verify archive → retention cleanup.
//! `restore` runs: lock destination → pick most recent archive → extract.
//!
//! Every stage is fail-fast. Stages that already completed are not rolled
//! back, so a backup failing at cleanup still leaves a usable archive and
//! record behind.

use crate::archive::{verify_backup, ArchiveReader, ArchiveSummary, ArchiveWriter, ExtractSummary};
use crate::config::Config;
use crate::fs::changes::ChangeDetector;
use crate::fs::lock::{DestinationLock, LOCK_FILE};
use crate::fs::metadata::{FsPermissionPreserver, OwnershipReader, PermissionPreserver, SystemOwnership};
use crate::fs::walker::{DirectoryLister, WalkDirLister, WalkOptions};
use crate::storage::metadata::{INDEX_FILE, METADATA_FILE};
use crate::storage::{BackupCatalog, BackupRecord, CatalogEntry, CleanupReport, MetadataStore, RetentionManager};
use crate::utils::errors::{BackupError, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Files the destination keeps for itself; restore never overwrites them
const STORE_FILES: [&str; 3] = [METADATA_FILE, INDEX_FILE, LOCK_FILE];

/// What a successful backup produced
#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub archive: ArchiveSummary,
    pub record: BackupRecord,
    pub verified: ExtractSummary,
    pub cleanup: CleanupReport,
}

/// What a successful restore produced
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub archive: PathBuf,
    pub record: BackupRecord,
    pub extracted: ExtractSummary,
}

pub struct BackupOrchestrator {
    config: Config,
    source_lister: Box<dyn DirectoryLister>,
    archive_lister: Box<dyn DirectoryLister>,
    ownership: Box<dyn OwnershipReader>,
    preserver: Box<dyn PermissionPreserver>,
}

impl BackupOrchestrator {
    /// Orchestrator with the host file system capabilities
    pub fn new(config: Config) -> Self {
        let walk_options = WalkOptions::from(&config.walk);
        Self {
            config,
            source_lister: Box::new(WalkDirLister::new(walk_options)),
            archive_lister: Box::new(WalkDirLister::shallow()),
            ownership: Box::new(SystemOwnership),
            preserver: Box::new(FsPermissionPreserver),
        }
    }

    /// Load configuration from `path` and build an orchestrator from it
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let config = Config::from_file(path)?;
        Ok(Self::new(config))
    }

    pub fn with_source_lister(mut self, lister: impl DirectoryLister + 'static) -> Self {
        self.source_lister = Box::new(lister);
        self
    }

    pub fn with_ownership(mut self, ownership: impl OwnershipReader + 'static) -> Self {
        self.ownership = Box::new(ownership);
        self
    }

    pub fn with_preserver(mut self, preserver: impl PermissionPreserver + 'static) -> Self {
        self.preserver = Box::new(preserver);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Back up `source` into `destination`, fully or only the new files
    pub fn backup(&self, source: &Path, destination: &Path, incremental: bool) -> Result<BackupOutcome> {
        fs::create_dir_all(destination)
            .map_err(|e| BackupError::archive_create(destination, format!("failed to create destination: {}", e)))?;
        let _lock = DestinationLock::acquire(destination)?;
        let store = MetadataStore::new(destination);

        let writer = ArchiveWriter::new(
            self.source_lister.as_ref(),
            self.ownership.as_ref(),
            &self.config.archive,
        );

        let archive = if incremental {
            let previous_source = match store.load_latest() {
                Ok(record) => Some(record.source),
                Err(e) if e.is_not_found() => {
                    info!("No previous backup in {}, every file is new", destination.display());
                    None
                }
                Err(e) => return Err(e),
            };
            let changes = ChangeDetector::new(self.source_lister.as_ref())
                .detect_changes(source, previous_source.as_deref())?;
            info!("Detected {} new files in {}", changes.len(), source.display());
            writer.create_incremental_archive(destination, source, &changes)?
        } else {
            writer.create_archive(destination, source)?
        };
        info!("Backup created at: {}", archive.path.display());

        let record = BackupRecord::new(source, destination, &archive.path, Utc::now());
        store.store(&record)?;

        let verified = verify_backup(&archive.path)?;

        let cleanup = RetentionManager::new(self.archive_lister.as_ref())
            .cleanup_old_backups(destination, self.config.retention_days)?;

        Ok(BackupOutcome {
            archive,
            record,
            verified,
            cleanup,
        })
    }

    /// Extract the most recent archive of `destination` back into it.
    ///
    /// `source` only appears in the log output.
    pub fn restore(&self, source: &Path, destination: &Path) -> Result<RestoreOutcome> {
        if !destination.is_dir() {
            return Err(BackupError::NoBackupFound(destination.to_path_buf()));
        }
        let _lock = DestinationLock::acquire(destination)?;

        let recent = self.find_recent_backup(destination)?;
        info!(
            "Restoring {} into {} (backed up from {}, requested source {})",
            recent.archive.display(),
            destination.display(),
            recent.record.source.display(),
            source.display()
        );

        let extracted = ArchiveReader::new(self.preserver.as_ref())
            .with_reserved_names(&STORE_FILES)
            .extract_archive(&recent.archive, destination)?;
        info!("Restored from: {}", recent.record);

        Ok(RestoreOutcome {
            archive: recent.archive,
            record: recent.record,
            extracted,
        })
    }

    /// Record of the most recent resolvable backup in `destination`
    pub fn latest_version(&self, destination: &Path) -> Result<BackupRecord> {
        if !destination.is_dir() {
            return Err(BackupError::NoBackupFound(destination.to_path_buf()));
        }
        Ok(self.find_recent_backup(destination)?.record)
    }

    /// Run retention cleanup on its own
    pub fn cleanup(&self, destination: &Path) -> Result<CleanupReport> {
        let _lock = DestinationLock::acquire(destination)?;
        RetentionManager::new(self.archive_lister.as_ref())
            .cleanup_old_backups(destination, self.config.retention_days)
    }

    fn find_recent_backup(&self, destination: &Path) -> Result<CatalogEntry> {
        let store = MetadataStore::new(destination);
        BackupCatalog::scan(destination, self.archive_lister.as_ref(), &store)?
            .into_most_recent()
            .ok_or_else(|| BackupError::NoBackupFound(destination.to_path_buf()))
    }
}

//! Backup records for a destination directory.
//!
//! `metadata.json` always holds the record of the latest backup and is
//! overwritten on every run. `backup-index.jsonl` keeps one record per
//! archive ever created, so every archive resolves to its own creation time.

use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const METADATA_FILE: &str = "metadata.json";
pub const INDEX_FILE: &str = "backup-index.jsonl";

/// Description of one backup run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(rename = "path")]
    pub archive_path: PathBuf,
    #[serde(rename = "time")]
    pub created_at: DateTime<Utc>,
}

impl BackupRecord {
    pub fn new(source: &Path, destination: &Path, archive_path: &Path, created_at: DateTime<Utc>) -> Self {
        Self {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            archive_path: archive_path.to_path_buf(),
            created_at,
        }
    }

    fn archive_name(&self) -> Option<OsString> {
        self.archive_path.file_name().map(|name| name.to_os_string())
    }
}

impl fmt::Display for BackupRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Backup version: {} (created at: {})",
            self.archive_path.display(),
            self.created_at.to_rfc3339()
        )
    }
}

/// Reads and writes the records of one destination directory
#[derive(Debug, Clone)]
pub struct MetadataStore {
    destination: PathBuf,
}

impl MetadataStore {
    pub fn new(destination: &Path) -> Self {
        Self {
            destination: destination.to_path_buf(),
        }
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.destination.join(METADATA_FILE)
    }

    pub fn index_path(&self) -> PathBuf {
        self.destination.join(INDEX_FILE)
    }

    /// Replace the latest-backup record and append it to the index
    pub fn store(&self, record: &BackupRecord) -> Result<()> {
        let metadata_path = self.metadata_path();
        let data = serde_json::to_vec(record).map_err(|e| BackupError::metadata_io(&metadata_path, e))?;
        fs::write(&metadata_path, data).map_err(|e| BackupError::metadata_io(&metadata_path, e))?;

        let index_path = self.index_path();
        let mut line = serde_json::to_string(record).map_err(|e| BackupError::metadata_io(&index_path, e))?;
        line.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&index_path)
            .and_then(|mut index| index.write_all(line.as_bytes()))
            .map_err(|e| BackupError::metadata_io(&index_path, e))?;

        tracing::debug!("Stored backup record for {}", record.archive_path.display());
        Ok(())
    }

    /// Record of the most recent backup into this destination
    pub fn load_latest(&self) -> Result<BackupRecord> {
        let metadata_path = self.metadata_path();
        let data = match fs::read(&metadata_path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BackupError::NoBackupFound(self.destination.clone()))
            }
            Err(e) => return Err(BackupError::metadata_io(&metadata_path, e)),
        };
        serde_json::from_slice(&data).map_err(|e| BackupError::metadata_io(&metadata_path, e))
    }

    /// Every indexed record in append order; unreadable lines are skipped
    pub fn records(&self) -> Result<Vec<BackupRecord>> {
        let index_path = self.index_path();
        let content = match fs::read_to_string(&index_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BackupError::metadata_io(&index_path, e)),
        };

        let mut records = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping line {} of {}: {}", number + 1, index_path.display(), e),
            }
        }
        Ok(records)
    }

    /// Records keyed by archive file name; later entries win
    pub fn records_by_archive(&self) -> Result<HashMap<OsString, BackupRecord>> {
        let mut by_archive = HashMap::new();
        for record in self.records()? {
            if let Some(name) = record.archive_name() {
                by_archive.insert(name, record);
            }
        }
        Ok(by_archive)
    }

    /// Record for the archive at `archive_path`, matched by file name
    pub fn lookup(&self, archive_path: &Path) -> Result<Option<BackupRecord>> {
        let Some(name) = archive_path.file_name() else {
            return Ok(None);
        };
        Ok(self.records_by_archive()?.remove(name))
    }

    /// Drop the records of deleted archives by rewriting the index
    pub fn forget(&self, archives: &[PathBuf]) -> Result<usize> {
        let names: HashSet<&std::ffi::OsStr> = archives.iter().filter_map(|p| p.file_name()).collect();
        let records = self.records()?;
        let before = records.len();

        let mut kept = String::new();
        for record in records
            .iter()
            .filter(|record| !record.archive_path.file_name().is_some_and(|name| names.contains(name)))
        {
            let line = serde_json::to_string(record).map_err(|e| BackupError::metadata_io(&self.index_path(), e))?;
            kept.push_str(&line);
            kept.push('\n');
        }
        let removed = before - kept.lines().count();

        let index_path = self.index_path();
        let mut tmp = tempfile::NamedTempFile::new_in(&self.destination)
            .map_err(|e| BackupError::metadata_io(&index_path, e))?;
        tmp.write_all(kept.as_bytes())
            .map_err(|e| BackupError::metadata_io(&index_path, e))?;
        tmp.persist(&index_path)
            .map_err(|e| BackupError::metadata_io(&index_path, e.error))?;

        Ok(removed)
    }
}

//! Manifest stored inside every archive.
//!
//! The manifest records each entry's size, mtime, mode and owner so restores
//! can re-apply them, and so verification can check the archive against
//! itself.

use super::ArchiveKind;
use crate::fs::metadata::FileMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Preferred entry name of the manifest
pub const MANIFEST_ENTRY: &str = ".backup-manifest.json";

/// The archive comment reads `<prefix><entry name>` and points at the manifest
pub const MANIFEST_COMMENT_PREFIX: &str = "zipvault-manifest:";

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub kind: ArchiveKind,
    pub source: PathBuf,
    pub created_at: DateTime<Utc>,
    pub files: BTreeMap<String, FileMetadata>,
    pub total_files: usize,
    pub total_bytes: u64,
}

impl Manifest {
    pub fn new(kind: ArchiveKind, source: PathBuf) -> Self {
        Self {
            version: MANIFEST_VERSION,
            kind,
            source,
            created_at: Utc::now(),
            files: BTreeMap::new(),
            total_files: 0,
            total_bytes: 0,
        }
    }

    pub fn insert(&mut self, entry_name: String, metadata: FileMetadata) {
        self.total_bytes += metadata.size;
        self.total_files += 1;
        if let Some(replaced) = self.files.insert(entry_name, metadata) {
            self.total_bytes -= replaced.size;
            self.total_files -= 1;
        }
    }

    pub fn get(&self, entry_name: &str) -> Option<&FileMetadata> {
        self.files.get(entry_name)
    }

    /// Entry name for the manifest that no data entry uses
    pub fn entry_name(taken: impl Fn(&str) -> bool) -> String {
        if !taken(MANIFEST_ENTRY) {
            return MANIFEST_ENTRY.to_string();
        }
        (1..)
            .map(|n| format!(".backup-manifest-{}.json", n))
            .find(|name| !taken(name))
            .unwrap_or_default()
    }
}

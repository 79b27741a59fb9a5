//! Zip archive construction and extraction.
//!
//! Archives are named `backup_<YYYYMMDDhhmmss>.zip` for full backups and
//! `incremental_backup_<YYYYMMDDhhmmss>.zip` for incremental ones, using local
//! time at the moment the archive is opened.

pub mod manifest;
pub mod reader;
pub mod writer;

pub use manifest::{Manifest, MANIFEST_ENTRY};
pub use reader::{verify_backup, ArchiveReader, ExtractSummary};
pub use writer::{ArchiveSummary, ArchiveWriter};

use crate::config::{Compression, EntryNaming};
use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

pub const ARCHIVE_EXTENSION: &str = "zip";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    Full,
    Incremental,
}

impl ArchiveKind {
    fn file_prefix(self) -> &'static str {
        match self {
            ArchiveKind::Full => "backup",
            ArchiveKind::Incremental => "incremental_backup",
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveKind::Full => f.write_str("full"),
            ArchiveKind::Incremental => f.write_str("incremental"),
        }
    }
}

/// `backup_20240131235959.zip` style name for an archive opened at `opened_at`
pub fn archive_file_name(kind: ArchiveKind, opened_at: DateTime<Local>) -> String {
    format!(
        "{}_{}.{}",
        kind.file_prefix(),
        opened_at.format("%Y%m%d%H%M%S"),
        ARCHIVE_EXTENSION
    )
}

pub fn is_archive(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(ARCHIVE_EXTENSION)
}

/// Entry name for `path` inside an archive of `root`.
///
/// Relative names are `/`-separated regardless of platform. Paths outside
/// `root` fall back to their base name.
pub fn entry_name(path: &Path, root: &Path, naming: EntryNaming) -> Option<String> {
    let base_name = || path.file_name().map(|name| name.to_string_lossy().into_owned());

    match naming {
        EntryNaming::Flat => base_name(),
        EntryNaming::Relative => {
            let Ok(relative) = path.strip_prefix(root) else {
                return base_name();
            };
            let parts: Vec<_> = relative
                .components()
                .filter_map(|component| match component {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect();
            if parts.is_empty() {
                base_name()
            } else {
                Some(parts.join("/"))
            }
        }
    }
}

pub(crate) fn compression_method(compression: Compression) -> zip::CompressionMethod {
    match compression {
        Compression::Stored => zip::CompressionMethod::Stored,
        Compression::Deflate => zip::CompressionMethod::Deflated,
        Compression::Zstd => zip::CompressionMethod::Zstd,
    }
}

/// DOS timestamp for a Unix mtime; dates zip cannot express become 1980-01-01
pub(crate) fn zip_timestamp(modified: u64) -> zip::DateTime {
    let Ok(secs) = i64::try_from(modified) else {
        return zip::DateTime::default();
    };
    let Some(local) = Local.timestamp_opt(secs, 0).single() else {
        return zip::DateTime::default();
    };
    let Ok(year) = u16::try_from(local.year()) else {
        return zip::DateTime::default();
    };

    zip::DateTime::from_date_and_time(
        year,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .unwrap_or_default()
}

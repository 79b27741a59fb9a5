//! Unpacks archives into a destination tree and verifies them.

use super::manifest::{Manifest, MANIFEST_COMMENT_PREFIX};
use crate::fs::metadata::{FileMetadata, NoOwnership, PermissionPreserver};
use crate::utils::errors::{BackupError, Result};
use crate::utils::progress::ProgressTracker;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek};
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};
use zip::result::ZipError;
use zip::ZipArchive;

/// Result of an extraction pass
#[derive(Debug, Clone, Default)]
pub struct ExtractSummary {
    pub files: usize,
    pub bytes: u64,
    pub extracted: Vec<PathBuf>,
}

pub struct ArchiveReader<'a> {
    preserver: Option<&'a dyn PermissionPreserver>,
    reserved: &'a [&'a str],
}

impl<'a> ArchiveReader<'a> {
    /// Reader that re-applies recorded metadata to every extracted file
    pub fn new(preserver: &'a dyn PermissionPreserver) -> Self {
        Self {
            preserver: Some(preserver),
            reserved: &[],
        }
    }

    /// Reader that only writes bytes
    pub fn without_metadata() -> Self {
        Self {
            preserver: None,
            reserved: &[],
        }
    }

    /// Top-level names in the destination that extraction must not touch
    pub fn with_reserved_names(mut self, names: &'a [&'a str]) -> Self {
        self.reserved = names;
        self
    }

    /// Extract every entry of `archive_path` below `destination`.
    ///
    /// Stops at the first failure; files already written stay in place.
    pub fn extract_archive(&self, archive_path: &Path, destination: &Path) -> Result<ExtractSummary> {
        let fail = |reason: String| BackupError::archive_extract(archive_path, reason);

        let mut archive = open_archive(archive_path)?;
        let manifest_entry = manifest_entry_name(&archive);
        let manifest = load_manifest(&mut archive).map_err(fail)?;
        let mut progress = ProgressTracker::new();
        let mut extracted = Vec::new();

        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| fail(format!("failed to open entry #{}: {}", index, e)))?;
            let name = entry.name().to_string();

            if manifest_entry.as_deref() == Some(name.as_str()) {
                continue;
            }

            let Some(relative) = entry.enclosed_name() else {
                return Err(fail(format!("refusing unsafe entry name {}", name)));
            };
            if self.is_reserved(&relative) {
                warn!("Skipping entry {}: name is reserved in {}", name, destination.display());
                continue;
            }
            let target = destination.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&target)
                    .map_err(|e| fail(format!("failed to create directory {}: {}", target.display(), e)))?;
                continue;
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| fail(format!("failed to create directory {}: {}", parent.display(), e)))?;
            }

            // Replace rather than truncate: a restored read-only file can't be reopened for writing
            match fs::remove_file(&target) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(fail(format!("failed to replace {}: {}", target.display(), e))),
            }
            let mut out = File::create(&target)
                .map_err(|e| fail(format!("failed to create {}: {}", target.display(), e)))?;
            let copied = io::copy(&mut entry, &mut out)
                .map_err(|e| fail(format!("failed to extract {}: {}", name, e)))?;
            drop(out);

            if let Some(preserver) = self.preserver {
                let recorded = match manifest.as_ref().and_then(|m| m.get(&name)) {
                    Some(recorded) => Some(recorded.clone()),
                    None => fallback_metadata(&target, entry.unix_mode()),
                };
                if let Some(recorded) = recorded {
                    preserver
                        .apply(&target, &recorded)
                        .map_err(|e| fail(format!("failed to restore metadata of {}: {}", target.display(), e)))?;
                }
            }

            progress.record_file(&name, copied);
            extracted.push(target);
        }

        info!(
            "Extracted {} from {}",
            progress.summary(),
            archive_path.display()
        );

        Ok(ExtractSummary {
            files: progress.counters().files,
            bytes: progress.counters().bytes,
            extracted,
        })
    }

    fn is_reserved(&self, relative: &Path) -> bool {
        let mut components = relative.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(first)), None) => self.reserved.iter().any(|name| first == *name),
            _ => false,
        }
    }
}

/// Read the manifest of an archive, `None` for archives without one
pub fn read_manifest(archive_path: &Path) -> Result<Option<Manifest>> {
    let mut archive = open_archive(archive_path)?;
    load_manifest(&mut archive).map_err(|reason| BackupError::archive_extract(archive_path, reason))
}

/// Extract `archive_path` into a throwaway directory and check it against its
/// manifest. Catches container corruption, not divergence from the source.
pub fn verify_backup(archive_path: &Path) -> Result<ExtractSummary> {
    let fail = |reason: String| BackupError::archive_extract(archive_path, reason);

    let scratch = tempfile::Builder::new()
        .prefix("zipvault-verify-")
        .tempdir()
        .map_err(|e| fail(format!("failed to create scratch directory: {}", e)))?;

    let summary = ArchiveReader::without_metadata().extract_archive(archive_path, scratch.path())?;

    if let Some(manifest) = read_manifest(archive_path)? {
        if manifest.total_files != summary.files {
            return Err(fail(format!(
                "manifest lists {} files, archive holds {}",
                manifest.total_files, summary.files
            )));
        }
        for (name, recorded) in &manifest.files {
            let extracted = scratch.path().join(name);
            let size = fs::metadata(&extracted)
                .map_err(|_| fail(format!("entry {} listed in manifest is missing", name)))?
                .len();
            if size != recorded.size {
                return Err(fail(format!(
                    "entry {} is {} bytes, manifest records {}",
                    name, size, recorded.size
                )));
            }
        }
    }

    info!("Verified {} ({} files)", archive_path.display(), summary.files);
    Ok(summary)
}

fn open_archive(archive_path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file = File::open(archive_path)
        .map_err(|e| BackupError::archive_extract(archive_path, format!("failed to open archive: {}", e)))?;
    ZipArchive::new(BufReader::new(file))
        .map_err(|e| BackupError::archive_extract(archive_path, format!("failed to read archive: {}", e)))
}

/// Entry holding the manifest, as named by the archive comment
fn manifest_entry_name<R: Read + Seek>(archive: &ZipArchive<R>) -> Option<String> {
    std::str::from_utf8(archive.comment())
        .ok()?
        .strip_prefix(MANIFEST_COMMENT_PREFIX)
        .map(str::to_string)
}

fn load_manifest<R: Read + Seek>(archive: &mut ZipArchive<R>) -> std::result::Result<Option<Manifest>, String> {
    let Some(manifest_entry) = manifest_entry_name(archive) else {
        return Ok(None);
    };
    let mut entry = match archive.by_name(&manifest_entry) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(format!("failed to open manifest: {}", e)),
    };

    let mut data = Vec::new();
    entry
        .read_to_end(&mut data)
        .map_err(|e| format!("failed to read manifest: {}", e))?;
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| format!("failed to parse manifest: {}", e))
}

/// Metadata for entries not covered by a manifest: keep the written file's
/// mtime, take the mode from the zip header when there is one
fn fallback_metadata(target: &Path, unix_mode: Option<u32>) -> Option<FileMetadata> {
    let mode = unix_mode?;
    let mut metadata = FileMetadata::stat(target, &NoOwnership).ok()?;
    metadata.permissions = Some(mode & 0o7777);
    Some(metadata)
}

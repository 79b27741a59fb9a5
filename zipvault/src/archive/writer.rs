//! Packs source files into a zip archive.

use super::manifest::{Manifest, MANIFEST_COMMENT_PREFIX};
use super::{archive_file_name, compression_method, entry_name, zip_timestamp, ArchiveKind};
use crate::config::{ArchiveConfig, Compression};
use crate::fs::metadata::{FileMetadata, OwnershipReader};
use crate::fs::walker::DirectoryLister;
use crate::utils::errors::{BackupError, Result};
use crate::utils::progress::ProgressTracker;
use chrono::Local;
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Entries at or above this size need zip64 headers
const LARGE_FILE_THRESHOLD: u64 = u32::MAX as u64;

/// Result of a finished archive
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub kind: ArchiveKind,
    pub files: usize,
    pub bytes: u64,
}

pub struct ArchiveWriter<'a> {
    lister: &'a dyn DirectoryLister,
    ownership: &'a dyn OwnershipReader,
    options: &'a ArchiveConfig,
}

impl<'a> ArchiveWriter<'a> {
    pub fn new(
        lister: &'a dyn DirectoryLister,
        ownership: &'a dyn OwnershipReader,
        options: &'a ArchiveConfig,
    ) -> Self {
        Self {
            lister,
            ownership,
            options,
        }
    }

    /// Archive every file under `source` into a new full backup in `destination`
    pub fn create_archive(&self, destination: &Path, source: &Path) -> Result<ArchiveSummary> {
        let files = self
            .lister
            .list(source)
            .map_err(|e| BackupError::traversal(source, e))?;

        self.write_archive(destination, source, ArchiveKind::Full, files)
    }

    /// Archive only the files in `changes` into a new incremental backup
    pub fn create_incremental_archive(
        &self,
        destination: &Path,
        source: &Path,
        changes: &BTreeSet<PathBuf>,
    ) -> Result<ArchiveSummary> {
        self.write_archive(
            destination,
            source,
            ArchiveKind::Incremental,
            changes.iter().cloned().collect(),
        )
    }

    fn write_archive(
        &self,
        destination: &Path,
        source: &Path,
        kind: ArchiveKind,
        files: Vec<PathBuf>,
    ) -> Result<ArchiveSummary> {
        let entries = self.plan_entries(source, files);
        let path = destination.join(archive_file_name(kind, Local::now()));

        info!(
            "Creating {} archive {} ({} files)",
            kind,
            path.display(),
            entries.len()
        );

        match self.write_entries(&path, source, kind, &entries) {
            Ok(progress) => {
                info!("Archived {}", progress.summary());
                Ok(ArchiveSummary {
                    path,
                    kind,
                    files: progress.counters().files,
                    bytes: progress.counters().bytes,
                })
            }
            Err(e) => {
                // Leave no half-written archive for restore or retention to trip on
                match fs::remove_file(&path) {
                    Ok(()) => warn!("Removed incomplete archive {}", path.display()),
                    Err(remove_err) if remove_err.kind() == io::ErrorKind::NotFound => {}
                    Err(remove_err) => warn!(
                        "Failed to remove incomplete archive {}: {}",
                        path.display(),
                        remove_err
                    ),
                }
                Err(e)
            }
        }
    }

    /// Pair every file with its entry name; later files win on name clashes.
    fn plan_entries(&self, source: &Path, files: Vec<PathBuf>) -> Vec<(String, PathBuf)> {
        let mut entries: Vec<(String, PathBuf)> = Vec::with_capacity(files.len());
        let mut positions: HashMap<String, usize> = HashMap::new();

        for file in files {
            let Some(name) = entry_name(&file, source, self.options.entry_naming) else {
                warn!("Skipping {}: no file name", file.display());
                continue;
            };
            match positions.get(&name) {
                Some(&index) => {
                    warn!(
                        "{} and {} share entry name {}, keeping the latter",
                        entries[index].1.display(),
                        file.display(),
                        name
                    );
                    entries[index].1 = file;
                }
                None => {
                    positions.insert(name.clone(), entries.len());
                    entries.push((name, file));
                }
            }
        }

        entries
    }

    fn write_entries(
        &self,
        path: &Path,
        source: &Path,
        kind: ArchiveKind,
        entries: &[(String, PathBuf)],
    ) -> Result<ProgressTracker> {
        let fail = |reason: String| BackupError::archive_create(path, reason);

        let file = File::create(path).map_err(|e| fail(e.to_string()))?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let mut manifest = Manifest::new(kind, source.to_path_buf());
        let mut progress = ProgressTracker::new();

        for (name, file_path) in entries {
            let metadata = FileMetadata::stat(file_path, self.ownership)
                .map_err(|e| fail(format!("failed to get file info for {}: {}", file_path.display(), e)))?;

            zip.start_file(name.as_str(), self.entry_options(&metadata))
                .map_err(|e| fail(format!("failed to create entry {}: {}", name, e)))?;

            let mut src = File::open(file_path)
                .map_err(|e| fail(format!("failed to open {}: {}", file_path.display(), e)))?;
            let copied = io::copy(&mut src, &mut zip)
                .map_err(|e| fail(format!("failed to copy {} into archive: {}", file_path.display(), e)))?;

            progress.record_file(name, copied);
            manifest.insert(name.clone(), FileMetadata { size: copied, ..metadata });
        }

        let manifest_json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| fail(format!("failed to serialize manifest: {}", e)))?;
        let manifest_entry = Manifest::entry_name(|candidate| manifest.get(candidate).is_some());
        zip.start_file(manifest_entry.as_str(), self.base_options())
            .map_err(|e| fail(format!("failed to create manifest entry: {}", e)))?;
        zip.write_all(&manifest_json)
            .map_err(|e| fail(format!("failed to write manifest: {}", e)))?;
        zip.set_comment(format!("{}{}", MANIFEST_COMMENT_PREFIX, manifest_entry));

        let mut inner = zip
            .finish()
            .map_err(|e| fail(format!("failed to finalize archive: {}", e)))?;
        inner.flush().map_err(|e| fail(e.to_string()))?;

        Ok(progress)
    }

    fn base_options(&self) -> SimpleFileOptions {
        let options = SimpleFileOptions::default()
            .compression_method(compression_method(self.options.compression));

        // Stored entries take no level
        match self.options.compression {
            Compression::Stored => options,
            _ => options.compression_level(self.options.compression_level),
        }
    }

    fn entry_options(&self, metadata: &FileMetadata) -> SimpleFileOptions {
        let options = self
            .base_options()
            .last_modified_time(zip_timestamp(metadata.modified))
            .large_file(metadata.size >= LARGE_FILE_THRESHOLD);

        match metadata.permissions {
            Some(mode) => options.unix_permissions(mode),
            None => options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::manifest::MANIFEST_ENTRY;
    use crate::archive::reader::read_manifest;
    use crate::config::EntryNaming;
    use crate::fs::metadata::NoOwnership;
    use crate::fs::walker::WalkDirLister;
    use tempfile::TempDir;

    struct FixedLister(Vec<PathBuf>);

    impl DirectoryLister for FixedLister {
        fn list(&self, _dir: &Path) -> std::io::Result<Vec<PathBuf>> {
            Ok(self.0.clone())
        }
    }

    fn zip_files_in(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if crate::archive::is_archive(&path) {
                found.push(path);
            }
        }
        Ok(found)
    }

    fn entry_names(archive: &Path) -> anyhow::Result<Vec<String>> {
        let zip = zip::ZipArchive::new(File::open(archive)?)?;
        let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
        names.sort();
        Ok(names)
    }

    #[test]
    fn test_full_archive_contains_relative_entries() -> anyhow::Result<()> {
        let src = TempDir::new()?;
        let dst = TempDir::new()?;
        fs::create_dir(src.path().join("docs"))?;
        fs::write(src.path().join("a.txt"), b"alpha")?;
        fs::write(src.path().join("docs/b.txt"), b"beta")?;

        let lister = WalkDirLister::default();
        let options = ArchiveConfig::default();
        let summary = ArchiveWriter::new(&lister, &NoOwnership, &options)
            .create_archive(dst.path(), src.path())?;

        assert_eq!(summary.kind, ArchiveKind::Full);
        assert_eq!(summary.files, 2);
        assert_eq!(summary.bytes, 9);
        let file_name = summary.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("backup_"));
        assert_eq!(file_name.len(), "backup_YYYYMMDDhhmmss.zip".len());

        assert_eq!(
            entry_names(&summary.path)?,
            vec![MANIFEST_ENTRY.to_string(), "a.txt".to_string(), "docs/b.txt".to_string()]
        );

        let manifest = read_manifest(&summary.path)?.expect("manifest present");
        assert_eq!(manifest.total_files, 2);
        assert_eq!(manifest.get("docs/b.txt").map(|m| m.size), Some(4));

        Ok(())
    }

    #[test]
    fn test_incremental_archive_holds_only_changes() -> anyhow::Result<()> {
        let src = TempDir::new()?;
        let dst = TempDir::new()?;
        fs::write(src.path().join("old.txt"), b"old")?;
        fs::write(src.path().join("new.txt"), b"new")?;

        let lister = WalkDirLister::default();
        let options = ArchiveConfig::default();
        let changes = BTreeSet::from([src.path().join("new.txt")]);
        let summary = ArchiveWriter::new(&lister, &NoOwnership, &options)
            .create_incremental_archive(dst.path(), src.path(), &changes)?;

        assert_eq!(summary.kind, ArchiveKind::Incremental);
        assert!(summary
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("incremental_backup_"));
        assert_eq!(
            entry_names(&summary.path)?,
            vec![MANIFEST_ENTRY.to_string(), "new.txt".to_string()]
        );

        Ok(())
    }

    #[test]
    fn test_flat_naming_collapses_equal_base_names() -> anyhow::Result<()> {
        let src = TempDir::new()?;
        let dst = TempDir::new()?;
        fs::create_dir(src.path().join("a"))?;
        fs::create_dir(src.path().join("b"))?;
        fs::write(src.path().join("a/same.txt"), b"one")?;
        fs::write(src.path().join("b/same.txt"), b"two")?;

        let lister = WalkDirLister::default();
        let options = ArchiveConfig {
            entry_naming: EntryNaming::Flat,
            ..ArchiveConfig::default()
        };
        let summary = ArchiveWriter::new(&lister, &NoOwnership, &options)
            .create_archive(dst.path(), src.path())?;

        assert_eq!(summary.files, 1);
        assert_eq!(
            entry_names(&summary.path)?,
            vec![MANIFEST_ENTRY.to_string(), "same.txt".to_string()]
        );

        Ok(())
    }

    #[test]
    fn test_manifest_moves_aside_for_same_named_file() -> anyhow::Result<()> {
        let src = TempDir::new()?;
        let dst = TempDir::new()?;
        fs::create_dir(src.path().join("deep"))?;
        fs::write(src.path().join("deep").join(MANIFEST_ENTRY), b"mine")?;

        let lister = WalkDirLister::default();
        let options = ArchiveConfig {
            entry_naming: EntryNaming::Flat,
            ..ArchiveConfig::default()
        };
        let summary = ArchiveWriter::new(&lister, &NoOwnership, &options)
            .create_archive(dst.path(), src.path())?;

        assert_eq!(summary.files, 1);
        assert_eq!(
            entry_names(&summary.path)?,
            vec![".backup-manifest-1.json".to_string(), MANIFEST_ENTRY.to_string()]
        );
        let manifest = read_manifest(&summary.path)?.expect("manifest present");
        assert_eq!(manifest.get(MANIFEST_ENTRY).map(|m| m.size), Some(4));

        Ok(())
    }

    #[test]
    fn test_failed_write_removes_partial_archive() -> anyhow::Result<()> {
        let src = TempDir::new()?;
        let dst = TempDir::new()?;
        fs::write(src.path().join("present.txt"), b"here")?;

        let lister = FixedLister(vec![
            src.path().join("present.txt"),
            src.path().join("vanished.txt"),
        ]);
        let options = ArchiveConfig::default();
        let err = ArchiveWriter::new(&lister, &NoOwnership, &options)
            .create_archive(dst.path(), src.path())
            .unwrap_err();

        assert!(matches!(err, BackupError::ArchiveCreate { .. }));
        assert!(zip_files_in(dst.path())?.is_empty());

        Ok(())
    }

    #[test]
    fn test_missing_source_is_traversal_error() -> anyhow::Result<()> {
        let dst = TempDir::new()?;
        let lister = WalkDirLister::default();
        let options = ArchiveConfig::default();

        let err = ArchiveWriter::new(&lister, &NoOwnership, &options)
            .create_archive(dst.path(), Path::new("/nonexistent/zipvault-src"))
            .unwrap_err();
        assert!(matches!(err, BackupError::Traversal { .. }));
        assert!(zip_files_in(dst.path())?.is_empty());

        Ok(())
    }
}

//! Directory listing for backup sources and destinations.
//!
//! [`DirectoryLister`] is the seam the core lists through; [`WalkDirLister`]
//! is the production implementation on top of `walkdir`.

use crate::config::WalkConfig;
use crate::utils::progress::format_bytes;
use glob::Pattern;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Lists the regular files below a directory, recursively.
pub trait DirectoryLister {
    fn list(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>>;
}

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Follow symbolic links
    pub follow_links: bool,

    /// Maximum depth (None = unlimited)
    pub max_depth: Option<usize>,

    /// Glob patterns (`*.tmp`, `.git`) matched against entry names; a matching
    /// directory is skipped together with everything below it
    pub exclude_patterns: Vec<String>,
}

impl From<&WalkConfig> for WalkOptions {
    fn from(config: &WalkConfig) -> Self {
        Self {
            follow_links: config.follow_links,
            max_depth: None,
            exclude_patterns: config.exclude_patterns.clone(),
        }
    }
}

/// Information about a file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// File size in bytes, of the link target for symlinks
    pub size: u64,
}

impl FileInfo {
    /// Create FileInfo from a DirEntry.
    /// Symlinks are resolved to their target; links to directories and broken
    /// links yield None.
    fn from_entry(entry: &DirEntry) -> std::io::Result<Option<Self>> {
        let raw_metadata = entry.metadata()?;
        let path = entry.path().to_path_buf();

        let size = if raw_metadata.is_symlink() {
            match std::fs::metadata(&path) {
                Ok(resolved) if resolved.is_dir() => return Ok(None),
                Ok(resolved) => resolved.len(),
                Err(_) => return Ok(None),
            }
        } else {
            raw_metadata.len()
        };

        Ok(Some(Self { path, size }))
    }
}

/// Walk a directory tree and collect all files, sorted by path
///
/// # Example
/// ```no_run
/// use zipvault::fs::walker::{walk_directory, WalkOptions};
/// use std::path::Path;
///
/// let files = walk_directory(Path::new("/data"), &WalkOptions::default()).unwrap();
/// println!("Found {} files", files.len());
/// ```
pub fn walk_directory(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<FileInfo>> {
    let patterns = compile_patterns(&options.exclude_patterns)?;
    let mut files = Vec::new();

    let mut walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .sort_by_file_name();

    if let Some(max_depth) = options.max_depth {
        walker = walker.max_depth(max_depth);
    }

    let entries = walker
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !should_exclude(entry, &patterns));

    for entry in entries {
        let entry = entry?;

        // Only files are backed up
        if entry.file_type().is_dir() {
            continue;
        }

        if let Some(file_info) = FileInfo::from_entry(&entry)? {
            files.push(file_info);
        }
    }

    Ok(files)
}

/// Production [`DirectoryLister`] backed by `walkdir`
#[derive(Debug, Clone, Default)]
pub struct WalkDirLister {
    options: WalkOptions,
}

impl WalkDirLister {
    pub fn new(options: WalkOptions) -> Self {
        Self { options }
    }

    /// Lister that only looks at the immediate children of a directory
    pub fn shallow() -> Self {
        Self::new(WalkOptions {
            max_depth: Some(1),
            ..WalkOptions::default()
        })
    }
}

impl DirectoryLister for WalkDirLister {
    fn list(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let files = walk_directory(dir, &self.options)?;
        let total: u64 = files.iter().map(|file| file.size).sum();
        tracing::debug!(
            "Listed {} files ({}) under {}",
            files.len(),
            format_bytes(total),
            dir.display()
        );

        Ok(files.into_iter().map(|file| file.path).collect())
    }
}

/// Compile exclude patterns, rejecting malformed globs
pub fn compile_patterns(patterns: &[String]) -> std::io::Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|e| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("invalid exclude pattern {:?}: {}", pattern, e),
                )
            })
        })
        .collect()
}

/// Check if a directory entry should be excluded based on patterns
fn should_exclude(entry: &DirEntry, patterns: &[Pattern]) -> bool {
    let file_name = entry.file_name().to_string_lossy();
    patterns.iter().any(|pattern| pattern.matches(&file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn relative(files: &[FileInfo], root: &Path) -> Vec<PathBuf> {
        files
            .iter()
            .filter_map(|file| file.path.strip_prefix(root).ok())
            .map(Path::to_path_buf)
            .collect()
    }

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let files = walk_directory(temp_dir.path(), &WalkOptions::default())?;
        assert_eq!(files.len(), 0);
        Ok(())
    }

    #[test]
    fn test_walk_with_subdirectories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("file1.txt"), b"content1")?;
        fs::write(temp_dir.path().join("subdir/file2.txt"), b"content2")?;

        let files = walk_directory(temp_dir.path(), &WalkOptions::default())?;
        assert_eq!(
            relative(&files, temp_dir.path()),
            vec![PathBuf::from("file1.txt"), PathBuf::from("subdir/file2.txt")]
        );
        assert_eq!(files[0].size, 8);

        Ok(())
    }

    #[test]
    fn test_exclude_prunes_directories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join(".git"))?;
        fs::write(temp_dir.path().join(".git/HEAD"), b"ref")?;
        fs::write(temp_dir.path().join("file.txt"), b"keep")?;

        let options = WalkOptions {
            exclude_patterns: vec![".git".to_string()],
            ..WalkOptions::default()
        };
        let files = walk_directory(temp_dir.path(), &options)?;
        assert_eq!(relative(&files, temp_dir.path()), vec![PathBuf::from("file.txt")]);

        Ok(())
    }

    #[test]
    fn test_exclude_globs_match_whole_names() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("cache"))?;
        fs::write(temp_dir.path().join("cache/blob"), b"x")?;
        fs::write(temp_dir.path().join("notes.tmp"), b"x")?;
        fs::write(temp_dir.path().join("notes.txt"), b"x")?;
        fs::write(temp_dir.path().join("cached.txt"), b"x")?;

        let options = WalkOptions {
            exclude_patterns: vec!["*.tmp".to_string(), "cache".to_string()],
            ..WalkOptions::default()
        };
        let files = walk_directory(temp_dir.path(), &options)?;
        assert_eq!(
            relative(&files, temp_dir.path()),
            vec![PathBuf::from("cached.txt"), PathBuf::from("notes.txt")]
        );

        Ok(())
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let options = WalkOptions {
            exclude_patterns: vec!["[unclosed".to_string()],
            ..WalkOptions::default()
        };
        let err = walk_directory(Path::new("."), &options).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_shallow_lister_skips_nested() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("nested"))?;
        fs::write(temp_dir.path().join("top.zip"), b"zip")?;
        fs::write(temp_dir.path().join("nested/inner.zip"), b"zip")?;

        let listed = WalkDirLister::shallow().list(temp_dir.path())?;
        assert_eq!(listed, vec![temp_dir.path().join("top.zip")]);

        Ok(())
    }

    #[test]
    fn test_missing_directory_errors() {
        let lister = WalkDirLister::default();
        assert!(lister.list(Path::new("/nonexistent/zipvault-source")).is_err());
    }

    #[test]
    #[cfg(unix)]
    fn test_broken_symlink_skipped() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("real.txt"), b"data")?;
        std::os::unix::fs::symlink(temp_dir.path().join("gone"), temp_dir.path().join("dangling"))?;

        let files = walk_directory(temp_dir.path(), &WalkOptions::default())?;
        assert_eq!(relative(&files, temp_dir.path()), vec![PathBuf::from("real.txt")]);

        Ok(())
    }
}

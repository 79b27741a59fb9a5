//! File metadata handling for backup operations.
//!
//! Metadata (size, permissions, mtime, ownership) is captured when a file is
//! archived and re-applied when it is restored. Ownership lookup and metadata
//! application sit behind the [`OwnershipReader`] and [`PermissionPreserver`]
//! traits so platforms without POSIX ownership get a best-effort path.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Owning user and group of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

/// Reads ownership from platform metadata.
pub trait OwnershipReader {
    fn owner(&self, metadata: &fs::Metadata) -> Option<Ownership>;
}

/// Ownership from the host file system (uid/gid on unix, nothing elsewhere)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOwnership;

impl OwnershipReader for SystemOwnership {
    #[cfg(unix)]
    fn owner(&self, metadata: &fs::Metadata) -> Option<Ownership> {
        use std::os::unix::fs::MetadataExt;
        Some(Ownership {
            uid: metadata.uid(),
            gid: metadata.gid(),
        })
    }

    #[cfg(not(unix))]
    fn owner(&self, _metadata: &fs::Metadata) -> Option<Ownership> {
        None
    }
}

/// Never reports ownership
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOwnership;

impl OwnershipReader for NoOwnership {
    fn owner(&self, _metadata: &fs::Metadata) -> Option<Ownership> {
        None
    }
}

/// File metadata recorded for every archived file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,

    /// Last modified time (seconds since Unix epoch)
    pub modified: u64,

    /// File permissions (Unix mode bits)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Ownership>,
}

impl FileMetadata {
    /// Extract metadata from a file path, following symlinks
    pub fn stat(path: &Path, ownership: &dyn OwnershipReader) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;

        let modified = metadata
            .modified()?
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        #[cfg(unix)]
        let permissions = {
            use std::os::unix::fs::PermissionsExt;
            Some(metadata.permissions().mode() & 0o7777)
        };

        #[cfg(not(unix))]
        let permissions = None;

        Ok(Self {
            size: metadata.len(),
            modified,
            permissions,
            owner: ownership.owner(&metadata),
        })
    }

    pub fn modified_time(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(self.modified)
    }
}

/// Re-applies recorded metadata to a restored file.
pub trait PermissionPreserver {
    fn apply(&self, path: &Path, metadata: &FileMetadata) -> std::io::Result<()>;
}

/// Applies mtime, ownership (best effort) and mode through the file system
#[derive(Debug, Clone, Copy, Default)]
pub struct FsPermissionPreserver;

impl PermissionPreserver for FsPermissionPreserver {
    fn apply(&self, path: &Path, metadata: &FileMetadata) -> std::io::Result<()> {
        // mtime goes first, the recorded mode may drop write access
        let file = fs::OpenOptions::new().write(true).open(path)?;
        file.set_modified(metadata.modified_time())?;
        drop(file);

        apply_owner_and_mode(path, metadata)
    }
}

#[cfg(unix)]
fn apply_owner_and_mode(path: &Path, metadata: &FileMetadata) -> std::io::Result<()> {
    use nix::unistd::{chown, Gid, Uid};
    use std::os::unix::fs::PermissionsExt;

    // chown before chmod: a successful chown clears setuid/setgid bits
    if let Some(owner) = metadata.owner {
        if let Err(e) = chown(
            path,
            Some(Uid::from_raw(owner.uid)),
            Some(Gid::from_raw(owner.gid)),
        ) {
            tracing::debug!("Keeping current owner of {}: {}", path.display(), e);
        }
    }

    if let Some(mode) = metadata.permissions {
        fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))?;
    }

    Ok(())
}

#[cfg(not(unix))]
fn apply_owner_and_mode(path: &Path, metadata: &FileMetadata) -> std::io::Result<()> {
    // Only the read-only bit maps onto non-unix permissions
    if let Some(mode) = metadata.permissions {
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_readonly(mode & 0o222 == 0);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

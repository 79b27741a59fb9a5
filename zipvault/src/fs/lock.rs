//! Advisory lock serialising backup, restore and cleanup per destination.

use crate::utils::errors::{BackupError, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

pub const LOCK_FILE: &str = ".zipvault.lock";

/// Exclusive lock on `<destination>/.zipvault.lock`, released on drop.
#[derive(Debug)]
pub struct DestinationLock {
    path: PathBuf,
    #[cfg(unix)]
    _guard: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _guard: File,
}

impl DestinationLock {
    /// Take the lock without waiting; fails if another process holds it.
    pub fn acquire(destination: &Path) -> Result<Self> {
        let path = destination.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| BackupError::lock(destination, e))?;

        #[cfg(unix)]
        let guard = {
            use nix::fcntl::{Flock, FlockArg};
            Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_, errno)| {
                BackupError::lock(destination, format!("another run holds {} ({})", LOCK_FILE, errno))
            })?
        };

        #[cfg(not(unix))]
        let guard = file;

        tracing::debug!("Acquired lock {}", path.display());
        Ok(Self { path, _guard: guard })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DestinationLock {
    fn drop(&mut self) {
        tracing::debug!("Released lock {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    #[cfg(unix)]
    fn test_second_lock_fails_while_held() -> anyhow::Result<()> {
        let dir = TempDir::new()?;

        let first = DestinationLock::acquire(dir.path())?;
        let err = DestinationLock::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, BackupError::Lock { .. }));

        drop(first);
        DestinationLock::acquire(dir.path())?;

        Ok(())
    }

    #[test]
    fn test_lock_file_created() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let lock = DestinationLock::acquire(dir.path())?;
        assert!(lock.path().exists());
        Ok(())
    }

    #[test]
    fn test_missing_destination_is_lock_error() {
        let err = DestinationLock::acquire(Path::new("/nonexistent/zipvault-dest")).unwrap_err();
        assert!(matches!(err, BackupError::Lock { .. }));
    }
}

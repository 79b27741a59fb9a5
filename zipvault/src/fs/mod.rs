//! File system capabilities consumed by the backup core.

pub mod changes;
pub mod lock;
pub mod metadata;
pub mod walker;

pub use changes::ChangeDetector;
pub use lock::DestinationLock;
pub use metadata::{FileMetadata, OwnershipReader, PermissionPreserver};
pub use walker::{DirectoryLister, WalkDirLister};

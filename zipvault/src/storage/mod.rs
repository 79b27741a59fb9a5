//! Backup records, archive catalog and retention.

pub mod catalog;
pub mod metadata;
pub mod retention;

pub use catalog::{BackupCatalog, CatalogEntry};
pub use metadata::{BackupRecord, MetadataStore};
pub use retention::{CleanupReport, RetentionManager};

//! Zipvault Library
//!
//! Zip-based backup and restore of directory trees with incremental
//! archives, a per-destination record index and age-based retention.

pub mod archive;
pub mod backup;
pub mod config;
pub mod fs;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use backup::BackupOrchestrator;
pub use config::Config;
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;

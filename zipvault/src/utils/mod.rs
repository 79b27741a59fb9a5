//! Utility modules for zipvault.

pub mod errors;
pub mod logger;
pub mod progress;

pub use errors::{BackupError, Result};

//! Configuration management for zipvault.
//!
//! Loads configuration from a YAML file (TOML or JSON when the extension says
//! so) with `ZIPVAULT_` environment variable overrides, e.g.
//! `ZIPVAULT_RETENTION_DAYS=3` or `ZIPVAULT_ARCHIVE__COMPRESSION=zstd`.

use crate::fs::walker::compile_patterns;
use crate::utils::errors::{BackupError, Result};
use ::config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Archives older than this many days are deleted after each backup
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub walk: WalkConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Compression method for archive entries
    #[serde(default)]
    pub compression: Compression,

    /// Compression level (method specific, None = library default)
    #[serde(default)]
    pub compression_level: Option<i64>,

    /// How entry names are derived from source paths
    #[serde(default)]
    pub entry_naming: EntryNaming,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkConfig {
    /// Follow symbolic links while listing the source tree
    #[serde(default)]
    pub follow_links: bool,

    /// Glob patterns matched against file and directory names; matches are skipped
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Stored,
    #[default]
    Deflate,
    Zstd,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryNaming {
    /// Path relative to the backed-up root, directory structure preserved
    #[default]
    Relative,
    /// Base name only; files sharing a base name collapse into one entry
    Flat,
}

// Default values
fn default_retention_days() -> u32 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
            compression_level: None,
            entry_naming: EntryNaming::default(),
        }
    }
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            follow_links: false,
            exclude_patterns: Vec::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            archive: ArchiveConfig::default(),
            walk: WalkConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file plus environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let format = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Yaml,
        };

        let config: Config = ::config::Config::builder()
            .add_source(File::from(path).format(format))
            .add_source(
                Environment::with_prefix("ZIPVAULT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|built| built.try_deserialize())
            .map_err(|e| BackupError::config(path, e))?;

        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.retention_days == 0 {
            return Err(BackupError::config(path, "retention_days must be at least 1"));
        }
        compile_patterns(&self.walk.exclude_patterns).map_err(|e| BackupError::config(path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_yaml() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.yaml");
        fs::write(&path, "retention_days: 7\n")?;

        let config = Config::from_file(&path)?;
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.archive.compression, Compression::Deflate);
        assert_eq!(config.archive.entry_naming, EntryNaming::Relative);
        assert!(config.walk.exclude_patterns.is_empty());
        assert_eq!(config.log.level, "info");

        Ok(())
    }

    #[test]
    fn test_load_full_yaml() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.yml");
        fs::write(
            &path,
            "retention_days: 3\n\
             archive:\n  compression: zstd\n  compression_level: 5\n  entry_naming: flat\n\
             walk:\n  exclude_patterns: [\".git\"]\n\
             log:\n  level: debug\n",
        )?;

        let config = Config::from_file(&path)?;
        assert_eq!(config.retention_days, 3);
        assert_eq!(config.archive.compression, Compression::Zstd);
        assert_eq!(config.archive.compression_level, Some(5));
        assert_eq!(config.archive.entry_naming, EntryNaming::Flat);
        assert_eq!(config.walk.exclude_patterns, vec![".git".to_string()]);
        assert_eq!(config.log.level, "debug");

        Ok(())
    }

    #[test]
    fn test_load_toml_by_extension() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.toml");
        fs::write(&path, "retention_days = 14\n")?;

        let config = Config::from_file(&path)?;
        assert_eq!(config.retention_days, 14);

        Ok(())
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::from_file(Path::new("/nonexistent/zipvault.yaml")).unwrap_err();
        assert!(matches!(err, BackupError::ConfigLoad { .. }));
    }

    #[test]
    fn test_zero_retention_rejected() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.yaml");
        fs::write(&path, "retention_days: 0\n")?;

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, BackupError::ConfigLoad { .. }));

        Ok(())
    }

    #[test]
    fn test_malformed_exclude_glob_rejected() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.yaml");
        fs::write(&path, "walk:\n  exclude_patterns: [\"[oops\"]\n")?;

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, BackupError::ConfigLoad { .. }));

        Ok(())
    }
}

//! Zipvault - Main entry point
//!
//! Backs up a directory into timestamped zip archives and restores the latest one.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use zipvault::{utils, BackupOrchestrator};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    config: PathBuf,

    /// Directory to back up
    #[arg(short, long, required_unless_present_any = ["latest", "cleanup"])]
    source: Option<PathBuf>,

    /// Directory holding the archives
    #[arg(short, long)]
    destination: PathBuf,

    /// Only archive files that were not listed in the previous backup
    #[arg(short, long, conflicts_with_all = ["restore", "latest", "cleanup"])]
    incremental: bool,

    /// Restore the most recent archive into the destination
    #[arg(short, long, conflicts_with_all = ["latest", "cleanup"])]
    restore: bool,

    /// Print the most recent backup of the destination
    #[arg(long, conflicts_with = "cleanup")]
    latest: bool,

    /// Only apply the retention policy
    #[arg(long)]
    cleanup: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let orchestrator = BackupOrchestrator::from_config_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    // Initialize logging
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&orchestrator.config().log.level);
    utils::logger::init(log_level)?;

    tracing::debug!("Starting zipvault v{}", env!("CARGO_PKG_VERSION"));

    let destination = &args.destination;

    if args.latest {
        let record = orchestrator
            .latest_version(destination)
            .with_context(|| format!("Failed to read backups in {}", destination.display()))?;
        println!("{}", record);
        return Ok(());
    }

    if args.cleanup {
        let report = orchestrator
            .cleanup(destination)
            .with_context(|| format!("Cleanup of {} failed", destination.display()))?;
        tracing::info!(
            "Examined {} archives, removed {}",
            report.examined,
            report.removed.len()
        );
        return Ok(());
    }

    // clap guarantees a source for the remaining modes
    let source = args.source.context("--source is required")?;

    if args.restore {
        orchestrator
            .restore(&source, destination)
            .with_context(|| format!("Restore into {} failed", destination.display()))?;
    } else {
        let outcome = orchestrator
            .backup(&source, destination, args.incremental)
            .with_context(|| format!("Backup of {} failed", source.display()))?;
        tracing::info!("Backup complete: {}", outcome.record);
    }

    Ok(())
}

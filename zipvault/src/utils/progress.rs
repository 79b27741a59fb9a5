//! Running totals for archive and restore passes.
//!
//! The writer and reader feed every processed entry through a
//! [`ProgressTracker`]; the final figures end up in the operation summary
//! and the completion log line.

use std::time::{Duration, Instant};

/// Counters for one archive or extraction pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressCounters {
    /// Number of files processed
    pub files: usize,

    /// Bytes processed so far
    pub bytes: u64,

    /// Last file processed
    pub current_file: Option<String>,
}

/// Progress tracker with elapsed-time based throughput
pub struct ProgressTracker {
    start_time: Instant,
    counters: ProgressCounters,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            counters: ProgressCounters::default(),
        }
    }

    /// Record one finished file
    pub fn record_file(&mut self, name: &str, bytes: u64) {
        self.counters.files += 1;
        self.counters.bytes += bytes;
        self.counters.current_file = Some(name.to_string());
        tracing::debug!("{} ({})", name, format_bytes(bytes));
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average throughput since start, in bytes per second
    pub fn average_speed(&self) -> u64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.counters.bytes as f64 / elapsed) as u64
        } else {
            0
        }
    }

    pub fn counters(&self) -> &ProgressCounters {
        &self.counters
    }

    /// One-line summary: `3 files, 1.50 KB in 0s (12.00 KB/s)`
    pub fn summary(&self) -> String {
        format!(
            "{} files, {} in {} ({})",
            self.counters.files,
            format_bytes(self.counters.bytes),
            format_duration(self.elapsed().as_secs()),
            format_speed(self.average_speed()),
        )
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

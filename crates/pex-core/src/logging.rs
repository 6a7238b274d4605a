//! File logging for debugging a running session.
//!
//! The terminal belongs to the UI, so logs only go to a file and only when
//! one is requested.

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Installs a global subscriber appending to `path`.
///
/// The filter comes from `RUST_LOG`, defaulting to `debug`. Keep the returned
/// guard alive for the rest of the program; dropping it flushes the writer.
pub fn init(path: &Path) -> Result<WorkerGuard> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {e}"))?;

    Ok(guard)
}

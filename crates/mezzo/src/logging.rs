//! Logging initialization
//!
//! JSON records go to hourly-rotated files under the configured
//! directory, keeping a week of history; a compact layer mirrors to
//! stdout for interactive runs.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mezzo_config::LogLevel;

/// Hourly files for seven days.
const MAX_LOG_FILES: usize = 7 * 24;

/// Install the global subscriber. The returned guard must live as long
/// as the process; dropping it stops the background log writer.
pub fn init(log_dir: &str, level: LogLevel) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {log_dir}"))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::HOURLY)
        .filename_prefix("mezzo")
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(log_dir)
        .context("failed to create rolling log appender")?;

    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_new(level.as_str())
        .or_else(|_| EnvFilter::try_new("info"))
        .context("invalid log level")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(file_writer))
        .with(fmt::layer().with_target(true))
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_dir,
        "logger initialized"
    );

    Ok(guard)
}

//! Logging setup: console plus daily-rolling files.
//!
//! Operators mostly watch the console; the rolling files under the platform
//! data directory are what gets attached to a problem report after the fact.
//! A separate `error.*.log` keeps warnings and errors greppable on their own.

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

const MAX_LOG_FILES: usize = 10;

/// Platform log directory, created on first use.
///
/// Linux: `~/.local/share/ingot/logs`, macOS: `~/Library/Application
/// Support/ingot/logs`, Windows: `%APPDATA%/ingot/logs`.
pub fn log_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("could not determine platform data directory")?;
    let dir = base.join("ingot").join("logs");
    if !dir.exists() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("could not create log directory {}", dir.display()))?;
    }
    Ok(dir)
}

fn rolling(prefix: &str, dir: &Path) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(dir)
        .with_context(|| format!("could not create {prefix} file appender"))
}

/// Installs the global subscriber: pretty console output, a full rolling
/// file, and a warn-and-above rolling file. `RUST_LOG` overrides the
/// default `info` filter.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a file
/// appender cannot be built. Calling this twice panics, so call it once
/// from `main`.
pub fn init() -> Result<()> {
    let dir = log_dir()?;

    let all_logs = rolling("ingot", &dir)?;
    let error_logs = rolling("error", &dir)?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("could not build env filter")?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .pretty();

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_ansi(false)
        .with_writer(all_logs);

    let error_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_ansi(false)
        .with_writer(error_logs)
        .with_filter(EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .with(error_layer)
        .init();

    tracing::debug!(directory = %dir.display(), "logging initialized");

    Ok(())
}

//! Logging infrastructure for clickscope
//!
//! Logs go to the XDG state directory, one file per UTC day:
//! `~/.local/state/clickscope/clickscope.log.YYYY-MM-DD`. At most
//! `logging.max_files` days are kept. Nothing is written to stdout so report
//! output stays clean.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use chrono::{NaiveDate, Utc};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Prefix of every log file; the appender adds `.YYYY-MM-DD`.
pub const LOG_FILE_PREFIX: &str = "clickscope.log";

/// Initialize the logging system
///
/// The level comes from `config.level` unless `RUST_LOG` is set. If another
/// subscriber is already installed, the file layer is not added but the
/// returned guard is still valid.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_dir = Config::log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(appender(&log_dir, config)?);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init();

    tracing::info!(
        log_file = %current_log_file().display(),
        level = %config.level,
        max_files = config.max_files,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

fn appender(log_dir: &Path, config: &LoggingConfig) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(config.max_files.max(1))
        .build(log_dir)
        .map_err(|e| Error::Config(format!("failed to create log file appender: {}", e)))
}

/// Initialize logging for tests (logs to the test writer)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Keeps the background log writer alive; pending lines are flushed on drop.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Log file written on `day`.
pub fn log_file_for(day: NaiveDate) -> PathBuf {
    Config::log_dir().join(format!("{}.{}", LOG_FILE_PREFIX, day.format("%Y-%m-%d")))
}

/// Log file being written today (UTC).
pub fn current_log_file() -> PathBuf {
    log_file_for(Utc::now().date_naive())
}

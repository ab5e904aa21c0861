//! Structured logging setup using `tracing-subscriber` and `tracing-appender`.
//!
//! Two sinks:
//! - **stderr** (default): human-readable console output
//! - **file** (`--log:file`): JSON lines with daily rotation into
//!   `<file>.YYYY-MM-DD`, keeping `--log:age` files; with `--log:no-rotate`
//!   lines are appended to the file itself
//!
//! `RUST_LOG` overrides the configured level when set. There is no
//! `fatal` level in `tracing`; fatal events are `error!` events carrying
//! `fatal = true`.

use std::path::Path;

use anyhow::Context;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Holds the non-blocking writer guard for file logging.
///
/// Dropping it flushes pending log entries and closes the file, so it must
/// live until the process exits.
pub struct LoggingGuard {
    _guard: Option<WorkerGuard>,
}

/// Parse a level name; `fatal` maps to `error`.
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" => Some(LevelFilter::INFO),
        "warn" | "warning" => Some(LevelFilter::WARN),
        "error" | "fatal" => Some(LevelFilter::ERROR),
        _ => None,
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error for an unknown level, if the log file cannot be opened,
/// or if a global subscriber is already installed.
pub fn init(settings: &LoggingSettings) -> anyhow::Result<LoggingGuard> {
    let level = parse_level(&settings.level)
        .with_context(|| format!("unknown log level '{}'", settings.level))?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    match &settings.file {
        Some(path) => {
            let appender = file_appender(path, settings.age, settings.rotate)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .try_init()
                .context("failed to install log subscriber")?;
            Ok(LoggingGuard {
                _guard: Some(guard),
            })
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .context("failed to install log subscriber")?;
            Ok(LoggingGuard { _guard: None })
        }
    }
}

/// Appender for `path`: daily files `<file>.YYYY-MM-DD` when rotating,
/// otherwise `path` itself.
fn file_appender(path: &Path, age: usize, rotate: bool) -> anyhow::Result<RollingFileAppender> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = path
        .file_name()
        .with_context(|| format!("log file {} has no file name", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;

    let builder = RollingFileAppender::builder().filename_prefix(prefix.to_string_lossy());
    let builder = if rotate {
        builder.rotation(Rotation::DAILY).max_log_files(age.max(1))
    } else {
        builder.rotation(Rotation::NEVER)
    };
    builder
        .build(dir)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

//! Logging setup built on `tracing-subscriber`.
//!
//! The engine logs through `tracing` macros only; binaries call
//! [`init_logging`] once at startup. Output goes to stderr and, optionally,
//! to a log file written by a non-blocking background writer.

use std::fs;
use std::path::{Path, PathBuf};

use time::macros::format_description;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Logging options.
#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset (e.g. "info").
    pub level: Option<String>,
    /// Optional file receiving a copy of all log output.
    pub file: Option<PathBuf>,
}

/// Keeps the file writer alive; dropping it flushes pending log lines.
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Returns an error if a
/// global subscriber is already installed or the log file cannot be created.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuard, Box<dyn std::error::Error>> {
    let level = config.level.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    let timer = LocalTime::new(format_description!(
        "[hour]:[minute]:[second].[subsecond digits:3]"
    ));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer.clone())
        .with_target(false);

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(open_log_file(path)?);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_timer(timer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(LoggingGuard { _file: guard })
}

fn open_log_file(path: &Path) -> std::io::Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::OpenOptions::new().create(true).append(true).open(path)
}

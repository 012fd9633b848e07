//! Logging setup for the lectern binary.
//!
//! Console output goes to stderr. With file logging enabled, the same
//! events are also written to a daily rolling file under `<cache>/logs`.
//! Use the `RUST_LOG` env var to control the level (e.g. `RUST_LOG=debug`).

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directory under the cache dir that holds log files
pub const LOG_DIR: &str = "logs";

/// Prefix of the daily log files
const LOG_FILE_PREFIX: &str = "lectern.log";

/// Keeps the background log writer alive.
///
/// Dropping this guard flushes and closes the log file.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the tracing subscriber.
///
/// `default_level` applies when `RUST_LOG` is unset. When `log_root` is
/// given, logs are also written under `log_root/logs`.
pub fn init_tracing(default_level: &str, log_root: Option<&Path>) -> io::Result<LoggingGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let console_layer = fmt::layer().with_writer(io::stderr);

    let (file_layer, file_guard) = match log_root {
        Some(root) => {
            let dir = root.join(LOG_DIR);
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

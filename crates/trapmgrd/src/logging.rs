//! Log setup for trapmgrd.
//!
//! Every invocation appends to `<log_dir>/trapmgrd.log`. Writes go through a
//! mutex-guarded file handle so lines from concurrent workers never
//! interleave. Thread ids and names identify the worker on every line.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log file name inside the log directory.
pub const LOG_FILE_NAME: &str = "trapmgrd.log";

/// Default level when `RUST_LOG` is not set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub fn log_file_path(log_dir: &Path) -> PathBuf {
    log_dir.join(LOG_FILE_NAME)
}

/// Opens the log file for appending, creating the directory if needed.
pub fn open_log_file(log_dir: &Path) -> io::Result<File> {
    fs::create_dir_all(log_dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path(log_dir))
}

/// Installs the global subscriber.
///
/// Returns the log file path, or `None` when the log directory is unusable
/// and logging fell back to stderr.
pub fn init_logging(log_dir: &Path) -> Option<PathBuf> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    match open_log_file(log_dir) {
        Ok(file) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false)
                        .with_target(false)
                        .with_thread_ids(true)
                        .with_thread_names(true),
                )
                .init();
            Some(log_file_path(log_dir))
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(io::stderr)
                        .with_target(false)
                        .with_thread_ids(true)
                        .with_thread_names(true),
                )
                .init();
            tracing::warn!(
                log_dir = %log_dir.display(),
                error = %e,
                "Log directory unusable, logging to stderr"
            );
            None
        }
    }
}

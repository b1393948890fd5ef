//! # Local Logger
//!
//! A `tracing-subscriber` registry with an [`EnvFilter`], a stdout layer and,
//! when a log directory is configured, a non-blocking file layer. `RUST_LOG`
//! wins over the configured level.
//!
//! Log files are named `<app>_<YYYY-mm-dd_HH-MM-SS>.log`. Before a new one is
//! opened, older files of the same application are pruned so that only the
//! newest `keep_files` remain.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Failure to set up logging.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log directory could not be created or read.
    #[error("log directory {path}: {source}")]
    Io {
        /// The log directory.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The level is not a valid filter directive.
    #[error("invalid log filter '{filter}': {message}")]
    Filter {
        /// The rejected directive.
        filter: String,
        /// Parser message.
        message: String,
    },

    /// Logging was already set up in this process.
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Where and how the daemon logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogOptions {
    /// Prefix of the log file names.
    pub app_name: String,
    /// Filter directive used when `RUST_LOG` is not set, e.g. `info` or
    /// `notice_core=debug,info`.
    pub level: String,
    /// Where log files go. `None` logs to stdout only.
    pub log_dir: Option<PathBuf>,
    /// Older log files kept next to the new one.
    pub keep_files: usize,
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            app_name: "notice".to_string(),
            level: "info".to_string(),
            log_dir: None,
            keep_files: 1,
            json: false,
        }
    }
}

/// Installs the global subscriber. The returned guard flushes the file
/// writer on drop and must be held for as long as logging is wanted.
pub fn init_logging(options: &LogOptions) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&options.level).map_err(|e| LoggingError::Filter {
            filter: options.level.clone(),
            message: e.to_string(),
        })?,
    };

    let (file_writer, guard) = match &options.log_dir {
        Some(dir) => {
            let io_err = |source: io::Error| LoggingError::Io { path: dir.clone(), source };
            fs::create_dir_all(dir).map_err(io_err)?;
            prune_old_logs(dir, &options.app_name, options.keep_files).map_err(io_err)?;
            let file_name = format!("{}_{}.log", options.app_name, Local::now().format("%Y-%m-%d_%H-%M-%S"));
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let json = options.json;
    let stdout_text = (!json).then(fmt::layer);
    let stdout_json = json.then(|| fmt::layer().json());
    let file_layer = file_writer.map(|writer| fmt::layer().with_ansi(false).with_writer(writer));

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_text)
        .with(stdout_json)
        .with(file_layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    Ok(guard)
}

/// Deletes all but the newest `keep` log files of `app_name` in `dir`.
/// Returns how many were deleted.
pub fn prune_old_logs(dir: &Path, app_name: &str, keep: usize) -> io::Result<usize> {
    let prefix = format!("{}_", app_name);
    let mut logs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            name.starts_with(&prefix) && name.ends_with(".log")
        })
        .collect();

    // Names embed the timestamp, so name order is age order. Newest first.
    logs.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

    let mut removed = 0;
    for old in logs.iter().skip(keep) {
        match fs::remove_file(old) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Failed to delete old log file {}: {}", old.display(), e),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn test_prune_keeps_newest_of_same_app() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "notice_2026-01-01_00-00-00.log");
        touch(dir.path(), "notice_2026-03-01_00-00-00.log");
        touch(dir.path(), "notice_2026-02-01_00-00-00.log");
        touch(dir.path(), "other_2020-01-01_00-00-00.log");
        touch(dir.path(), "notice.conf");

        assert_eq!(prune_old_logs(dir.path(), "notice", 1).unwrap(), 2);
        assert!(dir.path().join("notice_2026-03-01_00-00-00.log").exists());
        assert!(!dir.path().join("notice_2026-01-01_00-00-00.log").exists());
        assert!(dir.path().join("other_2020-01-01_00-00-00.log").exists());
        assert!(dir.path().join("notice.conf").exists());
    }

    #[test]
    fn test_init_twice_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let options = LogOptions {
            log_dir: Some(dir.path().join("logs")),
            ..Default::default()
        };
        let guard = init_logging(&options).unwrap();
        assert!(guard.is_some());
        tracing::info!("logging initialised");

        assert!(matches!(init_logging(&LogOptions::default()), Err(LoggingError::AlreadyInitialized)));
    }
}

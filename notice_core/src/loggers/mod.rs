//! # Logging Setup
//!
//! Installs the process-wide `tracing` subscriber used by the daemon and
//! keeps the log directory tidy.

/// Subscriber construction and log-file housekeeping.
pub mod loggerlocal;

pub use loggerlocal::{init_logging, prune_old_logs, LogOptions, LoggingError};

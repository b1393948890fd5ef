//! # Performance Subsystem
//!
//! Only two facts are needed from the performance subsystem: how long one
//! sweep takes, and the number of the image it last published. The
//! convergence wait polls the latter until it moves.

use thiserror::Error;

/// Failure to read from the performance subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PerfError {
    /// Not reachable or not running.
    #[error("performance subsystem unavailable: {0}")]
    Unavailable(String),

    /// The group has no published images.
    #[error("unknown performance group '{0}'")]
    UnknownGroup(String),
}

/// The performance subsystem as seen by the convergence wait.
pub trait PerformanceMonitor: Send + Sync {
    /// Length of one sweep, in seconds.
    fn sweep_interval_secs(&self) -> Result<u32, PerfError>;

    /// Number of the latest image published for `group`.
    fn image_number(&self, group: &str) -> Result<u64, PerfError>;
}

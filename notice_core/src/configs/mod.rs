//! # Configuration Modules
//!
//! Settings of the notice pipeline, loaded from JSON5 files.

/// Pipeline settings and their loader.
pub mod config_notice;

pub use config_notice::{ConfigError, NoticeConfig};

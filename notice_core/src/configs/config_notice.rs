//! # Notice Pipeline Configuration
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration:
//!
//! ```json5
//! {
//!   perfGroup: "All",
//!   pollIntervalMs: 200,
//!   sweepFactorPercent: 110,
//!   inflightReclaimSecs: null,     // stale INFLIGHT re-claim off
//!   maxPendingEvents: null,        // unbounded dispatcher queue
//!   fabricEndpoint: { host: "fm0", port: 3245 },
//!   severityOverrides: { linkIntegrity: "CRITICAL" },
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingestors::context_resolver::FabricEndpoint;
use crate::ingestors::convergence::ConvergenceSettings;
use crate::ingestors::notice_job::NoticeJobSettings;
use crate::model::event::{EventCategory, Severity};

/// Failure to load or validate a [`NoticeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid JSON5 for this shape.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// # Notice Config
///
/// Settings shared by every domain pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NoticeConfig {
    /// Performance group whose image number signals convergence.
    pub perf_group: String,
    /// Milliseconds between convergence polls.
    pub poll_interval_ms: u64,
    /// Convergence budget as a percentage of one sweep interval.
    pub sweep_factor_percent: u32,
    /// Re-claim notices `Inflight` for longer than this. Off when unset.
    pub inflight_reclaim_secs: Option<u64>,
    /// Dispatcher queue bound. Unbounded when unset.
    pub max_pending_events: Option<usize>,
    /// Source of FE connection traps.
    pub fabric_endpoint: Option<FabricEndpoint>,
    /// Per-category severity overrides.
    pub severity_overrides: HashMap<EventCategory, Severity>,
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            perf_group: "All".to_string(),
            poll_interval_ms: 200,
            sweep_factor_percent: 110,
            inflight_reclaim_secs: None,
            max_pending_events: None,
            fabric_endpoint: None,
            severity_overrides: HashMap::new(),
        }
    }
}

impl NoticeConfig {
    /// Reads and validates a JSON5 file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: NoticeConfig = json5::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("pollIntervalMs must be greater than 0".into()));
        }
        if self.sweep_factor_percent < 100 {
            return Err(ConfigError::Invalid(format!(
                "sweepFactorPercent must be at least 100, got {}",
                self.sweep_factor_percent
            )));
        }
        if self.max_pending_events == Some(0) {
            return Err(ConfigError::Invalid("maxPendingEvents must be greater than 0".into()));
        }
        if self.perf_group.trim().is_empty() {
            return Err(ConfigError::Invalid("perfGroup must not be empty".into()));
        }
        Ok(())
    }

    /// The processing job settings these values describe.
    pub fn job_settings(&self) -> NoticeJobSettings {
        NoticeJobSettings {
            convergence: ConvergenceSettings {
                group: self.perf_group.clone(),
                poll_interval: Duration::from_millis(self.poll_interval_ms),
                factor_percent: self.sweep_factor_percent,
            },
            inflight_reclaim: self.inflight_reclaim_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_object_yields_defaults() {
        let file = write("{}");
        let config = NoticeConfig::load(file.path()).unwrap();
        assert_eq!(config, NoticeConfig::default());
        let settings = config.job_settings();
        assert_eq!(settings.convergence.max_polls(2), 11);
        assert_eq!(settings.inflight_reclaim, None);
    }

    #[test]
    fn test_json5_with_comments_and_overrides() {
        let file = write(
            r#"{
                // shorter polls
                pollIntervalMs: 100,
                inflightReclaimSecs: 600,
                maxPendingEvents: 1000,
                fabricEndpoint: { host: "fm0", port: 3245 },
                severityOverrides: { linkIntegrity: "CRITICAL" },
            }"#,
        );
        let config = NoticeConfig::load(file.path()).unwrap();
        assert_eq!(config.poll_interval_ms, 100);
        assert_eq!(config.max_pending_events, Some(1000));
        assert_eq!(config.fabric_endpoint, Some(FabricEndpoint { host: "fm0".into(), port: 3245 }));
        assert_eq!(config.severity_overrides.get(&EventCategory::LinkIntegrity), Some(&Severity::Critical));
        assert_eq!(config.job_settings().inflight_reclaim, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let file = write("{ sweepFactorPercent: 90 }");
        assert!(matches!(NoticeConfig::load(file.path()), Err(ConfigError::Invalid(_))));

        let file = write("{ maxPendingEvents: 0 }");
        assert!(matches!(NoticeConfig::load(file.path()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let missing = NoticeConfig::load("/definitely/not/here.json5");
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let file = write("{ pollIntervalMs: ");
        assert!(matches!(NoticeConfig::load(file.path()), Err(ConfigError::Parse { .. })));
    }
}

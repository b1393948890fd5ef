use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Fabric notice processing daemon", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "NOTICE_CONFIG_PATH", help = "Path to the JSON server configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "NOTICE_PIPELINE_CONFIG", help = "Path to the JSON5 pipeline configuration file.")]
    pub pipeline_config: Option<PathBuf>,

    #[clap(long, env = "NOTICE_FIXTURE", help = "Path to the JSON fabric fixture (domains, topology, notices).")]
    pub fixture_path: Option<PathBuf>,

    #[clap(long, env = "NOTICE_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "NOTICE_LOG_LEVEL", help = "Logging filter used when RUST_LOG is unset (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "NOTICE_LOG_JSON", help = "Write logs as JSON lines.")]
    pub log_json: Option<bool>,

    #[clap(long, env = "NOTICE_CYCLE_INTERVAL_SECS", help = "Seconds between processing cycles per domain.")]
    pub cycle_interval_secs: Option<u64>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            pipeline_config: other.pipeline_config.or(self.pipeline_config),
            fixture_path: other.fixture_path.or(self.fixture_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            log_json: other.log_json.or(self.log_json),
            cycle_interval_secs: other.cycle_interval_secs.or(self.cycle_interval_secs),
        }
    }

    fn defaults() -> Config {
        Config {
            fixture_path: Some(PathBuf::from("fixtures/fabric.json")),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            log_json: Some(false),
            cycle_interval_secs: Some(5),
            ..Default::default()
        }
    }
}

/// Defaults, then the JSON file, then environment and CLI.
pub fn load_config() -> Config {
    merge_sources(Config::parse())
}

pub fn merge_sources(cli: Config) -> Config {
    let mut current_config = Config::defaults();

    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("server_notice.conf"));

    if config_file_path.exists() {
        match fs::read_to_string(&config_file_path) {
            Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
                Ok(file_config) => current_config = current_config.merge(file_config),
                Err(e) => eprintln!(
                    "Failed to parse config file {}: {}. Falling back to other sources.",
                    config_file_path.display(),
                    e
                ),
            },
            Err(e) => eprintln!(
                "Failed to read config file {}: {}. Falling back to other sources.",
                config_file_path.display(),
                e
            ),
        }
    }

    // clap already folded the environment into `cli`.
    current_config.merge(cli)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_apply_without_file() {
        let cli = Config {
            config_path: Some(PathBuf::from("/no/such/server_notice.conf")),
            ..Default::default()
        };
        let config = merge_sources(cli);
        assert_eq!(config.cycle_interval_secs, Some(5));
        assert_eq!(config.log_level.as_deref(), Some("info"));
    }

    #[test]
    fn test_cli_overrides_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "logLevel": "debug", "cycleIntervalSecs": 30 }}"#).unwrap();

        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            cycle_interval_secs: Some(1),
            ..Default::default()
        };
        let config = merge_sources(cli);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.cycle_interval_secs, Some(1));
        assert_eq!(config.log_dir, Some(PathBuf::from("./logs")));
    }

    #[test]
    fn test_malformed_file_is_ignored() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert_eq!(merge_sources(cli).cycle_interval_secs, Some(5));
    }

    #[test]
    fn test_cli_flags_parse() {
        let cli = Config::try_parse_from(["server_notice", "--log-level", "warn", "--cycle-interval-secs", "9"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("warn"));
        assert_eq!(cli.cycle_interval_secs, Some(9));
    }
}

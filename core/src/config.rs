use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure for Parcelflow.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub kv: KvConfig,

    #[serde(default)]
    pub coordination: CoordinationConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file is missing.
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!(
                    "Failed to load config from {:?}: {}. Using defaults.",
                    path.as_ref(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Validate the configuration for obvious misconfiguration.
    pub fn validate(&self) -> Result<()> {
        match self.stream.backend.as_str() {
            "memory" | "pravega" => {}
            other => anyhow::bail!("Invalid stream backend: {}", other),
        }

        match self.kv.backend.as_str() {
            "memory" | "pravega" => {}
            other => anyhow::bail!("Invalid kv backend: {}", other),
        }

        match self.coordination.backend.as_str() {
            "memory" | "redis" => {}
            other => anyhow::bail!("Invalid coordination backend: {}", other),
        }

        if self.pipeline.check_frequency_secs <= 0 {
            anyhow::bail!("check_frequency_secs must be positive");
        }

        if self.pipeline.sync_threshold_secs < 0 {
            anyhow::bail!("sync_threshold_secs cannot be negative");
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("Invalid log level: {}", other),
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("Failed to parse config")?;
        Ok(config)
    }
}

/// Durable stream system selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Controller endpoint for an external backend; ignored by `memory`.
    pub uri: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            uri: None,
        }
    }
}

/// Key-value table system selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KvConfig {
    #[serde(default = "default_backend")]
    pub backend: String,

    pub uri: Option<String>,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            uri: None,
        }
    }
}

/// Cross-worker coordination store selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoordinationConfig {
    #[serde(default = "default_backend")]
    pub backend: String,

    /// `host[:port]` of an external store; ignored by `memory`.
    pub server: Option<String>,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            server: None,
        }
    }
}

/// Tunables for the per-center processing pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Wall-clock milliseconds one stream read waits before probing for drain.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Simulated seconds between delayed-package checks.
    #[serde(default = "default_check_frequency")]
    pub check_frequency_secs: i64,

    /// A package must be at least this many simulated seconds overdue before
    /// it is reported delayed.
    #[serde(default = "default_minimum_late")]
    pub minimum_late_secs: i64,

    /// Simulated-clock lead over the slowest peer beyond which a worker
    /// yields to let the others catch up.
    #[serde(default = "default_sync_threshold")]
    pub sync_threshold_secs: i64,

    /// Wall-clock milliseconds to sleep when yielding.
    #[serde(default = "default_sleep_process_ms")]
    pub sleep_process_ms: u64,
}

impl PipelineConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_read_timeout_ms(),
            check_frequency_secs: default_check_frequency(),
            minimum_late_secs: default_minimum_late(),
            sync_threshold_secs: default_sync_threshold(),
            sleep_process_ms: default_sleep_process_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default providers ---------------------------------------------------------

fn default_backend() -> String {
    "memory".to_string()
}

fn default_read_timeout_ms() -> u64 {
    2000
}

fn default_check_frequency() -> i64 {
    60
}

fn default_minimum_late() -> i64 {
    60
}

fn default_sync_threshold() -> i64 {
    90
}

fn default_sleep_process_ms() -> u64 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

// Tests ---------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.stream.backend, "memory");
        assert_eq!(config.coordination.backend, "memory");
        assert_eq!(config.pipeline.read_timeout_ms, 2000);
        assert_eq!(config.pipeline.check_frequency_secs, 60);
        assert_eq!(config.pipeline.minimum_late_secs, 60);
        assert_eq!(config.pipeline.sync_threshold_secs, 90);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_backend() {
        let mut config = Config::default();
        config.stream.backend = "carrier-pigeon".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [stream]
            backend = "pravega"
            uri = "tcp://127.0.0.1:9090"

            [coordination]
            backend = "redis"
            server = "127.0.0.1:6379"

            [pipeline]
            read_timeout_ms = 500

            [logging]
            level = "debug"
        "#;

        let config = Config::from_str(toml_str).unwrap();
        assert_eq!(config.stream.backend, "pravega");
        assert_eq!(config.stream.uri.as_deref(), Some("tcp://127.0.0.1:9090"));
        assert_eq!(config.coordination.server.as_deref(), Some("127.0.0.1:6379"));
        assert_eq!(config.pipeline.read_timeout_ms, 500);
        assert_eq!(config.pipeline.minimum_late_secs, 60);
        assert_eq!(config.logging.level, "debug");
    }
}

use crate::detection::{DetectorConfig, DetectorError};
use crate::models::RiskLevel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding `input.file_path`
pub const LOG_PATH_ENV: &str = "LOG_PATH";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid detection settings: {0}")]
    Invalid(#[from] DetectorError),
}

/// Configuration for the Sentinel daemon and CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Input source configuration
    pub input: InputConfig,
    /// Detection configuration
    #[serde(default)]
    pub detection: DetectionConfig,
    /// Output configuration
    pub output: OutputConfig,
    /// Threat record storage
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Webhook alerting
    #[serde(default)]
    pub alerting: AlertConfig,
    /// Polling behaviour of the daemon
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Input source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Authentication log analysed on every run
    pub file_path: PathBuf,
}

/// Detection configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Isolation forest parameters
    #[serde(default)]
    pub anomaly: DetectorConfig,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format: "json", "jsonl", or "console"
    pub format: String,
    /// Output file path (if format is not "console")
    pub file_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub enabled: bool,
    /// SQLite database file
    pub db_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        PersistenceConfig {
            enabled: true,
            db_path: PathBuf::from("sentinel.db"),
        }
    }
}

/// Alert dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub enabled: bool,
    /// Reports at or above this level are dispatched
    pub min_level: RiskLevel,
    /// Also dispatch anomalous addresses below `min_level`
    #[serde(default = "default_true")]
    pub include_anomalies: bool,
    pub slack: Option<SlackConfig>,
    pub discord: Option<DiscordConfig>,
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        AlertConfig {
            enabled: false,
            min_level: RiskLevel::High,
            include_anomalies: true,
            slack: None,
            discord: None,
            webhooks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
    pub channel: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub webhook_url: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub name: String,
    pub url: String,
    /// "POST" (default) or "PUT"
    pub method: Option<String>,
    pub headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds between full re-analyses of the log file
    pub interval_seconds: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            interval_seconds: 60,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            input: InputConfig {
                file_path: PathBuf::from("/var/log/auth.log"),
            },
            detection: DetectionConfig::default(),
            output: OutputConfig {
                format: "jsonl".to_string(),
                file_path: Some(PathBuf::from("threats.jsonl")),
            },
            persistence: PersistenceConfig::default(),
            alerting: AlertConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file and validate it
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection.anomaly.validate()?;
        Ok(())
    }

    /// Replace the input path with `LOG_PATH` when it is set
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(LOG_PATH_ENV) {
            if !path.is_empty() {
                log::info!("Using log path from {}: {}", LOG_PATH_ENV, path);
                self.input.file_path = PathBuf::from(path);
            }
        }
    }
}

//! Configuration management for Postfan

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Runner tuning, all durations in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval: u64,
    pub batch_limit: u32,
    pub retry_delay: i64,
    pub platform_timeout: u64,
    pub max_concurrency: usize,
    /// 0 disables the stale in_progress sweep
    pub stale_after: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: 60,
            batch_limit: 10,
            retry_delay: 3600,
            platform_timeout: 30,
            max_concurrency: 8,
            stale_after: 1800,
            client: None,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.max(1))
    }

    pub fn platform_timeout(&self) -> Duration {
        Duration::from_secs(self.platform_timeout.max(1))
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file yields the default configuration.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            Self::default_config()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        if config.database.path.trim().is_empty() {
            return Err(ConfigError::MissingField("database.path".to_string()).into());
        }
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/postfan/queue.db".to_string(),
            },
            scheduler: SchedulerConfig::default(),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("POSTFAN_DB_PATH") {
            if !path.trim().is_empty() {
                self.database.path = path;
            }
        }
    }

    /// Database path with `~` expanded
    pub fn database_path(&self) -> String {
        shellexpand::tilde(&self.database.path).to_string()
    }
}

/// Resolve the configuration file path under the XDG config directory
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("POSTFAN_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("postfan").join("config.toml"))
}

//! Layered store configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{LeaderboardError, Result};

const HOME_CONFIG_DIR: &str = ".stumbler_leaderboard";
const CONFIG_FILE: &str = "db.json";
const SYSTEM_CONFIG: &str = "/etc/mozilla/stumbler_leaderboard/db.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    20
}

fn default_max_backoff_ms() -> u64 {
    1_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn for_database(path: impl Into<PathBuf>) -> Self {
        Self {
            database: DatabaseConfig {
                path: path.into(),
                busy_timeout_ms: default_busy_timeout_ms(),
            },
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Parse a single file; YAML by extension, JSON otherwise.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config = if is_yaml(path) {
            serde_yaml::from_str(&text)?
        } else {
            serde_json::from_str(&text)?
        };
        Ok(config)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = if is_yaml(path) {
            serde_yaml::to_string(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        fs::write(path, text)?;
        Ok(())
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Searches config layers in priority order; the first valid one wins.
pub struct ConfigLoader {
    layers: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new(layers: Vec<PathBuf>) -> Self {
        Self { layers }
    }

    /// User-level override first, then the system-wide default.
    pub fn standard() -> Self {
        let mut layers = Vec::new();
        if let Some(home) = std::env::var_os("HOME") {
            layers.push(PathBuf::from(home).join(HOME_CONFIG_DIR).join(CONFIG_FILE));
        }
        layers.push(PathBuf::from(SYSTEM_CONFIG));
        Self { layers }
    }

    pub fn with_override(mut self, path: impl Into<PathBuf>) -> Self {
        self.layers.insert(0, path.into());
        self
    }

    pub fn layers(&self) -> &[PathBuf] {
        &self.layers
    }

    pub fn load(&self) -> Result<Config> {
        for path in &self.layers {
            if !path.exists() {
                warn!(path = %path.display(), "skipping absent config layer");
                continue;
            }
            match Config::from_file(path) {
                Ok(config) => {
                    debug!(path = %path.display(), "loaded config");
                    return Ok(config);
                }
                Err(err) => warn!(path = %path.display(), error = %err, "skipping invalid config"),
            }
        }
        Err(LeaderboardError::ConfigurationMissing {
            searched: self.layers.clone(),
        })
    }
}

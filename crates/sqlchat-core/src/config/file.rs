//! File-based configuration (YAML)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;
use crate::providers::StreamPacing;
use crate::types::DatabaseConnection;

/// Base prompt used when the stored settings carry none
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an assistant that writes SQL for the \
connected database. Answer with a single SQL statement in a fenced ```sql block, \
followed by at most two sentences of explanation. Only use tables and columns \
that appear in the schema below.";

/// Errors that can occur while loading or saving configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Other(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// HTTP surface settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Top-level configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Delay between forwarded fragments, in milliseconds
    pub pacing_ms: u64,
    /// Upper bound for a provider request and for each fragment wait
    pub provider_timeout_secs: u64,
    /// Title length for a conversation created by its first utterance
    pub new_title_chars: usize,
    /// Title length once the first reply is complete
    pub final_title_chars: usize,
    pub system_prompt: String,
    pub log_level: LogLevel,
    pub server: ServerConfig,
    /// Connections seeded into the in-memory persistence collaborator
    pub connections: Vec<DatabaseConnection>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 15,
            provider_timeout_secs: 10,
            new_title_chars: 20,
            final_title_chars: 50,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            log_level: LogLevel::Info,
            server: ServerConfig::default(),
            connections: Vec::new(),
        }
    }
}

impl CoreConfig {
    /// `<config_dir>/sqlchat/config.yaml`
    pub fn default_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".config"));
        config_dir.join("sqlchat").join("config.yaml")
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: CoreConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.provider_timeout_secs == 0 {
            return Err(ConfigError::Other("provider_timeout_secs must be positive".to_string()));
        }
        if self.new_title_chars == 0 || self.final_title_chars == 0 {
            return Err(ConfigError::Other("title lengths must be positive".to_string()));
        }
        Ok(())
    }

    /// Pacing and timeout settings handed to every provider adapter
    pub fn pacing(&self) -> StreamPacing {
        StreamPacing::new(
            Duration::from_millis(self.pacing_ms),
            Duration::from_secs(self.provider_timeout_secs),
        )
    }
}

//! Configuration for the streaming core
//!
//! Read from a YAML file (`~/.config/sqlchat/config.yaml` by default);
//! every field has a default so a missing file is not an error.

mod file;

pub use file::{ConfigError, ConfigResult, CoreConfig, ServerConfig, DEFAULT_SYSTEM_PROMPT};

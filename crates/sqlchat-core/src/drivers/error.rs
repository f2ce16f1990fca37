//! Driver error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The connection record names an engine with no adapter
    #[error("Unsupported database driver: {0}")]
    UnsupportedDriver(String),

    /// Could not open a connection
    #[error("Failed to connect to {driver} at {host}: {message}")]
    Connect {
        driver: String,
        host: String,
        message: String,
    },

    /// Engine rejected or failed the statement
    #[error("{0}")]
    Query(String),

    /// Catalog queries failed
    #[error("Schema introspection failed: {0}")]
    Schema(String),
}

pub type DriverResult<T> = Result<T, DriverError>;

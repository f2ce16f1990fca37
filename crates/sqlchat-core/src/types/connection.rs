//! Database connection records

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Relational engines with a driver adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    MySql,
    PostgreSql,
    MariaDb,
}

impl DriverKind {
    /// Identifier as stored on connection records
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::MySql => "mysql",
            DriverKind::PostgreSql => "postgresql",
            DriverKind::MariaDb => "mariadb",
        }
    }

    /// Human-readable engine name
    pub fn label(&self) -> &'static str {
        match self {
            DriverKind::MySql => "MySQL",
            DriverKind::PostgreSql => "PostgreSQL",
            DriverKind::MariaDb => "MariaDB",
        }
    }

    pub fn all() -> [DriverKind; 3] {
        [DriverKind::MySql, DriverKind::PostgreSql, DriverKind::MariaDb]
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mysql" => Ok(DriverKind::MySql),
            "postgresql" | "postgres" => Ok(DriverKind::PostgreSql),
            "mariadb" => Ok(DriverKind::MariaDb),
            other => Err(other.to_string()),
        }
    }
}

/// Stored connection parameters for one database
///
/// `driver` is kept as the raw stored string so an unknown engine surfaces
/// as an unsupported-driver error at execution time rather than a
/// deserialization failure.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConnection {
    pub id: String,
    /// Project label shown to the model alongside the driver name
    #[serde(default)]
    pub project_name: String,
    pub driver: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub secret: String,
    pub database_name: String,
    #[serde(default)]
    pub cached_schema_text: String,
}

impl DatabaseConnection {
    /// Parse the stored driver name
    pub fn driver_kind(&self) -> Result<DriverKind, String> {
        self.driver.parse()
    }

    /// Short description used in prompts, e.g. `Project: shop (postgresql)`
    pub fn summary(&self) -> String {
        let label = if self.project_name.is_empty() {
            self.database_name.as_str()
        } else {
            self.project_name.as_str()
        };
        format!("Project: {} ({})", label, self.driver)
    }
}

impl std::fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConnection")
            .field("id", &self.id)
            .field("project_name", &self.project_name)
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("database_name", &self.database_name)
            .finish()
    }
}

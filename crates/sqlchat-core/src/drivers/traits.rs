//! Database driver trait definition

use async_trait::async_trait;
use futures::Stream;
use serde_json::{Map, Value};
use std::pin::Pin;

use super::error::DriverResult;
use crate::types::{DatabaseConnection, DriverKind};

/// One result row, column name → JSON value, in column order
pub type Row = Map<String, Value>;

/// Rows in engine order; ends after the last row or after the first error
pub type RowStream = Pin<Box<dyn Stream<Item = DriverResult<Row>> + Send>>;

/// Outcome of executing one statement
///
/// Callers tell a row-producing statement from DML/DDL by shape.
pub enum Execution {
    Rows(RowStream),
    Summary { affected_rows: u64 },
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Execution::Rows(_) => f.write_str("Execution::Rows(..)"),
            Execution::Summary { affected_rows } => {
                write!(f, "Execution::Summary {{ affected_rows: {} }}", affected_rows)
            }
        }
    }
}

/// One relational engine
///
/// Every call opens its own connection and closes it on every exit path:
/// after the last row, after a failure, and when the returned `RowStream`
/// is dropped early.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    fn kind(&self) -> DriverKind;

    /// Execute one statement
    async fn execute(&self, connection: &DatabaseConnection, sql: &str) -> DriverResult<Execution>;

    /// `CREATE TABLE` text for every base table, under a `-- <Engine> schema` header
    async fn introspect_schema(&self, connection: &DatabaseConnection) -> DriverResult<String>;
}

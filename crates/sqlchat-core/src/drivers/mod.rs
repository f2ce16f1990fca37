//! Database driver adapters
//!
//! One [`DatabaseDriver`] per engine. Every execution owns a fresh
//! connection inside its own task; rows flow through a bounded channel so the
//! connection is closed whether the stream completes, fails or is dropped.

mod channel;
mod error;
mod mock;
mod mysql;
mod postgres;
mod registry;
mod schema;
mod traits;

pub use error::{DriverError, DriverResult};
pub use mock::{MockDriver, MockDriverConfig, MockResult};
pub use mysql::MySqlDriver;
pub use postgres::PostgresDriver;
pub use registry::DriverRegistry;
pub use schema::{render_schema, render_tables, schema_header, ColumnDef, TableDef};
pub use traits::{DatabaseDriver, Execution, Row, RowStream};

//! MySQL and MariaDB driver (mysql_async)
//!
//! MariaDB speaks the MySQL wire protocol; the same adapter serves both and
//! only the reported kind (and schema header) differs.

use async_trait::async_trait;
use mysql_async::consts::{ColumnFlags, ColumnType};
use mysql_async::prelude::Queryable;
use mysql_async::{Column, Conn, OptsBuilder};
use serde_json::{Number, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::channel::{into_execution, row_channel, DriverEvent};
use super::error::{DriverError, DriverResult};
use super::schema::render_schema;
use super::traits::{DatabaseDriver, Execution, Row};
use crate::logging::Logger;
use crate::types::{DatabaseConnection, DriverKind};

const TABLES_SQL: &str = "SELECT CAST(table_name AS CHAR) FROM information_schema.tables \
     WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' ORDER BY table_name";

pub struct MySqlDriver {
    kind: DriverKind,
    logger: Arc<dyn Logger>,
}

impl MySqlDriver {
    pub fn mysql(logger: Arc<dyn Logger>) -> Self {
        Self {
            kind: DriverKind::MySql,
            logger,
        }
    }

    pub fn mariadb(logger: Arc<dyn Logger>) -> Self {
        Self {
            kind: DriverKind::MariaDb,
            logger,
        }
    }

    fn opts(connection: &DatabaseConnection) -> OptsBuilder {
        OptsBuilder::default()
            .ip_or_hostname(connection.host.clone())
            .tcp_port(connection.port)
            .user(Some(connection.username.clone()))
            .pass(Some(connection.secret.clone()))
            .db_name(Some(connection.database_name.clone()))
    }

    /// Stop the server from producing rows nobody will read
    async fn kill_query(kind: DriverKind, connection: &DatabaseConnection, connection_id: u32, logger: &dyn Logger) {
        let mut side = match Self::connect(kind, connection).await {
            Ok(side) => side,
            Err(e) => {
                logger.warn(&format!("[MySqlDriver] Could not abort query {}: {}", connection_id, e));
                return;
            }
        };
        match side.query_drop(kill_query_sql(connection_id)).await {
            Ok(()) => logger.debug(&format!("[MySqlDriver] Aborted query on connection {}", connection_id)),
            Err(e) => logger.warn(&format!("[MySqlDriver] Could not abort query {}: {}", connection_id, e)),
        }
        let _ = side.disconnect().await;
    }

    async fn connect(kind: DriverKind, connection: &DatabaseConnection) -> DriverResult<Conn> {
        Conn::new(Self::opts(connection))
            .await
            .map_err(|e| DriverError::Connect {
                driver: kind.as_str().to_string(),
                host: format!("{}:{}", connection.host, connection.port),
                message: e.to_string(),
            })
    }
}

/// How a statement's result stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatementEnd {
    Finished,
    /// The consumer went away with rows still pending on the server
    Abandoned,
}

/// Aborts the running statement of `connection_id` without closing its session
fn kill_query_sql(connection_id: u32) -> String {
    format!("KILL QUERY {}", connection_id)
}

async fn stream_statement(
    conn: &mut Conn,
    sql: &str,
    tx: &mpsc::Sender<DriverEvent>,
) -> Result<StatementEnd, String> {
    let mut result = conn.query_iter(sql).await.map_err(|e| e.to_string())?;

    let columns = result.columns();
    let columns = match columns {
        Some(columns) if !columns.is_empty() => columns,
        _ => {
            let affected = result.affected_rows();
            result.drop_result().await.map_err(|e| e.to_string())?;
            let _ = tx.send(DriverEvent::Summary(affected)).await;
            return Ok(StatementEnd::Finished);
        }
    };

    while let Some(row) = result.next().await.map_err(|e| e.to_string())? {
        let json: Row = columns
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let value = row.as_ref(idx).map(|v| column_value(column, v)).unwrap_or(Value::Null);
                (column.name_str().to_string(), value)
            })
            .collect();

        if tx.send(DriverEvent::Row(json)).await.is_err() {
            return Ok(StatementEnd::Abandoned);
        }
    }
    Ok(StatementEnd::Finished)
}

/// Convert one text-protocol value using its column metadata
fn column_value(column: &Column, value: &mysql_async::Value) -> Value {
    use mysql_async::Value as My;

    let bytes = match value {
        My::NULL => return Value::Null,
        My::Int(i) => return Value::from(*i),
        My::UInt(u) => return Value::from(*u),
        My::Float(f) => return Number::from_f64(*f as f64).map(Value::Number).unwrap_or(Value::Null),
        My::Double(f) => return Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        My::Date(..) | My::Time(..) => return Value::String(value.as_sql(true).trim_matches('\'').to_string()),
        My::Bytes(bytes) => bytes,
    };

    let Ok(text) = std::str::from_utf8(bytes) else {
        return Value::Null;
    };

    let unsigned = column.flags().contains(ColumnFlags::UNSIGNED_FLAG);
    match column.column_type() {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_YEAR => {
            let parsed = if unsigned {
                text.parse::<u64>().ok().map(Value::from)
            } else {
                text.parse::<i64>().ok().map(Value::from)
            };
            parsed.unwrap_or_else(|| Value::String(text.to_string()))
        }
        ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(text.to_string())),
        ColumnType::MYSQL_TYPE_JSON => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        }
        // DECIMAL keeps its exact text; dates and times stay as the server formats them
        _ => Value::String(text.to_string()),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

async fn load_ddl(conn: &mut Conn) -> mysql_async::Result<Vec<(String, String)>> {
    let tables: Vec<String> = conn.query(TABLES_SQL).await?;
    let mut blocks = Vec::with_capacity(tables.len());
    for table in tables {
        let create: Option<(String, String)> = conn
            .query_first(format!("SHOW CREATE TABLE {}", quote_identifier(&table)))
            .await?;
        if let Some((_, ddl)) = create {
            blocks.push((table, format!("{};", ddl)));
        }
    }
    Ok(blocks)
}

#[async_trait]
impl DatabaseDriver for MySqlDriver {
    fn kind(&self) -> DriverKind {
        self.kind
    }

    async fn execute(&self, connection: &DatabaseConnection, sql: &str) -> DriverResult<Execution> {
        let (tx, rx) = row_channel();
        let connection = connection.clone();
        let sql = sql.to_string();
        let kind = self.kind;
        let logger = Arc::clone(&self.logger);

        tokio::spawn(async move {
            let mut conn = match Self::connect(kind, &connection).await {
                Ok(conn) => conn,
                Err(e) => {
                    let _ = tx.send(DriverEvent::Err(e)).await;
                    return;
                }
            };
            logger.debug(&format!("[MySqlDriver] Connected to {} ({})", connection.host, kind));

            match stream_statement(&mut conn, &sql, &tx).await {
                Ok(StatementEnd::Finished) => {}
                Ok(StatementEnd::Abandoned) => {
                    // closing the session would read every remaining row first
                    Self::kill_query(kind, &connection, conn.id(), logger.as_ref()).await;
                }
                Err(message) => {
                    logger.error(&format!("[MySqlDriver] Statement failed: {}", message));
                    let _ = tx.send(DriverEvent::Err(DriverError::Query(message))).await;
                }
            }

            if let Err(e) = conn.disconnect().await {
                logger.warn(&format!("[MySqlDriver] Disconnect failed: {}", e));
            } else {
                logger.debug("[MySqlDriver] Connection closed");
            }
        });

        into_execution(rx).await
    }

    async fn introspect_schema(&self, connection: &DatabaseConnection) -> DriverResult<String> {
        let mut conn = Self::connect(self.kind, connection).await?;
        let result = load_ddl(&mut conn).await;
        if let Err(e) = conn.disconnect().await {
            self.logger.warn(&format!("[MySqlDriver] Disconnect failed: {}", e));
        }

        let blocks = result.map_err(|e| DriverError::Schema(e.to_string()))?;
        self.logger.debug(&format!("[MySqlDriver] Introspected {} tables", blocks.len()));
        Ok(render_schema(self.kind, blocks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(ty: ColumnType, flags: ColumnFlags) -> Column {
        Column::new(ty).with_flags(flags).with_name(b"c")
    }

    #[test]
    fn test_integer_columns() {
        let signed = column(ColumnType::MYSQL_TYPE_LONG, ColumnFlags::empty());
        assert_eq!(column_value(&signed, &mysql_async::Value::Bytes(b"-42".to_vec())), Value::from(-42));

        let unsigned = column(ColumnType::MYSQL_TYPE_LONGLONG, ColumnFlags::UNSIGNED_FLAG);
        assert_eq!(
            column_value(&unsigned, &mysql_async::Value::Bytes(b"18446744073709551615".to_vec())),
            Value::from(u64::MAX)
        );
    }

    #[test]
    fn test_decimal_stays_exact_text() {
        let decimal = column(ColumnType::MYSQL_TYPE_NEWDECIMAL, ColumnFlags::empty());
        assert_eq!(
            column_value(&decimal, &mysql_async::Value::Bytes(b"19.90".to_vec())),
            Value::String("19.90".into())
        );
    }

    #[test]
    fn test_json_and_null() {
        let json = column(ColumnType::MYSQL_TYPE_JSON, ColumnFlags::empty());
        assert_eq!(
            column_value(&json, &mysql_async::Value::Bytes(br#"{"a":1}"#.to_vec())),
            serde_json::json!({"a": 1})
        );
        assert_eq!(column_value(&json, &mysql_async::Value::NULL), Value::Null);
    }

    #[test]
    fn test_kill_query_targets_the_statement_only() {
        assert_eq!(kill_query_sql(42), "KILL QUERY 42");
        assert_ne!(StatementEnd::Abandoned, StatementEnd::Finished);
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("orders"), "`orders`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }
}

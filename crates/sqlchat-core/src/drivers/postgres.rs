//! PostgreSQL driver (tokio-postgres)

use async_trait::async_trait;
use futures::{pin_mut, StreamExt};
use serde_json::{Number, Value};
use std::error::Error as StdError;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_postgres::types::{FromSql, Kind, Type};
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage};

use super::channel::{into_execution, row_channel, DriverEvent};
use super::error::{DriverError, DriverResult};
use super::schema::{render_tables, ColumnDef, TableDef};
use super::traits::{DatabaseDriver, Execution, Row};
use crate::logging::Logger;
use crate::types::{DatabaseConnection, DriverKind};

const TABLES_SQL: &str = "SELECT table_name::text FROM information_schema.tables \
     WHERE table_schema = 'public' AND table_type = 'BASE TABLE' ORDER BY table_name";

const COLUMNS_SQL: &str = "SELECT table_name::text, column_name::text, \
     CASE WHEN character_maximum_length IS NOT NULL \
          THEN data_type || '(' || character_maximum_length || ')' ELSE data_type END::text, \
     is_nullable = 'YES', column_default::text \
     FROM information_schema.columns WHERE table_schema = 'public' \
     ORDER BY table_name, ordinal_position";

const PRIMARY_KEYS_SQL: &str = "SELECT tc.table_name::text, kcu.column_name::text \
     FROM information_schema.table_constraints tc \
     JOIN information_schema.key_column_usage kcu \
       ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
     WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = 'public' \
     ORDER BY tc.table_name, kcu.ordinal_position";

pub struct PostgresDriver {
    logger: Arc<dyn Logger>,
}

impl PostgresDriver {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }

    fn config(connection: &DatabaseConnection) -> Config {
        let mut config = Config::new();
        config
            .host(&connection.host)
            .port(connection.port)
            .user(&connection.username)
            .password(&connection.secret)
            .dbname(&connection.database_name);
        config
    }

    /// Open a client; the returned task drives the socket and ends once the client is dropped
    async fn connect(
        connection: &DatabaseConnection,
    ) -> DriverResult<(Client, tokio::task::JoinHandle<()>)> {
        let (client, conn) = Self::config(connection)
            .connect(NoTls)
            .await
            .map_err(|e| DriverError::Connect {
                driver: "postgresql".into(),
                host: format!("{}:{}", connection.host, connection.port),
                message: error_text(&e),
            })?;
        let driver = tokio::spawn(async move {
            let _ = conn.await;
        });
        Ok((client, driver))
    }
}

/// Innermost message; tokio-postgres wraps the server's `db error: ...`
fn error_text(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => db.message().to_string(),
        None => match err.source() {
            Some(source) => format!("{}: {}", err, source),
            None => err.to_string(),
        },
    }
}

/// The server refuses to prepare a string holding several statements
fn is_multi_statement_error(message: &str) -> bool {
    message.contains("cannot insert multiple commands into a prepared statement")
}

async fn stream_statement(client: &Client, sql: &str, tx: &mpsc::Sender<DriverEvent>) -> Result<(), String> {
    let statement = match client.prepare(sql).await {
        Ok(statement) => statement,
        Err(e) => {
            let message = error_text(&e);
            if is_multi_statement_error(&message) {
                return stream_script(client, sql, tx).await;
            }
            return Err(message);
        }
    };

    if statement.columns().is_empty() {
        let affected = client
            .execute(&statement, &[])
            .await
            .map_err(|e| error_text(&e))?;
        let _ = tx.send(DriverEvent::Summary(affected)).await;
        return Ok(());
    }

    let rows = client
        .query_raw(&statement, std::iter::empty::<String>())
        .await
        .map_err(|e| error_text(&e))?;
    pin_mut!(rows);

    while let Some(row) = rows.next().await {
        let row = row.map_err(|e| error_text(&e))?;
        if tx.send(DriverEvent::Row(row_to_json(&row))).await.is_err() {
            // consumer dropped the stream
            return Ok(());
        }
    }
    Ok(())
}

/// Run a multi-statement script over the simple query protocol
///
/// Rows of every row-returning statement are forwarded in order; a script
/// that returns no rows reports the summed affected-row counts.
async fn stream_script(client: &Client, sql: &str, tx: &mpsc::Sender<DriverEvent>) -> Result<(), String> {
    let messages = client.simple_query(sql).await.map_err(|e| error_text(&e))?;

    let mut affected = 0u64;
    let mut saw_rows = false;
    for message in messages {
        match message {
            SimpleQueryMessage::Row(row) => {
                saw_rows = true;
                let names: Vec<&str> = row.columns().iter().map(|c| c.name()).collect();
                let values = (0..row.len()).map(|idx| row.get(idx));
                if tx.send(DriverEvent::Row(text_row(&names, values))).await.is_err() {
                    return Ok(());
                }
            }
            SimpleQueryMessage::CommandComplete(count) => affected += count,
            _ => {}
        }
    }

    if !saw_rows {
        let _ = tx.send(DriverEvent::Summary(affected)).await;
    }
    Ok(())
}

/// Simple-protocol rows arrive as text; NULL stays `null`
fn text_row<'a>(names: &[&str], values: impl Iterator<Item = Option<&'a str>>) -> Row {
    names
        .iter()
        .zip(values)
        .map(|(name, value)| {
            let value = value.map(|v| Value::String(v.to_string())).unwrap_or(Value::Null);
            (name.to_string(), value)
        })
        .collect()
}

pub(crate) fn row_to_json(row: &tokio_postgres::Row) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| (column.name().to_string(), column_value(row, idx, column.type_())))
        .collect()
}

fn get<'a, T>(row: &'a tokio_postgres::Row, idx: usize) -> Option<T>
where
    T: FromSql<'a>,
{
    row.try_get::<_, Option<T>>(idx).ok().flatten()
}

fn column_value(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Value {
    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx).map(Value::Bool),
        Type::INT2 => get::<i16>(row, idx).map(Value::from),
        Type::INT4 => get::<i32>(row, idx).map(Value::from),
        Type::INT8 => get::<i64>(row, idx).map(Value::from),
        Type::OID => get::<u32>(row, idx).map(Value::from),
        Type::FLOAT4 => get::<f32>(row, idx).and_then(|f| Number::from_f64(f as f64)).map(Value::Number),
        Type::FLOAT8 => get::<f64>(row, idx).and_then(Number::from_f64).map(Value::Number),
        Type::JSON | Type::JSONB => get::<Value>(row, idx),
        Type::TIMESTAMPTZ => {
            get::<chrono::DateTime<chrono::Utc>>(row, idx).map(|t| Value::String(t.to_rfc3339()))
        }
        Type::TIMESTAMP => get::<chrono::NaiveDateTime>(row, idx)
            .map(|t| Value::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        Type::DATE => get::<chrono::NaiveDate>(row, idx).map(|d| Value::String(d.to_string())),
        Type::TIME => get::<chrono::NaiveTime>(row, idx).map(|t| Value::String(t.to_string())),
        Type::UUID => get::<uuid::Uuid>(row, idx).map(|u| Value::String(u.to_string())),
        Type::NUMERIC => get::<PgNumeric>(row, idx).map(|n| Value::String(n.0)),
        Type::INET => get::<std::net::IpAddr>(row, idx).map(|ip| Value::String(ip.to_string())),
        Type::BYTEA => get::<Vec<u8>>(row, idx).map(|bytes| Value::String(bytea_hex(&bytes))),
        // text, varchar, bpchar, name, citext; then enum labels; anything else is null
        _ => get::<String>(row, idx)
            .or_else(|| get::<PgEnumLabel>(row, idx).map(|label| label.0))
            .map(Value::String),
    };
    value.unwrap_or(Value::Null)
}

/// `bytea` in PostgreSQL's own hex output format
fn bytea_hex(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(2 + bytes.len() * 2);
    text.push_str("\\x");
    for byte in bytes {
        text.push_str(&format!("{:02x}", byte));
    }
    text
}

/// Enum values travel as their UTF-8 label in binary format
struct PgEnumLabel(String);

impl<'a> FromSql<'a> for PgEnumLabel {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        Ok(PgEnumLabel(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(ty.kind(), Kind::Enum(_))
    }
}

/// `numeric` in its exact decimal text form
struct PgNumeric(String);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        decode_numeric(raw).map(PgNumeric).ok_or_else(|| "malformed numeric".into())
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Binary numeric: ndigits, weight, sign, dscale, then base-10000 digits
fn decode_numeric(raw: &[u8]) -> Option<String> {
    let word = |i: usize| -> Option<u16> { Some(u16::from_be_bytes([*raw.get(i)?, *raw.get(i + 1)?])) };
    let ndigits = word(0)? as usize;
    let weight = word(2)? as i16 as i32;
    let sign = word(4)?;
    let dscale = word(6)? as usize;
    let digits: Vec<u16> = (0..ndigits).map(|i| word(8 + i * 2)).collect::<Option<_>>()?;

    match sign {
        0xC000 => return Some("NaN".into()),
        0xD000 => return Some("Infinity".into()),
        0xF000 => return Some("-Infinity".into()),
        _ => {}
    }

    let mut int_part = String::new();
    for pos in 0..=weight.max(-1) {
        let digit = digits.get(pos as usize).copied().unwrap_or(0);
        if int_part.is_empty() {
            int_part = digit.to_string();
        } else {
            int_part.push_str(&format!("{:04}", digit));
        }
    }
    if int_part.is_empty() {
        int_part.push('0');
    }

    let mut frac_part = String::new();
    let mut pos = weight + 1;
    while frac_part.len() < dscale {
        let digit = if pos < 0 {
            0
        } else {
            digits.get(pos as usize).copied().unwrap_or(0)
        };
        frac_part.push_str(&format!("{:04}", digit));
        pos += 1;
    }
    frac_part.truncate(dscale);

    let mut text = String::new();
    if sign == 0x4000 {
        text.push('-');
    }
    text.push_str(&int_part);
    if dscale > 0 {
        text.push('.');
        text.push_str(&frac_part);
    }
    Some(text)
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::PostgreSql
    }

    async fn execute(&self, connection: &DatabaseConnection, sql: &str) -> DriverResult<Execution> {
        let (tx, rx) = row_channel();
        let connection = connection.clone();
        let sql = sql.to_string();
        let logger = Arc::clone(&self.logger);

        tokio::spawn(async move {
            let (client, driver) = match Self::connect(&connection).await {
                Ok(pair) => pair,
                Err(e) => {
                    let _ = tx.send(DriverEvent::Err(e)).await;
                    return;
                }
            };
            logger.debug(&format!("[PostgresDriver] Connected to {}", connection.host));

            if let Err(message) = stream_statement(&client, &sql, &tx).await {
                logger.error(&format!("[PostgresDriver] Statement failed: {}", message));
                let _ = tx.send(DriverEvent::Err(DriverError::Query(message))).await;
            }

            drop(client);
            let _ = driver.await;
            logger.debug("[PostgresDriver] Connection closed");
        });

        into_execution(rx).await
    }

    async fn introspect_schema(&self, connection: &DatabaseConnection) -> DriverResult<String> {
        let (client, driver) = Self::connect(connection).await?;
        let result = load_tables(&client).await;
        drop(client);
        let _ = driver.await;

        let tables = result.map_err(|e| DriverError::Schema(error_text(&e)))?;
        self.logger.debug(&format!(
            "[PostgresDriver] Introspected {} tables",
            tables.len()
        ));
        Ok(render_tables(DriverKind::PostgreSql, &tables))
    }
}

async fn load_tables(client: &Client) -> Result<Vec<TableDef>, tokio_postgres::Error> {
    let mut tables: Vec<TableDef> = client
        .query(TABLES_SQL, &[])
        .await?
        .iter()
        .map(|r| TableDef::new(r.get::<_, String>(0)))
        .collect();

    for row in client.query(COLUMNS_SQL, &[]).await? {
        let table: String = row.get(0);
        if let Some(def) = tables.iter_mut().find(|t| t.name == table) {
            def.columns.push(ColumnDef {
                name: row.get(1),
                data_type: row.get(2),
                nullable: row.get(3),
                default: row.get(4),
            });
        }
    }

    for row in client.query(PRIMARY_KEYS_SQL, &[]).await? {
        let table: String = row.get(0);
        if let Some(def) = tables.iter_mut().find(|t| t.name == table) {
            def.primary_key.push(row.get(1));
        }
    }

    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(ndigits: u16, weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        for word in [ndigits, weight as u16, sign, dscale].iter().chain(digits) {
            raw.extend_from_slice(&word.to_be_bytes());
        }
        raw
    }

    #[test]
    fn test_decode_numeric() {
        // 12345.678
        assert_eq!(
            decode_numeric(&numeric(3, 1, 0, 3, &[1, 2345, 6780])).as_deref(),
            Some("12345.678")
        );
        // -0.05
        assert_eq!(
            decode_numeric(&numeric(1, -1, 0x4000, 2, &[500])).as_deref(),
            Some("-0.05")
        );
        // 0
        assert_eq!(decode_numeric(&numeric(0, 0, 0, 0, &[])).as_deref(), Some("0"));
        // 10000
        assert_eq!(decode_numeric(&numeric(1, 1, 0, 0, &[1])).as_deref(), Some("10000"));
    }

    #[test]
    fn test_enum_label_only_accepts_enums() {
        let mood = Type::new(
            "mood".into(),
            70_001,
            Kind::Enum(vec!["sad".into(), "happy".into()]),
            "public".into(),
        );
        assert!(PgEnumLabel::accepts(&mood));
        for binary in [Type::INTERVAL, Type::MONEY, Type::INT4_ARRAY, Type::TIMETZ, Type::POINT] {
            assert!(!PgEnumLabel::accepts(&binary), "{} must not decode as text", binary);
        }
        assert_eq!(PgEnumLabel::from_sql(&mood, b"happy").unwrap().0, "happy");
    }

    #[test]
    fn test_bytea_hex() {
        assert_eq!(bytea_hex(&[0xde, 0xad, 0x01]), "\\xdead01");
        assert_eq!(bytea_hex(&[]), "\\x");
    }

    #[test]
    fn test_multi_statement_detection() {
        assert!(is_multi_statement_error(
            "cannot insert multiple commands into a prepared statement"
        ));
        assert!(!is_multi_statement_error("relation \"users\" does not exist"));
    }

    #[test]
    fn test_text_row_keeps_nulls() {
        let row = text_row(&["id", "note"], vec![Some("7"), None].into_iter());
        assert_eq!(row["id"], Value::String("7".into()));
        assert_eq!(row["note"], Value::Null);
        let names: Vec<&String> = row.keys().collect();
        assert_eq!(names, vec!["id", "note"]);
    }

    #[test]
    fn test_decode_numeric_special_and_malformed() {
        assert_eq!(decode_numeric(&numeric(0, 0, 0xC000, 0, &[])).as_deref(), Some("NaN"));
        assert!(decode_numeric(&[0, 2, 0]).is_none());
    }
}

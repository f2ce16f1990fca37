//! Mock driver for testing
//!
//! Runs through the same task/channel bridge as the real drivers, and counts
//! open "connections" so tests can check release on every exit path.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::channel::{into_execution, row_channel, DriverEvent};
use super::error::{DriverError, DriverResult};
use super::schema::render_schema;
use super::traits::{DatabaseDriver, Execution, Row};
use crate::types::{DatabaseConnection, DriverKind};

#[derive(Debug, Clone)]
pub enum MockResult {
    Rows(Vec<Row>),
    Summary(u64),
}

#[derive(Debug, Clone)]
pub struct MockDriverConfig {
    pub result: MockResult,
    /// Delay before each row
    pub row_delay_ms: u64,
    /// Fail with this message after this many rows
    pub fail_after: Option<(usize, String)>,
    pub fail_connect: bool,
    /// (table, DDL) pairs returned by `introspect_schema`
    pub tables: Vec<(String, String)>,
}

impl Default for MockDriverConfig {
    fn default() -> Self {
        Self {
            result: MockResult::Rows(Vec::new()),
            row_delay_ms: 0,
            fail_after: None,
            fail_connect: false,
            tables: Vec::new(),
        }
    }
}

pub struct MockDriver {
    kind: DriverKind,
    config: MockDriverConfig,
    open_connections: Arc<AtomicUsize>,
    rows_sent: Arc<AtomicUsize>,
}

/// Decrements the open-connection count however the task exits
struct ConnectionGuard(Arc<AtomicUsize>);

impl ConnectionGuard {
    fn open(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockDriver {
    pub fn new(kind: DriverKind, config: MockDriverConfig) -> Self {
        Self {
            kind,
            config,
            open_connections: Arc::new(AtomicUsize::new(0)),
            rows_sent: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// `n` rows of `{"id": i, "name": "row-i"}`, 1-based
    pub fn numbered_rows(n: usize) -> Vec<Row> {
        (1..=n)
            .map(|i| {
                let mut row = Row::new();
                row.insert("id".into(), json!(i));
                row.insert("name".into(), json!(format!("row-{}", i)));
                row
            })
            .collect()
    }

    pub fn with_rows(kind: DriverKind, rows: Vec<Row>) -> Self {
        Self::new(
            kind,
            MockDriverConfig {
                result: MockResult::Rows(rows),
                ..Default::default()
            },
        )
    }

    pub fn with_summary(kind: DriverKind, affected_rows: u64) -> Self {
        Self::new(
            kind,
            MockDriverConfig {
                result: MockResult::Summary(affected_rows),
                ..Default::default()
            },
        )
    }

    pub fn with_row_delay(mut self, delay_ms: u64) -> Self {
        self.config.row_delay_ms = delay_ms;
        self
    }

    pub fn failing_after(mut self, rows: usize, message: impl Into<String>) -> Self {
        self.config.fail_after = Some((rows, message.into()));
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.config.fail_connect = true;
        self
    }

    pub fn with_table(mut self, name: impl Into<String>, ddl: impl Into<String>) -> Self {
        self.config.tables.push((name.into(), ddl.into()));
        self
    }

    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }

    /// Rows handed to the channel so far
    pub fn rows_sent(&self) -> usize {
        self.rows_sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseDriver for MockDriver {
    fn kind(&self) -> DriverKind {
        self.kind
    }

    async fn execute(&self, connection: &DatabaseConnection, _sql: &str) -> DriverResult<Execution> {
        if self.config.fail_connect {
            return Err(DriverError::Connect {
                driver: self.kind.as_str().to_string(),
                host: connection.host.clone(),
                message: "connection refused".into(),
            });
        }

        let (tx, rx) = row_channel();
        let config = self.config.clone();
        let guard = ConnectionGuard::open(&self.open_connections);
        let rows_sent = Arc::clone(&self.rows_sent);

        tokio::spawn(async move {
            let _guard = guard;
            let rows = match config.result {
                MockResult::Summary(n) => {
                    let _ = tx.send(DriverEvent::Summary(n)).await;
                    return;
                }
                MockResult::Rows(rows) => rows,
            };

            let delay = Duration::from_millis(config.row_delay_ms);
            for (idx, row) in rows.into_iter().enumerate() {
                if let Some((after, message)) = &config.fail_after {
                    if idx == *after {
                        let _ = tx.send(DriverEvent::Err(DriverError::Query(message.clone()))).await;
                        return;
                    }
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(DriverEvent::Row(row)).await.is_err() {
                    return;
                }
                rows_sent.fetch_add(1, Ordering::SeqCst);
            }
        });

        into_execution(rx).await
    }

    async fn introspect_schema(&self, _connection: &DatabaseConnection) -> DriverResult<String> {
        if self.config.fail_connect {
            return Err(DriverError::Schema("connection refused".into()));
        }
        let _guard = ConnectionGuard::open(&self.open_connections);
        Ok(render_schema(self.kind, self.config.tables.clone()))
    }
}

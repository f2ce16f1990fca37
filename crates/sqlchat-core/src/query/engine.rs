//! Query execution engine
//!
//! Per request: `Idle → Executing → {StreamingRows | Summarizing} →
//! {Completed | Cancelled | Failed}`. Rows are forwarded one at a time as
//! the driver yields them; the cancellation flag is checked before each
//! row is pulled. A cancelled stream ends with `Done` and drops the row
//! stream, which closes the request's connection.

use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::cancel::{CancellationCoordinator, CancellationGuard};
use crate::drivers::{DriverError, DriverRegistry, Execution, RowStream};
use crate::error::{CoreError, CoreResult};
use crate::logging::Logger;
use crate::persistence::Persistence;
use crate::types::{DatabaseConnection, EventStream, StreamEvent};

/// Inbound SQL execution request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub sql: String,
    pub connection_id: String,
    /// Correlation id for cancellation; generated when absent
    #[serde(default)]
    pub execution_id: Option<String>,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>, connection_id: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            connection_id: connection_id.into(),
            execution_id: None,
        }
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }
}

/// Started execution: its correlation id and event stream
pub struct QueryExecution {
    pub execution_id: String,
    pub events: EventStream,
}

pub struct QueryEngine {
    persistence: Arc<dyn Persistence>,
    drivers: DriverRegistry,
    coordinator: Arc<CancellationCoordinator>,
    logger: Arc<dyn Logger>,
}

struct RowState {
    rows: Option<RowStream>,
    guard: CancellationGuard,
    emitted: usize,
    logger: Arc<dyn Logger>,
}

impl QueryEngine {
    pub fn new(
        persistence: Arc<dyn Persistence>,
        drivers: DriverRegistry,
        coordinator: Arc<CancellationCoordinator>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            persistence,
            drivers,
            coordinator,
            logger,
        }
    }

    async fn connection(&self, connection_id: &str) -> CoreResult<DatabaseConnection> {
        self.persistence
            .get_connection_by_id(connection_id)
            .await?
            .ok_or_else(|| CoreError::ConnectionNotFound(connection_id.to_string()))
    }

    /// Execute one statement
    ///
    /// Errors returned here happened before anything was streamed. Failures
    /// after the first row arrive as a trailing `Error` event.
    pub async fn execute(&self, request: QueryRequest) -> CoreResult<QueryExecution> {
        let connection = self.connection(&request.connection_id).await?;
        let driver = self.drivers.for_connection(&connection)?;

        let execution_id = request
            .execution_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let guard = self.coordinator.register(execution_id.clone());

        self.logger.info(&format!(
            "[QueryEngine] Executing {} on {} ({})",
            execution_id, connection.id, connection.driver
        ));

        let execution = driver.execute(&connection, &request.sql).await.map_err(|e| {
            self.logger.error(&format!("[QueryEngine] {} failed: {}", execution_id, e));
            CoreError::from(e)
        })?;

        let events: EventStream = match execution {
            Execution::Summary { affected_rows } => {
                self.logger.debug(&format!(
                    "[QueryEngine] {} summarizing: {} affected rows",
                    execution_id, affected_rows
                ));
                drop(guard);
                Box::pin(stream::iter([
                    StreamEvent::Summary { affected_rows },
                    StreamEvent::Done,
                ]))
            }
            Execution::Rows(rows) => {
                self.logger.debug(&format!("[QueryEngine] {} streaming rows", execution_id));
                Self::row_events(RowState {
                    rows: Some(rows),
                    guard,
                    emitted: 0,
                    logger: Arc::clone(&self.logger),
                })
            }
        };

        Ok(QueryExecution { execution_id, events })
    }

    fn row_events(state: RowState) -> EventStream {
        Box::pin(stream::unfold(state, |mut st| async move {
            let rows = st.rows.as_mut()?;

            if st.guard.is_cancelled() {
                st.logger.info(&format!(
                    "[QueryEngine] {} cancelled after {} rows",
                    st.guard.key(),
                    st.emitted
                ));
                st.rows = None;
                return Some((StreamEvent::Done, st));
            }

            match rows.next().await {
                Some(Ok(row)) => {
                    st.emitted += 1;
                    Some((StreamEvent::Row { row }, st))
                }
                Some(Err(err)) => {
                    st.logger.error(&format!(
                        "[QueryEngine] {} failed after {} rows: {}",
                        st.guard.key(),
                        st.emitted,
                        err
                    ));
                    st.rows = None;
                    Some((StreamEvent::error(err.to_string()), st))
                }
                None => {
                    st.logger.info(&format!(
                        "[QueryEngine] {} completed: {} rows",
                        st.guard.key(),
                        st.emitted
                    ));
                    st.rows = None;
                    Some((StreamEvent::Done, st))
                }
            }
        }))
    }

    /// Driver-tagged schema text for a stored connection
    pub async fn introspect_schema(&self, connection_id: &str) -> CoreResult<String> {
        let connection = self.connection(connection_id).await?;
        let driver = self.drivers.for_connection(&connection)?;
        driver.introspect_schema(&connection).await.map_err(|e| match e {
            DriverError::UnsupportedDriver(driver) => CoreError::UnsupportedDriver(driver),
            DriverError::Schema(message) => CoreError::SchemaIntrospection(message),
            other => CoreError::SchemaIntrospection(other.to_string()),
        })
    }

    /// Signal a running execution; false when none is live under that id
    pub fn cancel(&self, execution_id: &str) -> bool {
        let signalled = self.coordinator.cancel(execution_id);
        self.logger.info(&format!(
            "[QueryEngine] Cancel requested for {} (live: {})",
            execution_id, signalled
        ));
        signalled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::MockDriver;
    use crate::logging::NoOpLogger;
    use crate::persistence::MemoryPersistence;
    use crate::types::DriverKind;
    use serde_json::json;

    fn connection(id: &str, driver: &str) -> DatabaseConnection {
        DatabaseConnection {
            id: id.into(),
            project_name: "shop".into(),
            driver: driver.into(),
            host: "localhost".into(),
            port: 5432,
            username: "app".into(),
            secret: "pw".into(),
            database_name: "shop".into(),
            cached_schema_text: String::new(),
        }
    }

    fn engine_with(driver: Arc<MockDriver>) -> (QueryEngine, Arc<CancellationCoordinator>) {
        let persistence = Arc::new(MemoryPersistence::with_connections(vec![
            connection("pg", "postgresql"),
            connection("ora", "oracle"),
        ]));
        let mut drivers = DriverRegistry::new();
        drivers.register(driver);
        let coordinator = Arc::new(CancellationCoordinator::new());
        let engine = QueryEngine::new(persistence, drivers, Arc::clone(&coordinator), Arc::new(NoOpLogger));
        (engine, coordinator)
    }

    async fn collect(execution: QueryExecution) -> Vec<StreamEvent> {
        execution.events.collect().await
    }

    #[tokio::test]
    async fn test_streams_every_row_then_done() {
        let driver = Arc::new(MockDriver::with_rows(DriverKind::PostgreSql, MockDriver::numbered_rows(25)));
        let (engine, coordinator) = engine_with(Arc::clone(&driver));

        let events = collect(engine.execute(QueryRequest::new("SELECT * FROM t", "pg")).await.unwrap()).await;
        let rows: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Row { row } => Some(row["id"].clone()),
                _ => None,
            })
            .collect();
        assert_eq!(rows.len(), 25);
        assert_eq!(rows.first(), Some(&json!(1)));
        assert_eq!(rows.last(), Some(&json!(25)));
        assert_eq!(events.last(), Some(&StreamEvent::Done));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(coordinator.is_empty());
    }

    #[tokio::test]
    async fn test_summary_shape() {
        let driver = Arc::new(MockDriver::with_summary(DriverKind::PostgreSql, 3));
        let (engine, _) = engine_with(driver);
        let events = collect(
            engine
                .execute(QueryRequest::new("DELETE FROM orders", "pg"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(events, vec![StreamEvent::Summary { affected_rows: 3 }, StreamEvent::Done]);
        assert_eq!(events[0].to_ndjson_line().unwrap(), "{\"affectedRows\":3}\n");
    }

    #[tokio::test]
    async fn test_unknown_connection_fails_before_streaming() {
        let driver = Arc::new(MockDriver::with_rows(DriverKind::PostgreSql, vec![]));
        let (engine, coordinator) = engine_with(Arc::clone(&driver));
        let result = engine.execute(QueryRequest::new("SELECT 1", "missing")).await;
        assert!(matches!(result, Err(CoreError::ConnectionNotFound(ref id)) if id == "missing"));
        assert_eq!(driver.open_connections(), 0);
        assert!(coordinator.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_driver() {
        let driver = Arc::new(MockDriver::with_rows(DriverKind::PostgreSql, vec![]));
        let (engine, _) = engine_with(driver);
        let result = engine.execute(QueryRequest::new("SELECT 1", "ora")).await;
        assert!(matches!(result, Err(CoreError::UnsupportedDriver(ref d)) if d == "oracle"));
    }

    #[tokio::test]
    async fn test_connect_failure_is_pre_stream_error() {
        let driver = Arc::new(MockDriver::with_rows(DriverKind::PostgreSql, vec![]).failing_connect());
        let (engine, coordinator) = engine_with(driver);
        let result = engine.execute(QueryRequest::new("SELECT 1", "pg")).await;
        assert!(matches!(result, Err(CoreError::QueryExecution(_))));
        assert!(coordinator.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_after_two_rows() {
        let driver = Arc::new(
            MockDriver::with_rows(DriverKind::PostgreSql, MockDriver::numbered_rows(10)).with_row_delay(5),
        );
        let (engine, coordinator) = engine_with(Arc::clone(&driver));

        let mut execution = engine
            .execute(QueryRequest::new("SELECT * FROM t", "pg").with_execution_id("exec-1"))
            .await
            .unwrap();
        assert_eq!(execution.execution_id, "exec-1");

        for expected in 1..=2 {
            match execution.events.next().await {
                Some(StreamEvent::Row { row }) => assert_eq!(row["id"], json!(expected)),
                other => panic!("expected row, got {:?}", other),
            }
        }

        assert!(engine.cancel("exec-1"));
        assert_eq!(execution.events.next().await, Some(StreamEvent::Done));
        assert_eq!(execution.events.next().await, None);
        assert!(coordinator.is_empty());

        for _ in 0..100 {
            if driver.open_connections() == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(driver.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_rows() {
        let driver = Arc::new(
            MockDriver::with_rows(DriverKind::PostgreSql, MockDriver::numbered_rows(5))
                .failing_after(3, "server closed the connection"),
        );
        let (engine, _) = engine_with(driver);
        let events = collect(engine.execute(QueryRequest::new("SELECT * FROM t", "pg")).await.unwrap()).await;

        assert_eq!(events.len(), 4);
        assert!(events[..3].iter().all(|e| matches!(e, StreamEvent::Row { .. })));
        assert!(matches!(&events[3], StreamEvent::Error { message } if message.contains("server closed")));
    }

    #[tokio::test]
    async fn test_empty_result_is_just_done() {
        let driver = Arc::new(MockDriver::with_rows(DriverKind::PostgreSql, vec![]));
        let (engine, _) = engine_with(driver);
        let events = collect(engine.execute(QueryRequest::new("SELECT 1 WHERE false", "pg")).await.unwrap()).await;
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[tokio::test]
    async fn test_introspect_schema_is_idempotent() {
        let driver = Arc::new(
            MockDriver::with_rows(DriverKind::PostgreSql, vec![])
                .with_table("users", "CREATE TABLE users (\n  id integer\n);"),
        );
        let (engine, _) = engine_with(driver);
        let first = engine.introspect_schema("pg").await.unwrap();
        assert_eq!(first, engine.introspect_schema("pg").await.unwrap());
        assert!(first.starts_with("-- PostgreSQL schema"));

        assert!(matches!(
            engine.introspect_schema("missing").await,
            Err(CoreError::ConnectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_unknown_execution() {
        let driver = Arc::new(MockDriver::with_rows(DriverKind::PostgreSql, vec![]));
        let (engine, _) = engine_with(driver);
        assert!(!engine.cancel("nothing-running"));
    }
}

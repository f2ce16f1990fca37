//! Bridge between a connection-owning task and the caller's row stream
//!
//! Driver tasks push `DriverEvent`s into a bounded channel. The caller waits
//! for the first event to learn the shape of the result; a failed send means
//! the consumer went away and the task must stop pulling rows and disconnect.

use futures::stream;
use tokio::sync::mpsc;

use super::error::{DriverError, DriverResult};
use super::traits::{Execution, Row, RowStream};

pub(crate) const ROW_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug)]
pub(crate) enum DriverEvent {
    Row(Row),
    Summary(u64),
    Err(DriverError),
}

pub(crate) fn row_channel() -> (mpsc::Sender<DriverEvent>, mpsc::Receiver<DriverEvent>) {
    mpsc::channel(ROW_CHANNEL_CAPACITY)
}

/// Wait for the first event and turn the channel into an `Execution`
///
/// An error before any row is returned as `Err`; a task that ends without
/// sending anything produced an empty result set.
pub(crate) async fn into_execution(mut rx: mpsc::Receiver<DriverEvent>) -> DriverResult<Execution> {
    match rx.recv().await {
        None => Ok(Execution::Rows(Box::pin(stream::empty()))),
        Some(DriverEvent::Summary(affected_rows)) => Ok(Execution::Summary { affected_rows }),
        Some(DriverEvent::Err(err)) => Err(err),
        Some(DriverEvent::Row(first)) => Ok(Execution::Rows(rows_after(first, rx))),
    }
}

fn rows_after(first: Row, rx: mpsc::Receiver<DriverEvent>) -> RowStream {
    Box::pin(stream::unfold(
        (Some(first), Some(rx)),
        |(pending, rx)| async move {
            if let Some(row) = pending {
                return Some((Ok(row), (None, rx)));
            }
            let mut rx = rx?;
            loop {
                match rx.recv().await? {
                    DriverEvent::Row(row) => return Some((Ok(row), (None, Some(rx)))),
                    // closing the receiver tells the task to stop
                    DriverEvent::Err(err) => return Some((Err(err), (None, None))),
                    DriverEvent::Summary(_) => continue,
                }
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    fn row(id: i64) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), json!(id));
        row
    }

    #[tokio::test]
    async fn test_summary_first() {
        let (tx, rx) = row_channel();
        tx.send(DriverEvent::Summary(3)).await.unwrap();
        drop(tx);
        assert!(matches!(
            into_execution(rx).await.unwrap(),
            Execution::Summary { affected_rows: 3 }
        ));
    }

    #[tokio::test]
    async fn test_error_before_rows() {
        let (tx, rx) = row_channel();
        tx.send(DriverEvent::Err(DriverError::Query("syntax error".into())))
            .await
            .unwrap();
        assert_eq!(
            into_execution(rx).await.unwrap_err(),
            DriverError::Query("syntax error".into())
        );
    }

    #[tokio::test]
    async fn test_empty_result() {
        let (tx, rx) = row_channel();
        drop(tx);
        let Execution::Rows(rows) = into_execution(rx).await.unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(rows.count().await, 0);
    }

    #[tokio::test]
    async fn test_rows_then_error_ends_stream() {
        let (tx, rx) = row_channel();
        tokio::spawn(async move {
            for id in 1..=2 {
                tx.send(DriverEvent::Row(row(id))).await.unwrap();
            }
            tx.send(DriverEvent::Err(DriverError::Query("lost connection".into())))
                .await
                .unwrap();
        });

        let Execution::Rows(rows) = into_execution(rx).await.unwrap() else {
            panic!("expected rows");
        };
        let items: Vec<_> = rows.collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap()["id"], json!(1));
        assert_eq!(items[1].as_ref().unwrap()["id"], json!(2));
        assert!(items[2].is_err());
    }

    #[tokio::test]
    async fn test_dropping_stream_closes_channel() {
        let (tx, rx) = row_channel();
        tx.send(DriverEvent::Row(row(1))).await.unwrap();
        let execution = into_execution(rx).await.unwrap();
        drop(execution);
        assert!(tx.send(DriverEvent::Row(row(2))).await.is_err());
    }
}

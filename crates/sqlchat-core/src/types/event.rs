//! Wire-level events emitted by both streaming pipelines

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::pin::Pin;

use super::conversation::ConversationTurn;

/// One event of a streamed response
///
/// A stream carries at most one `Meta` (conversation pipeline only), then
/// `Token` or `Row`/`Summary` events in producer order, then exactly one
/// terminal `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Meta {
        #[serde(rename = "conversationId")]
        conversation_id: String,
        history: Vec<ConversationTurn>,
    },
    Token {
        text: String,
    },
    Row {
        row: Map<String, Value>,
    },
    Summary {
        #[serde(rename = "affectedRows")]
        affected_rows: u64,
    },
    Error {
        message: String,
    },
    Done,
}

/// Boxed stream of events handed to the transport layer
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

impl StreamEvent {
    pub fn token(text: impl Into<String>) -> Self {
        StreamEvent::Token { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error { .. })
    }

    pub fn as_token(&self) -> Option<&str> {
        match self {
            StreamEvent::Token { text } => Some(text),
            _ => None,
        }
    }

    /// Tagged frame: one JSON object per line with a `type` field.
    ///
    /// Generated text is JSON-escaped, so newlines or delimiter-like content
    /// in a fragment can never split a frame.
    pub fn to_frame(&self) -> String {
        let mut line = serde_json::to_string(self)
            .unwrap_or_else(|e| json!({ "type": "error", "message": e.to_string() }).to_string());
        line.push('\n');
        line
    }

    /// Untagged NDJSON line for the query stream.
    ///
    /// Rows are written as the bare row object, summaries as
    /// `{"affectedRows":n}`, failures as `{"error":"..."}`. `Done` and
    /// conversation-only events have no line; stream close signals success.
    pub fn to_ndjson_line(&self) -> Option<String> {
        let value = match self {
            StreamEvent::Row { row } => Value::Object(row.clone()),
            StreamEvent::Summary { affected_rows } => json!({ "affectedRows": affected_rows }),
            StreamEvent::Error { message } => json!({ "error": message }),
            StreamEvent::Meta { .. } | StreamEvent::Token { .. } | StreamEvent::Done => return None,
        };
        Some(format!("{}\n", value))
    }
}

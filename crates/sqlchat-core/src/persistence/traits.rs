//! Persistence collaborator trait definition

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Conversation, ConversationTurn, DatabaseConnection, Sender, Settings};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl PersistenceError {
    pub fn conversation_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "conversation",
            id: id.into(),
        }
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Storage for conversations, turns, connection records and settings
///
/// Request/response only. Turns of a conversation come back ordered by
/// timestamp; history is append-only from this crate's point of view.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn create_conversation(&self, title: &str) -> PersistenceResult<Conversation>;

    /// Append a turn; the store assigns id and timestamp
    async fn add_message(
        &self,
        conversation_id: &str,
        content: &str,
        sender: Sender,
    ) -> PersistenceResult<ConversationTurn>;

    async fn get_conversation_messages(&self, conversation_id: &str) -> PersistenceResult<Vec<ConversationTurn>>;

    async fn update_conversation_title(&self, conversation_id: &str, title: &str) -> PersistenceResult<()>;

    async fn get_connection_by_id(&self, connection_id: &str) -> PersistenceResult<Option<DatabaseConnection>>;

    async fn get_settings(&self) -> PersistenceResult<Settings>;
}

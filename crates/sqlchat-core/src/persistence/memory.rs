//! In-memory persistence collaborator
//!
//! Backs the server binary and every orchestration test. Timestamps are
//! forced strictly increasing so ordering by timestamp equals insertion order.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use super::traits::{Persistence, PersistenceError, PersistenceResult};
use crate::types::{Conversation, ConversationTurn, DatabaseConnection, Sender, Settings};

#[derive(Default)]
struct State {
    conversations: HashMap<String, Conversation>,
    turns: HashMap<String, Vec<ConversationTurn>>,
    connections: HashMap<String, DatabaseConnection>,
    settings: Settings,
    last_timestamp: Option<DateTime<Utc>>,
}

impl State {
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }
}

#[derive(Default)]
pub struct MemoryPersistence {
    state: RwLock<State>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connections(connections: impl IntoIterator<Item = DatabaseConnection>) -> Self {
        let store = Self::new();
        for connection in connections {
            store.add_connection(connection);
        }
        store
    }

    pub fn add_connection(&self, connection: DatabaseConnection) {
        self.state
            .write()
            .connections
            .insert(connection.id.clone(), connection);
    }

    pub fn set_settings(&self, settings: Settings) {
        self.state.write().settings = settings;
    }

    pub fn get_conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.state.read().conversations.get(conversation_id).cloned()
    }

    /// Conversations, oldest first
    pub fn list_conversations(&self) -> Vec<Conversation> {
        let mut conversations: Vec<_> = self.state.read().conversations.values().cloned().collect();
        conversations.sort_by_key(|c| c.created_at);
        conversations
    }

    /// Turns across every conversation
    pub fn turn_count(&self) -> usize {
        self.state.read().turns.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn create_conversation(&self, title: &str) -> PersistenceResult<Conversation> {
        let mut state = self.state.write();
        let mut conversation = Conversation::new(title);
        conversation.created_at = state.next_timestamp();
        state.turns.insert(conversation.id.clone(), Vec::new());
        state
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        content: &str,
        sender: Sender,
    ) -> PersistenceResult<ConversationTurn> {
        let mut state = self.state.write();
        if !state.conversations.contains_key(conversation_id) {
            return Err(PersistenceError::conversation_not_found(conversation_id));
        }
        let mut turn = ConversationTurn::new(conversation_id, content, sender);
        turn.timestamp = state.next_timestamp();
        state
            .turns
            .entry(conversation_id.to_string())
            .or_default()
            .push(turn.clone());
        Ok(turn)
    }

    async fn get_conversation_messages(&self, conversation_id: &str) -> PersistenceResult<Vec<ConversationTurn>> {
        let state = self.state.read();
        let mut turns = state
            .turns
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| PersistenceError::conversation_not_found(conversation_id))?;
        turns.sort_by_key(|t| t.timestamp);
        Ok(turns)
    }

    async fn update_conversation_title(&self, conversation_id: &str, title: &str) -> PersistenceResult<()> {
        let mut state = self.state.write();
        let conversation = state
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| PersistenceError::conversation_not_found(conversation_id))?;
        conversation.title = title.to_string();
        Ok(())
    }

    async fn get_connection_by_id(&self, connection_id: &str) -> PersistenceResult<Option<DatabaseConnection>> {
        Ok(self.state.read().connections.get(connection_id).cloned())
    }

    async fn get_settings(&self) -> PersistenceResult<Settings> {
        Ok(self.state.read().settings.clone())
    }
}

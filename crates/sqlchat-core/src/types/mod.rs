//! Core types shared by both streaming pipelines
//!
//! Conversation turns and connections are owned by the persistence
//! collaborator; this core only reads them (and appends turns).

mod message;
mod conversation;
mod connection;
mod provider_config;
mod event;
mod cancellation;

pub use message::{ChatMessage, MessageRole};
pub use conversation::{Conversation, ConversationTurn, Sender, Settings};
pub use connection::{DatabaseConnection, DriverKind};
pub use provider_config::{CredentialMode, ProviderConfig, ProviderKind};
pub use event::{EventStream, StreamEvent};
pub use cancellation::CancellationToken;

//! Conversation pipeline
//!
//! Builds prompt context from stored history, drives the selected provider
//! and multiplexes `meta`, token and terminal events onto one stream.

mod context;
mod orchestrator;

pub use context::{build_context_prompt, title_prefix};
pub use orchestrator::{ChatRequest, ConversationOrchestrator, OrchestratorSettings};

//! SqlChat Core
//!
//! Streaming orchestration for natural-language-to-SQL chat.
//! This crate holds everything between an inbound request and a stream of
//! events; the HTTP surface lives in `sqlchat-server`.
//!
//! ## Pipelines
//!
//! - Conversation: utterance in, `meta` + tokens + `done`/`error` out.
//!   Provider adapters translate each backend's streaming protocol into a
//!   uniform fragment stream.
//! - Query: SQL in, rows (or an affected-row summary) out, one request-scoped
//!   database connection per execution.
//!
//! Both pipelines register with a shared [`CancellationCoordinator`] so an
//! out-of-band request can stop an in-flight stream.
//!
//! ```rust,ignore
//! use sqlchat_core::{ChatRequest, ConversationOrchestrator, ProviderConfig};
//!
//! let mut events = orchestrator
//!     .generate_turn(ChatRequest::new("list users", ProviderConfig::new("openai"), "conn-1"))
//!     .await?;
//! while let Some(event) = events.next().await {
//!     print!("{}", event.to_frame());
//! }
//! ```

pub mod types;
pub mod secrets;
pub mod logging;
pub mod config;
pub mod providers;
pub mod drivers;
pub mod classifier;
pub mod cancel;
pub mod error;
pub mod persistence;
pub mod query;
pub mod conversation;

// Re-export commonly used types
pub use types::{
    ChatMessage, MessageRole,
    Conversation, ConversationTurn, Sender, Settings,
    DatabaseConnection, DriverKind,
    CredentialMode, ProviderConfig, ProviderKind,
    EventStream, StreamEvent,
    CancellationToken,
};

pub use secrets::{
    SecretStore, EnvSecretStore, MemorySecretStore,
};

pub use logging::{Logger, NoOpLogger, ConsoleLogger};

pub use config::{CoreConfig, ServerConfig, ConfigError};

pub use providers::{
    Provider, ProviderRegistry, ProviderError, ProviderResult,
    FragmentStream, StreamPacing, ResolvedProvider, resolve_provider_config,
};

pub use drivers::{DatabaseDriver, DriverRegistry, DriverError, Execution, Row};

pub use classifier::{classify_statement, Classification, StatementClass};
pub use cancel::{CancellationCoordinator, CancellationGuard};
pub use error::{CoreError, CoreResult, ErrorStatus};
pub use persistence::{MemoryPersistence, Persistence, PersistenceError};
pub use query::{QueryEngine, QueryExecution, QueryRequest};
pub use conversation::{ChatRequest, ConversationOrchestrator, OrchestratorSettings};

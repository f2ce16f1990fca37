//! Conversation orchestrator
//!
//! Per turn: `ReceivingUtterance → PersistingUserTurn → BuildingContext →
//! AwaitingFirstToken → StreamingTokens → PersistingAssistantTurn →
//! Completed`. Everything up to the first provider response happens before
//! the stream is returned, so those failures surface as a plain `Err`. Once
//! streaming, the caller sees `meta`, then tokens, then exactly one of
//! `done` / `error`.

use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::context::{build_context_prompt, title_prefix};
use crate::cancel::{CancellationCoordinator, CancellationGuard};
use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::logging::Logger;
use crate::persistence::Persistence;
use crate::providers::{resolve_provider_config, FragmentStream, ProviderRegistry};
use crate::secrets::SecretStore;
use crate::types::{EventStream, ProviderConfig, Sender, StreamEvent};

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Inbound generation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub utterance: String,
    pub provider_config: ProviderConfig,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub connection_id: String,
}

impl ChatRequest {
    pub fn new(
        utterance: impl Into<String>,
        provider_config: ProviderConfig,
        connection_id: impl Into<String>,
    ) -> Self {
        Self {
            utterance: utterance.into(),
            provider_config,
            conversation_id: None,
            connection_id: connection_id.into(),
        }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

/// Title lengths and the fallback system prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub system_prompt: String,
    pub new_title_chars: usize,
    pub final_title_chars: usize,
}

impl From<&CoreConfig> for OrchestratorSettings {
    fn from(config: &CoreConfig) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            new_title_chars: config.new_title_chars,
            final_title_chars: config.final_title_chars,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&CoreConfig::default())
    }
}

pub struct ConversationOrchestrator {
    persistence: Arc<dyn Persistence>,
    providers: ProviderRegistry,
    secrets: Arc<dyn SecretStore>,
    coordinator: Arc<CancellationCoordinator>,
    settings: OrchestratorSettings,
    logger: Arc<dyn Logger>,
}

/// What the streaming task needs after the request phase
struct Turn {
    conversation_id: String,
    utterance: String,
    is_new: bool,
    final_title_chars: usize,
}

impl ConversationOrchestrator {
    pub fn new(
        persistence: Arc<dyn Persistence>,
        providers: ProviderRegistry,
        secrets: Arc<dyn SecretStore>,
        coordinator: Arc<CancellationCoordinator>,
        settings: OrchestratorSettings,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            persistence,
            providers,
            secrets,
            coordinator,
            settings,
            logger,
        }
    }

    /// Run one conversational turn and return its event stream
    pub async fn generate_turn(&self, request: ChatRequest) -> CoreResult<EventStream> {
        let provider = self
            .providers
            .get(&request.provider_config.provider)
            .ok_or_else(|| CoreError::UnsupportedProvider(request.provider_config.provider.clone()))?;

        let resolved = resolve_provider_config(&request.provider_config, provider.as_ref(), self.secrets.as_ref())?;

        let connection = self
            .persistence
            .get_connection_by_id(&request.connection_id)
            .await?
            .ok_or_else(|| CoreError::ConnectionNotFound(request.connection_id.clone()))?;

        let stored = self.persistence.get_settings().await?;
        let system_prompt = stored
            .system_prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| self.settings.system_prompt.clone());

        let (conversation_id, is_new) = match &request.conversation_id {
            Some(id) => {
                // surfaces ConversationNotFound before anything is written
                self.persistence.get_conversation_messages(id).await?;
                (id.clone(), false)
            }
            None => {
                let title = title_prefix(&request.utterance, self.settings.new_title_chars);
                let conversation = self.persistence.create_conversation(&title).await?;
                self.logger.debug(&format!(
                    "[ConversationOrchestrator] Created conversation {}",
                    conversation.id
                ));
                (conversation.id, true)
            }
        };

        self.persistence
            .add_message(&conversation_id, &request.utterance, Sender::User)
            .await?;
        let history = self.persistence.get_conversation_messages(&conversation_id).await?;

        let context_prompt = build_context_prompt(&system_prompt, &connection);
        let guard = self.coordinator.register(conversation_id.clone());

        self.logger.info(&format!(
            "[ConversationOrchestrator] Turn for {} via {} (model={}, history={})",
            conversation_id,
            provider.name(),
            resolved.model,
            history.len()
        ));

        let fragments = provider
            .generate(&resolved, &context_prompt, &history, guard.token())
            .await
            .map_err(|e| {
                self.logger.error(&format!(
                    "[ConversationOrchestrator] Provider {} failed before streaming: {}",
                    provider.name(),
                    e
                ));
                CoreError::from(e)
            })?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let turn = Turn {
            conversation_id: conversation_id.clone(),
            utterance: request.utterance,
            is_new,
            final_title_chars: self.settings.final_title_chars,
        };
        let meta = StreamEvent::Meta {
            conversation_id,
            history,
        };

        tokio::spawn(run_turn(
            turn,
            meta,
            fragments,
            guard,
            Arc::clone(&self.persistence),
            Arc::clone(&self.logger),
            tx,
        ));

        Ok(receiver_stream(rx))
    }

    /// Signal the in-flight turn of a conversation
    pub fn cancel(&self, conversation_id: &str) -> bool {
        let signalled = self.coordinator.cancel(conversation_id);
        self.logger.info(&format!(
            "[ConversationOrchestrator] Cancel requested for {} (live: {})",
            conversation_id, signalled
        ));
        signalled
    }

    /// Models served by `provider` at `endpoint`
    pub async fn list_models(&self, provider: &str, endpoint: &str) -> CoreResult<Vec<String>> {
        let adapter = self
            .providers
            .get(provider)
            .ok_or_else(|| CoreError::UnsupportedProvider(provider.to_string()))?;
        Ok(adapter.list_models(endpoint).await?)
    }
}

fn receiver_stream(rx: mpsc::Receiver<StreamEvent>) -> EventStream {
    Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    }))
}

/// Forward fragments, then store the reply and send the terminal event
async fn run_turn(
    turn: Turn,
    meta: StreamEvent,
    mut fragments: FragmentStream,
    guard: CancellationGuard,
    persistence: Arc<dyn Persistence>,
    logger: Arc<dyn Logger>,
    tx: mpsc::Sender<StreamEvent>,
) {
    let mut reply = String::new();
    let mut failure: Option<String> = None;
    let mut receiver_gone = tx.send(meta).await.is_err();

    while !receiver_gone {
        match fragments.next().await {
            Some(Ok(text)) => {
                // a fragment pulled before the cancel arrived is not emitted
                if guard.is_cancelled() {
                    break;
                }
                reply.push_str(&text);
                receiver_gone = tx.send(StreamEvent::Token { text }).await.is_err();
            }
            Some(Err(e)) => {
                logger.error(&format!(
                    "[ConversationOrchestrator] Stream for {} failed: {}",
                    turn.conversation_id, e
                ));
                failure = Some(CoreError::from(e).to_string());
                break;
            }
            None => break,
        }
    }
    drop(fragments);

    if guard.is_cancelled() {
        logger.info(&format!(
            "[ConversationOrchestrator] {} cancelled after {} chars",
            turn.conversation_id,
            reply.len()
        ));
    } else if receiver_gone {
        logger.warn(&format!(
            "[ConversationOrchestrator] Client for {} went away",
            turn.conversation_id
        ));
    }

    if let Err(e) = persist_reply(&turn, &reply, persistence.as_ref()).await {
        logger.error(&format!(
            "[ConversationOrchestrator] Failed to store reply for {}: {}",
            turn.conversation_id, e
        ));
        failure.get_or_insert_with(|| e.to_string());
    }

    drop(guard);
    let terminal = match failure {
        Some(message) => StreamEvent::error(message),
        None => StreamEvent::Done,
    };
    let _ = tx.send(terminal).await;
    logger.debug(&format!(
        "[ConversationOrchestrator] Turn for {} completed",
        turn.conversation_id
    ));
}

/// Partial text is stored too; an empty reply stores nothing
async fn persist_reply(turn: &Turn, reply: &str, persistence: &dyn Persistence) -> CoreResult<()> {
    if !reply.is_empty() {
        persistence
            .add_message(&turn.conversation_id, reply, Sender::System)
            .await?;
    }
    if turn.is_new {
        let title = title_prefix(&turn.utterance, turn.final_title_chars);
        persistence
            .update_conversation_title(&turn.conversation_id, &title)
            .await?;
    }
    Ok(())
}

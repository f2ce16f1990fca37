//! Provider trait definition

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use super::credentials::ResolvedProvider;
use super::error::{ProviderError, ProviderResult};
use super::pacing::StreamPacing;
use crate::types::{CancellationToken, ChatMessage, ConversationTurn};

/// Ordered, finite, non-restartable sequence of generated text fragments
pub type FragmentStream = Pin<Box<dyn Stream<Item = ProviderResult<String>> + Send>>;

/// Where a backend expects the system prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemPromptPlacement {
    /// First message of the list, role `system`
    Inline,
    /// Separate request field; the message list holds only user/assistant turns
    OutOfBand,
}

/// Provider-ready prompt built from the system prompt and stored history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessages {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
}

impl PromptMessages {
    pub fn build(
        placement: SystemPromptPlacement,
        system_prompt: &str,
        history: &[ConversationTurn],
    ) -> Self {
        let turns = history.iter().map(ChatMessage::from);
        match placement {
            SystemPromptPlacement::Inline => Self {
                system: None,
                messages: std::iter::once(ChatMessage::system(system_prompt))
                    .chain(turns)
                    .collect(),
            },
            SystemPromptPlacement::OutOfBand => Self {
                system: Some(system_prompt.to_string()),
                messages: turns.collect(),
            },
        }
    }
}

/// One generative backend
///
/// Implementations only open the backend stream (`open_stream`); the
/// provided `generate` builds the message list, bounds the request with the
/// configured timeout and applies pacing and cancellation uniformly.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Registry identifier (e.g., "openai", "ollama")
    fn name(&self) -> &str;

    /// Endpoint used when neither the request nor the secret store supplies one
    fn default_api_base(&self) -> &str;

    fn default_model(&self) -> Option<&str> {
        None
    }

    fn requires_api_key(&self) -> bool {
        true
    }

    fn system_prompt_placement(&self) -> SystemPromptPlacement {
        SystemPromptPlacement::Inline
    }

    fn pacing(&self) -> &StreamPacing;

    /// Open the backend stream and yield raw text deltas
    async fn open_stream(
        &self,
        config: &ResolvedProvider,
        prompt: PromptMessages,
    ) -> ProviderResult<FragmentStream>;

    fn supports_model_listing(&self) -> bool {
        false
    }

    /// Enumerate models served at `endpoint`
    async fn list_models(&self, _endpoint: &str) -> ProviderResult<Vec<String>> {
        Err(ProviderError::ModelListingUnsupported {
            provider: self.name().to_string(),
        })
    }

    /// Stream a reply for `history`
    async fn generate(
        &self,
        config: &ResolvedProvider,
        system_prompt: &str,
        history: &[ConversationTurn],
        cancel: CancellationToken,
    ) -> ProviderResult<FragmentStream> {
        let prompt = PromptMessages::build(self.system_prompt_placement(), system_prompt, history);
        let pacing = self.pacing().clone();
        let raw = pacing
            .bound_request(self.name(), self.open_stream(config, prompt))
            .await?;
        Ok(pacing.pace(self.name(), raw, cancel))
    }
}

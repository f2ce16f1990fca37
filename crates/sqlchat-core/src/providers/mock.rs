//! Mock provider for testing
//!
//! Deterministic, configurable replies without network access. Records the
//! last prompt it received so tests can assert on context building.

use async_trait::async_trait;
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::credentials::ResolvedProvider;
use super::error::{ProviderError, ProviderResult};
use super::pacing::StreamPacing;
use super::traits::{FragmentStream, PromptMessages, Provider, SystemPromptPlacement};
use crate::logging::Logger;
use crate::types::MessageRole;

/// Mock response mode
#[derive(Debug, Clone)]
pub enum MockMode {
    /// Echo back the last user message, split into chunks
    Echo,
    /// Return exactly these fragments
    Chunks(Vec<String>),
    /// Emit `after` fragments of `chunks`, then fail mid-stream
    Error {
        chunks: Vec<String>,
        after: usize,
        message: String,
    },
    /// Fail before the stream opens
    FailToStart(String),
    /// Open the stream and never produce anything
    Stall,
}

/// Configuration for the mock provider
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub mode: MockMode,
    /// Delay before each fragment, on top of pacing
    pub chunk_delay_ms: u64,
    /// Size of each chunk when splitting echo replies
    pub chunk_size: usize,
    pub placement: SystemPromptPlacement,
    /// When set, each fragment waits for one permit
    pub gate: Option<Arc<Semaphore>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            mode: MockMode::Echo,
            chunk_delay_ms: 0,
            chunk_size: 10,
            placement: SystemPromptPlacement::Inline,
            gate: None,
        }
    }
}

pub struct MockProvider {
    name: String,
    config: MockConfig,
    pacing: StreamPacing,
    last_prompt: Mutex<Option<PromptMessages>>,
    logger: Arc<dyn Logger>,
}

impl MockProvider {
    pub fn with_config(config: MockConfig, pacing: StreamPacing, logger: Arc<dyn Logger>) -> Self {
        Self {
            name: "mock".to_string(),
            config,
            pacing,
            last_prompt: Mutex::new(None),
            logger,
        }
    }

    /// Echo provider with no pacing delay
    pub fn echo(logger: Arc<dyn Logger>) -> Self {
        Self::with_config(MockConfig::default(), StreamPacing::immediate(Duration::from_secs(5)), logger)
    }

    /// Fixed fragments with no pacing delay
    pub fn chunked<S: Into<String>>(chunks: Vec<S>, logger: Arc<dyn Logger>) -> Self {
        Self::with_config(
            MockConfig {
                mode: MockMode::Chunks(chunks.into_iter().map(Into::into).collect()),
                ..Default::default()
            },
            StreamPacing::immediate(Duration::from_secs(5)),
            logger,
        )
    }

    /// Register under another id, e.g. to stand in for "openai"
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into().to_lowercase();
        self
    }

    pub fn with_mode(mut self, mode: MockMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.config.chunk_delay_ms = delay_ms;
        self
    }

    pub fn with_pacing(mut self, pacing: StreamPacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_placement(mut self, placement: SystemPromptPlacement) -> Self {
        self.config.placement = placement;
        self
    }

    /// Hold every fragment until the test adds a permit to `gate`
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.config.gate = Some(gate);
        self
    }

    /// Prompt received by the most recent `open_stream`
    pub fn last_prompt(&self) -> Option<PromptMessages> {
        self.last_prompt.lock().clone()
    }

    fn last_user_message(prompt: &PromptMessages) -> String {
        prompt
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User && !m.content.is_empty())
            .map(|m| m.content.clone())
            .unwrap_or_else(|| "Hello from MockProvider!".to_string())
    }

    fn split_into_chunks(&self, text: &str) -> Vec<String> {
        if self.config.chunk_size == 0 || text.is_empty() {
            return vec![text.to_string()];
        }
        text.chars()
            .collect::<Vec<_>>()
            .chunks(self.config.chunk_size)
            .map(|c| c.iter().collect())
            .collect()
    }

    fn delayed(&self, items: Vec<ProviderResult<String>>) -> FragmentStream {
        let delay = Duration::from_millis(self.config.chunk_delay_ms);
        let gate = self.config.gate.clone();
        Box::pin(stream::iter(items).then(move |item| {
            let gate = gate.clone();
            async move {
                if let Some(gate) = gate {
                    if let Ok(permit) = gate.acquire().await {
                        permit.forget();
                    }
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                item
            }
        }))
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_api_base(&self) -> &str {
        "http://localhost:0/mock"
    }

    fn default_model(&self) -> Option<&str> {
        Some("mock-model")
    }

    fn requires_api_key(&self) -> bool {
        false
    }

    fn system_prompt_placement(&self) -> SystemPromptPlacement {
        self.config.placement
    }

    fn pacing(&self) -> &StreamPacing {
        &self.pacing
    }

    async fn open_stream(
        &self,
        _config: &ResolvedProvider,
        prompt: PromptMessages,
    ) -> ProviderResult<FragmentStream> {
        self.logger.debug(&format!(
            "[MockProvider] open_stream: mode={:?}, messages={}",
            self.config.mode,
            prompt.messages.len()
        ));
        *self.last_prompt.lock() = Some(prompt.clone());

        match &self.config.mode {
            MockMode::Echo => {
                let chunks = self.split_into_chunks(&Self::last_user_message(&prompt));
                Ok(self.delayed(chunks.into_iter().map(Ok).collect()))
            }
            MockMode::Chunks(chunks) => Ok(self.delayed(chunks.iter().cloned().map(Ok).collect())),
            MockMode::Error {
                chunks,
                after,
                message,
            } => {
                let mut items: Vec<ProviderResult<String>> =
                    chunks.iter().take(*after).cloned().map(Ok).collect();
                items.push(Err(ProviderError::stream_error(&self.name, message.clone())));
                Ok(self.delayed(items))
            }
            MockMode::FailToStart(message) => Err(ProviderError::api_error(&self.name, 503, message.clone())),
            MockMode::Stall => Ok(Box::pin(stream::pending::<ProviderResult<String>>())),
        }
    }
}

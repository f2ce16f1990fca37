//! GenaiProvider - one provider type for every built-in backend
//!
//! The backend's [`ProviderKind`] decides the defaults, the system prompt
//! placement, whether calls may go through a proxy, and how the genai
//! client is targeted. Local servers (Ollama, LM Studio) additionally list
//! their models over plain HTTP.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::logging::Logger;
use crate::types::ProviderKind;

use super::credentials::ResolvedProvider;
use super::error::{ProviderError, ProviderResult};
use super::genai_adapter::{
    create_client, native_root, open_chat_stream, openai_compat_root, to_chat_request, GenaiTarget,
};
use super::http::{build_client, join_url, send_checked, ProxyPolicy};
use super::pacing::StreamPacing;
use super::traits::{FragmentStream, PromptMessages, Provider, SystemPromptPlacement};

/// Ollama `/api/tags`
#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// OpenAI-style `/v1/models`
#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

pub struct GenaiProvider {
    kind: ProviderKind,
    pacing: StreamPacing,
    logger: Arc<dyn Logger>,
}

impl GenaiProvider {
    pub fn new(kind: ProviderKind, pacing: StreamPacing, logger: Arc<dyn Logger>) -> Self {
        Self { kind, pacing, logger }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Local inference servers are always reached directly
    pub fn proxy_policy(&self) -> ProxyPolicy {
        match self.kind {
            ProviderKind::Ollama | ProviderKind::LmStudio => ProxyPolicy::Direct,
            _ => ProxyPolicy::ProxyCapable,
        }
    }

    fn http_client(&self, proxy: Option<&str>) -> ProviderResult<reqwest::Client> {
        build_client(self.name(), self.proxy_policy(), proxy, self.pacing.timeout)
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: String) -> ProviderResult<T> {
        let client = self.http_client(None)?;
        let timeout_secs = self.pacing.timeout_secs();

        self.pacing
            .bound_request(self.name(), async {
                let response = send_checked(self.name(), client.get(url), timeout_secs).await?;
                response
                    .json()
                    .await
                    .map_err(|e| ProviderError::invalid_response(self.name(), e.to_string()))
            })
            .await
    }
}

#[async_trait]
impl Provider for GenaiProvider {
    fn name(&self) -> &str {
        self.kind.id()
    }

    fn default_api_base(&self) -> &str {
        match self.kind {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            // every Azure resource has its own host
            ProviderKind::Azure => "",
            ProviderKind::Anthropic => "https://api.anthropic.com/v1",
            ProviderKind::Ollama => "http://localhost:11434",
            ProviderKind::LmStudio => "http://localhost:1234/v1",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    fn default_model(&self) -> Option<&str> {
        match self.kind {
            ProviderKind::OpenAi => Some("gpt-4o-mini"),
            // the deployment name selects the model
            ProviderKind::Azure => None,
            ProviderKind::Anthropic => Some("claude-3-5-sonnet-latest"),
            ProviderKind::Ollama => Some("llama3"),
            // LM Studio answers with whichever model is loaded
            ProviderKind::LmStudio => Some("local-model"),
            ProviderKind::Gemini => Some("gemini-1.5-flash"),
        }
    }

    fn requires_api_key(&self) -> bool {
        !matches!(self.kind, ProviderKind::Ollama | ProviderKind::LmStudio)
    }

    fn system_prompt_placement(&self) -> SystemPromptPlacement {
        match self.kind {
            ProviderKind::Anthropic | ProviderKind::Gemini => SystemPromptPlacement::OutOfBand,
            _ => SystemPromptPlacement::Inline,
        }
    }

    fn pacing(&self) -> &StreamPacing {
        &self.pacing
    }

    async fn open_stream(
        &self,
        config: &ResolvedProvider,
        prompt: PromptMessages,
    ) -> ProviderResult<FragmentStream> {
        let target = GenaiTarget::for_provider(self.kind, config)?;

        if config.proxy.is_some() && self.proxy_policy() == ProxyPolicy::Direct {
            self.logger.debug(&format!(
                "[GenaiProvider] Proxy ignored for local provider {}",
                self.name()
            ));
        }
        let http = self.http_client(config.proxy.as_deref())?;

        self.logger.info(&format!(
            "[GenaiProvider] Starting stream: provider={}, model={}, messages={}",
            self.name(),
            config.model,
            prompt.messages.len()
        ));

        let client = create_client(http, target);
        open_chat_stream(
            self.name(),
            client,
            &config.model,
            to_chat_request(prompt),
            self.pacing.timeout_secs(),
        )
        .await
        .inspect_err(|e| self.logger.error(&format!("[GenaiProvider] Stream failed to open: {}", e)))
    }

    fn supports_model_listing(&self) -> bool {
        matches!(self.kind, ProviderKind::Ollama | ProviderKind::LmStudio)
    }

    async fn list_models(&self, endpoint: &str) -> ProviderResult<Vec<String>> {
        let base = if endpoint.trim().is_empty() {
            self.default_api_base()
        } else {
            endpoint
        };
        self.logger.debug(&format!("[GenaiProvider] Listing {} models at {}", self.name(), base));

        match self.kind {
            ProviderKind::Ollama => {
                let tags: TagsResponse = self.fetch_json(join_url(&native_root(base), "api/tags")).await?;
                Ok(tags.models.into_iter().map(|m| m.name).collect())
            }
            ProviderKind::LmStudio => {
                let models: ModelsResponse =
                    self.fetch_json(join_url(&openai_compat_root(base), "models")).await?;
                Ok(models.data.into_iter().map(|m| m.id).collect())
            }
            _ => Err(ProviderError::ModelListingUnsupported {
                provider: self.name().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NoOpLogger;
    use crate::providers::test_server::{serve_once, CannedResponse};
    use crate::types::ChatMessage;
    use futures::StreamExt;

    fn provider(kind: ProviderKind) -> GenaiProvider {
        GenaiProvider::new(kind, StreamPacing::default(), Arc::new(NoOpLogger))
    }

    fn prompt_for(provider: &GenaiProvider) -> PromptMessages {
        let history = [crate::types::ConversationTurn::new(
            "c",
            "list users",
            crate::types::Sender::User,
        )];
        PromptMessages::build(provider.system_prompt_placement(), "Write SQL.", &history)
    }

    async fn collect(stream: FragmentStream) -> Vec<ProviderResult<String>> {
        stream.collect().await
    }

    const OPENAI_SSE: &str = concat!(
        "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"SELECT \"}}]}\n\n",
        "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"1;\"}}]}\n\n",
        "data: [DONE]\n\n",
    );

    #[test]
    fn test_provider_table() {
        let anthropic = provider(ProviderKind::Anthropic);
        assert_eq!(anthropic.name(), "anthropic");
        assert_eq!(anthropic.system_prompt_placement(), SystemPromptPlacement::OutOfBand);
        assert_eq!(anthropic.proxy_policy(), ProxyPolicy::ProxyCapable);
        assert!(anthropic.requires_api_key());
        assert!(!anthropic.supports_model_listing());

        let ollama = provider(ProviderKind::Ollama);
        assert_eq!(ollama.system_prompt_placement(), SystemPromptPlacement::Inline);
        assert_eq!(ollama.proxy_policy(), ProxyPolicy::Direct);
        assert!(!ollama.requires_api_key());
        assert!(ollama.supports_model_listing());

        let azure = provider(ProviderKind::Azure);
        assert_eq!(azure.default_model(), None);
        assert_eq!(azure.default_api_base(), "");

        let gemini = provider(ProviderKind::Gemini);
        assert_eq!(gemini.default_model(), Some("gemini-1.5-flash"));
        assert_eq!(gemini.system_prompt_placement(), SystemPromptPlacement::OutOfBand);
    }

    #[tokio::test]
    async fn test_openai_streams_deltas_with_bearer_auth() {
        let (base, request) = serve_once(CannedResponse::sse(OPENAI_SSE)).await;
        let openai = provider(ProviderKind::OpenAi);
        let config = ResolvedProvider::new("openai", format!("{}/v1", base), "gpt-4o-mini").with_api_key("sk-test");

        let stream = openai.open_stream(&config, prompt_for(&openai)).await.unwrap();
        let fragments: Vec<String> = collect(stream).await.into_iter().map(Result::unwrap).collect();
        assert_eq!(fragments, vec!["SELECT ", "1;"]);

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /v1/chat/completions "));
        assert!(request.to_lowercase().contains("authorization: bearer sk-test"));
        assert!(request.contains("\"role\":\"system\""));
        assert!(request.contains("Write SQL."));
    }

    #[tokio::test]
    async fn test_azure_uses_deployment_url_and_api_key_header() {
        let (base, request) = serve_once(CannedResponse::sse(OPENAI_SSE)).await;
        let azure = provider(ProviderKind::Azure);
        let mut config = ResolvedProvider::new("azure", base, "sql prod").with_api_key("az-key");
        config.api_version = Some("2024-06-01".into());

        let stream = azure.open_stream(&config, prompt_for(&azure)).await.unwrap();
        assert_eq!(collect(stream).await.len(), 2);

        let request = request.await.unwrap();
        assert!(request.starts_with(
            "POST /openai/deployments/sql%20prod/chat/completions?api-version=2024-06-01 "
        ));
        assert!(request.to_lowercase().contains("api-key: az-key"));
        assert!(!request.to_lowercase().contains("authorization:"));
    }

    #[tokio::test]
    async fn test_anthropic_sends_system_out_of_band() {
        let body = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"m1\",\"usage\":{\"input_tokens\":3,\"output_tokens\":0}}}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"SELECT id\"}}\n\n",
            "event: content_block_stop\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
            "event: message_delta\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":2}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        let (base, request) = serve_once(CannedResponse::sse(body)).await;
        let anthropic = provider(ProviderKind::Anthropic);
        let config = ResolvedProvider::new("anthropic", base, "claude-3-5-sonnet-latest").with_api_key("ak");

        let stream = anthropic.open_stream(&config, prompt_for(&anthropic)).await.unwrap();
        let fragments: Vec<String> = collect(stream).await.into_iter().map(Result::unwrap).collect();
        assert_eq!(fragments.concat(), "SELECT id");

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /messages "));
        assert!(request.to_lowercase().contains("x-api-key: ak"));
        assert!(request.contains("\"system\":\"Write SQL.\""));
    }

    #[tokio::test]
    async fn test_ollama_goes_through_openai_compatible_route() {
        let (base, request) = serve_once(CannedResponse::sse(OPENAI_SSE)).await;
        let ollama = provider(ProviderKind::Ollama);
        let config = ResolvedProvider::new("ollama", base, "llama3");

        let stream = ollama.open_stream(&config, prompt_for(&ollama)).await.unwrap();
        assert_eq!(collect(stream).await.len(), 2);

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /v1/chat/completions "));
        assert!(request.contains("\"model\":\"llama3\""));
    }

    #[tokio::test]
    async fn test_non_success_status_fails_before_streaming() {
        let (base, _request) = serve_once(CannedResponse::status(
            401,
            r#"{"error":{"message":"Incorrect API key provided"}}"#,
        ))
        .await;
        let lmstudio = provider(ProviderKind::LmStudio);
        let config = ResolvedProvider::new("lmstudio", base, "local-model");

        let err = match lmstudio.open_stream(&config, prompt_for(&lmstudio)).await {
            Err(e) => e,
            Ok(_) => panic!("expected the request to fail"),
        };
        match err {
            ProviderError::ApiError { status, message, .. } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_in_stream_error_after_first_fragment() {
        let body = concat!(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"SELECT\"}}]}\n\n",
            "data: {not json\n\n",
        );
        let (base, _request) = serve_once(CannedResponse::sse(body)).await;
        let lmstudio = provider(ProviderKind::LmStudio);
        let config = ResolvedProvider::new("lmstudio", base, "local-model");

        let items = collect(lmstudio.open_stream(&config, prompt_for(&lmstudio)).await.unwrap()).await;
        assert_eq!(items[0].as_deref().unwrap(), "SELECT");
        assert!(items.iter().skip(1).any(|item| item.is_err()));
    }

    #[tokio::test]
    async fn test_ollama_lists_tags() {
        let (base, request) = serve_once(CannedResponse::json(
            r#"{"models":[{"name":"llama3:latest","size":1},{"name":"sqlcoder:7b"}]}"#,
        ))
        .await;

        let models = provider(ProviderKind::Ollama).list_models(&format!("{}/v1", base)).await.unwrap();
        assert_eq!(models, vec!["llama3:latest", "sqlcoder:7b"]);
        assert!(request.await.unwrap().starts_with("GET /api/tags "));
    }

    #[tokio::test]
    async fn test_lmstudio_lists_models() {
        let (base, request) = serve_once(CannedResponse::json(
            r#"{"object":"list","data":[{"id":"qwen2.5-coder-7b","object":"model"},{"id":"llama-3.2-3b"}]}"#,
        ))
        .await;

        let models = provider(ProviderKind::LmStudio).list_models(&base).await.unwrap();
        assert_eq!(models, vec!["qwen2.5-coder-7b", "llama-3.2-3b"]);
        assert!(request.await.unwrap().starts_with("GET /v1/models "));
    }

    #[tokio::test]
    async fn test_model_listing_failure_keeps_status() {
        let (base, _request) = serve_once(CannedResponse::status(503, "Service Unavailable")).await;
        let err = provider(ProviderKind::Ollama).list_models(&base).await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_listing_unsupported_for_hosted_backends() {
        let err = provider(ProviderKind::OpenAi).list_models("").await.unwrap_err();
        assert!(matches!(err, ProviderError::ModelListingUnsupported { .. }));
    }

    #[test]
    fn test_message_shape_for_inline_backends() {
        let openai = provider(ProviderKind::OpenAi);
        let prompt = prompt_for(&openai);
        assert_eq!(prompt.messages[0], ChatMessage::system("Write SQL."));
    }
}

//! Adapter between sqlchat types and genai types
//!
//! Every backend is reached through a genai `Client` built for one call:
//! the reqwest client carries the proxy policy, an `AuthResolver` hands over
//! the key resolved by `resolve_provider_config` (never genai's environment
//! lookup) and a `ServiceTargetResolver` pins the endpoint and adapter kind.
//! Azure's deployment URL and `api-key` header go through
//! `AuthData::RequestOverride`.

use std::future::Future;
use std::pin::Pin;

use futures::{stream, StreamExt};
use genai::chat::{ChatMessage as GenaiMessage, ChatRequest, ChatRole as GenaiRole, ChatStreamEvent};
use genai::resolver::{AuthData, AuthResolver, Endpoint, ServiceTargetResolver};
use genai::{adapter::AdapterKind, BoxError, Client, Headers, ModelIden, ServiceTarget};

use crate::types::{ChatMessage, MessageRole, ProviderKind};

use super::credentials::ResolvedProvider;
use super::error::{ProviderError, ProviderResult};
use super::http::error_message;
use super::traits::{FragmentStream, PromptMessages};

pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";

/// Convert a MessageRole to a genai ChatRole
pub fn to_genai_role(role: MessageRole) -> GenaiRole {
    match role {
        MessageRole::System => GenaiRole::System,
        MessageRole::User => GenaiRole::User,
        MessageRole::Assistant => GenaiRole::Assistant,
    }
}

pub fn to_genai_message(msg: ChatMessage) -> GenaiMessage {
    match msg.role {
        MessageRole::System => GenaiMessage::system(msg.content),
        MessageRole::User => GenaiMessage::user(msg.content),
        MessageRole::Assistant => GenaiMessage::assistant(msg.content),
    }
}

/// Build a genai request, keeping an out-of-band system prompt out of the list
pub fn to_chat_request(prompt: PromptMessages) -> ChatRequest {
    let messages: Vec<GenaiMessage> = prompt.messages.into_iter().map(to_genai_message).collect();
    let request = ChatRequest::new(messages);
    match prompt.system {
        Some(system) => request.with_system(system),
        None => request,
    }
}

/// Text carried by a stream event; lifecycle and reasoning events carry none
pub fn from_genai_event(event: ChatStreamEvent) -> Option<String> {
    match event {
        ChatStreamEvent::Chunk(chunk) if !chunk.content.is_empty() => Some(chunk.content),
        _ => None,
    }
}

/// Map a genai failure, keeping the backend's HTTP status when there is one
pub fn from_genai_error(provider: &str, err: genai::Error, timeout_secs: u64) -> ProviderError {
    match err {
        genai::Error::HttpError { status, body, .. } => {
            ProviderError::api_error(provider, status.as_u16(), error_message(&body))
        }
        genai::Error::WebStream { error, .. } => from_stream_cause(provider, error, timeout_secs),
        genai::Error::WebModelCall { webc_error, .. } | genai::Error::WebAdapterCall { webc_error, .. } => {
            from_webc_error(provider, webc_error, timeout_secs)
        }
        genai::Error::ChatResponse { body, .. } => {
            ProviderError::stream_error(provider, error_message(&body.to_string()))
        }
        genai::Error::StreamParse { serde_error, .. } => {
            ProviderError::invalid_response(provider, format!("bad stream payload: {}", serde_error))
        }
        other => ProviderError::stream_error(provider, other.to_string()),
    }
}

fn from_webc_error(provider: &str, err: genai::webc::Error, timeout_secs: u64) -> ProviderError {
    match err {
        genai::webc::Error::ResponseFailedStatus { status, body, .. } => {
            ProviderError::api_error(provider, status.as_u16(), error_message(&body))
        }
        genai::webc::Error::Reqwest(e) => ProviderError::from_reqwest(provider, e, timeout_secs),
        other => ProviderError::invalid_response(provider, other.to_string()),
    }
}

/// The web stream boxes either a genai `HttpError` (non-2xx) or a reqwest error
fn from_stream_cause(provider: &str, error: BoxError, timeout_secs: u64) -> ProviderError {
    let error = match error.downcast::<genai::Error>() {
        Ok(inner) => return from_genai_error(provider, *inner, timeout_secs),
        Err(error) => error,
    };
    match error.downcast::<reqwest::Error>() {
        Ok(e) => ProviderError::from_reqwest(provider, *e, timeout_secs),
        Err(e) => ProviderError::stream_error(provider, e.to_string()),
    }
}

/// genai joins paths onto the endpoint, so it must end with a slash
fn endpoint_url(endpoint: &str) -> String {
    format!("{}/", endpoint.trim().trim_end_matches('/'))
}

/// OpenAI-compatible root of a local server: accepts `http://host:port` and `http://host:port/v1`
pub fn openai_compat_root(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{}/v1", trimmed)
    }
}

/// Native (non-`/v1`) root of a local server
pub fn native_root(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    trimmed.strip_suffix("/v1").unwrap_or(trimmed).to_string()
}

/// `<endpoint>/openai/deployments/<deployment>/chat/completions?api-version=<v>`
pub fn azure_completions_url(config: &ResolvedProvider) -> ProviderResult<String> {
    let mut url = reqwest::Url::parse(config.endpoint.trim())
        .map_err(|e| ProviderError::config("azure", format!("invalid endpoint: {}", e)))?;

    url.path_segments_mut()
        .map_err(|()| ProviderError::config("azure", "endpoint cannot carry a path"))?
        .pop_if_empty()
        .extend(["openai", "deployments", config.model.as_str(), "chat", "completions"]);

    url.query_pairs_mut().append_pair(
        "api-version",
        config.api_version.as_deref().unwrap_or(DEFAULT_AZURE_API_VERSION),
    );
    Ok(url.to_string())
}

/// Where and how one genai call is sent
#[derive(Clone)]
pub struct GenaiTarget {
    pub adapter_kind: AdapterKind,
    pub endpoint: String,
    pub auth: AuthData,
}

impl GenaiTarget {
    pub fn for_provider(kind: ProviderKind, config: &ResolvedProvider) -> ProviderResult<Self> {
        let keyed = |adapter_kind| -> ProviderResult<Self> {
            Ok(Self {
                adapter_kind,
                endpoint: endpoint_url(&config.endpoint),
                auth: AuthData::from_single(config.require_api_key()?),
            })
        };
        // local servers ignore the bearer value but genai always sends one
        let local_key = |fallback: &str| config.api_key.clone().unwrap_or_else(|| fallback.to_string());

        match kind {
            ProviderKind::OpenAi => keyed(AdapterKind::OpenAI),
            ProviderKind::Anthropic => keyed(AdapterKind::Anthropic),
            ProviderKind::Gemini => keyed(AdapterKind::Gemini),
            ProviderKind::Azure => {
                let key = config.require_api_key()?;
                Ok(Self {
                    adapter_kind: AdapterKind::OpenAI,
                    endpoint: endpoint_url(&config.endpoint),
                    auth: AuthData::RequestOverride {
                        url: azure_completions_url(config)?,
                        headers: Headers::from(("api-key", key)),
                    },
                })
            }
            ProviderKind::Ollama => Ok(Self {
                adapter_kind: AdapterKind::Ollama,
                endpoint: endpoint_url(&openai_compat_root(&config.endpoint)),
                auth: AuthData::from_single(local_key("ollama")),
            }),
            ProviderKind::LmStudio => Ok(Self {
                adapter_kind: AdapterKind::OpenAI,
                endpoint: endpoint_url(&openai_compat_root(&config.endpoint)),
                auth: AuthData::from_single(local_key("lm-studio")),
            }),
        }
    }
}

/// Create a genai Client bound to one resolved provider call
pub fn create_client(http: reqwest::Client, target: GenaiTarget) -> Client {
    let GenaiTarget { adapter_kind, endpoint, auth } = target;

    let auth_resolver = AuthResolver::from_resolver_async_fn(
        move |_model_iden: ModelIden| -> Pin<Box<dyn Future<Output = genai::resolver::Result<Option<AuthData>>> + Send>> {
            let auth = auth.clone();
            Box::pin(async move { Ok(Some(auth)) })
        },
    );

    let target_resolver = ServiceTargetResolver::from_resolver_fn(
        move |target: ServiceTarget| -> Result<ServiceTarget, genai::resolver::Error> {
            let ServiceTarget { model, auth, .. } = target;
            Ok(ServiceTarget {
                endpoint: Endpoint::from_owned(endpoint.clone()),
                auth,
                model: ModelIden::new(adapter_kind, model.model_name),
            })
        },
    );

    Client::builder()
        .with_reqwest(http)
        .with_auth_resolver(auth_resolver)
        .with_service_target_resolver(target_resolver)
        .build()
}

/// Start a streamed chat and wait for the backend's first answer
///
/// genai returns before the HTTP exchange; the first fragment (or failure)
/// is pulled here so a rejected request surfaces as an error from the
/// request phase rather than from inside the stream.
pub async fn open_chat_stream(
    provider: &str,
    client: Client,
    model: &str,
    request: ChatRequest,
    timeout_secs: u64,
) -> ProviderResult<FragmentStream> {
    let response = client
        .exec_chat_stream(model, request, None)
        .await
        .map_err(|e| from_genai_error(provider, e, timeout_secs))?;

    let name = provider.to_string();
    let mut fragments = response
        .stream
        .filter_map(move |event| {
            let fragment = match event {
                Ok(event) => from_genai_event(event).map(Ok),
                Err(e) => Some(Err(from_genai_error(&name, e, timeout_secs))),
            };
            futures::future::ready(fragment)
        })
        .boxed();

    match fragments.next().await {
        Some(Ok(first)) => Ok(Box::pin(stream::once(async move { Ok(first) }).chain(fragments))),
        Some(Err(e)) => Err(e),
        None => Ok(Box::pin(stream::empty())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_conversion() {
        assert!(matches!(to_genai_role(MessageRole::System), GenaiRole::System));
        assert!(matches!(to_genai_role(MessageRole::User), GenaiRole::User));
        assert!(matches!(to_genai_role(MessageRole::Assistant), GenaiRole::Assistant));
    }

    #[test]
    fn test_message_conversion() {
        let genai_msg = to_genai_message(ChatMessage::assistant("SELECT 1;"));
        assert!(matches!(genai_msg.role, GenaiRole::Assistant));
    }

    #[test]
    fn test_chat_request_system_out_of_band() {
        let prompt = PromptMessages {
            system: Some("you write SQL".into()),
            messages: vec![ChatMessage::user("list users")],
        };
        let request = to_chat_request(prompt);
        assert_eq!(request.system.as_deref(), Some("you write SQL"));
        assert_eq!(request.messages.len(), 1);
    }

    #[test]
    fn test_endpoint_roots() {
        assert_eq!(
            endpoint_url("https://generativelanguage.googleapis.com/v1beta"),
            "https://generativelanguage.googleapis.com/v1beta/"
        );
        assert_eq!(endpoint_url("http://gw.local/"), "http://gw.local/");

        assert_eq!(openai_compat_root("http://localhost:1234"), "http://localhost:1234/v1");
        assert_eq!(openai_compat_root(" http://10.0.0.5:1234/v1/ "), "http://10.0.0.5:1234/v1");
        assert_eq!(native_root("http://localhost:11434/v1"), "http://localhost:11434");
        assert_eq!(native_root("http://localhost:11434/"), "http://localhost:11434");
    }

    #[test]
    fn test_azure_completions_url() {
        let mut config = ResolvedProvider::new("azure", "https://res.openai.azure.com", "gpt4o-prod");
        assert_eq!(
            azure_completions_url(&config).unwrap(),
            "https://res.openai.azure.com/openai/deployments/gpt4o-prod/chat/completions?api-version=2024-02-01"
        );

        config.api_version = Some("2024-06-01".into());
        assert!(azure_completions_url(&config).unwrap().ends_with("api-version=2024-06-01"));
    }

    #[test]
    fn test_azure_url_encodes_deployment_and_version() {
        let mut config = ResolvedProvider::new("azure", "https://res.openai.azure.com/", "gpt 4o/prod?x");
        config.api_version = Some("2024-06-01&debug=1".into());
        assert_eq!(
            azure_completions_url(&config).unwrap(),
            "https://res.openai.azure.com/openai/deployments/gpt%204o%2Fprod%3Fx/chat/completions?api-version=2024-06-01%26debug%3D1"
        );
    }

    #[test]
    fn test_azure_url_rejects_bad_endpoint() {
        let config = ResolvedProvider::new("azure", "not a url", "gpt4o");
        assert!(matches!(azure_completions_url(&config), Err(ProviderError::Config { .. })));
    }

    #[test]
    fn test_keyed_targets_require_a_key() {
        let config = ResolvedProvider::new("anthropic", "https://api.anthropic.com/v1", "claude");
        let err = GenaiTarget::for_provider(ProviderKind::Anthropic, &config).err();
        assert!(matches!(err, Some(ProviderError::MissingApiKey { .. })));

        let target = GenaiTarget::for_provider(ProviderKind::Ollama, &config).unwrap();
        assert!(matches!(target.adapter_kind, AdapterKind::Ollama));
        assert_eq!(target.endpoint, "https://api.anthropic.com/v1/");
    }

    #[test]
    fn test_http_error_keeps_status() {
        let err = genai::Error::HttpError {
            status: reqwest::StatusCode::UNAUTHORIZED,
            canonical_reason: "Unauthorized".into(),
            body: r#"{"error":{"message":"Incorrect API key provided"}}"#.into(),
        };
        let boxed: BoxError = Box::new(err);
        let mapped = from_stream_cause("openai", boxed, 10);
        assert_eq!(mapped.to_string(), "openai API error (401): Incorrect API key provided");
    }
}

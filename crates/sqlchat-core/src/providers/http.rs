//! reqwest plumbing: the client handed to genai and plain JSON requests for model listing

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;

use super::error::{ProviderError, ProviderResult};

/// Whether an adapter's outbound calls may go through a proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyPolicy {
    /// Hosted backends: explicit proxy, else the system proxy variables
    ProxyCapable,
    /// Local inference servers: always connect directly
    Direct,
}

/// Build a client for one request
pub fn build_client(
    provider: &str,
    policy: ProxyPolicy,
    proxy: Option<&str>,
    connect_timeout: Duration,
) -> ProviderResult<Client> {
    let mut builder = Client::builder().connect_timeout(connect_timeout);

    builder = match (policy, proxy) {
        (ProxyPolicy::Direct, _) => builder.no_proxy(),
        (ProxyPolicy::ProxyCapable, Some(url)) => {
            let proxy = reqwest::Proxy::all(url)
                .map_err(|e| ProviderError::config(provider, format!("invalid proxy URL: {}", e)))?;
            builder.proxy(proxy)
        }
        (ProxyPolicy::ProxyCapable, None) => builder,
    };

    builder
        .build()
        .map_err(|e| ProviderError::transport(provider, e.to_string()))
}

/// Send a request and turn non-2xx answers into `ProviderError::ApiError`
pub async fn send_checked(
    provider: &str,
    request: RequestBuilder,
    timeout_secs: u64,
) -> ProviderResult<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(provider, e, timeout_secs))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::api_error(
        provider,
        status.as_u16(),
        error_message(&body),
    ))
}

/// Pull a readable message out of an error body
///
/// Understands `{"error":{"message":..}}`, `{"error":".."}` and
/// `{"message":..}`; falls back to the (truncated) raw body.
pub fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let candidates = [
            value.pointer("/error/message"),
            value.get("error"),
            value.get("message"),
        ];
        if let Some(msg) = candidates.into_iter().flatten().find_map(Value::as_str) {
            return msg.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(300).collect()
}

/// Join a base URL and a path with exactly one slash
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

//! Resolution of a request's `ProviderConfig` into concrete call parameters
//!
//! `built-in` mode reads credentials from the server's secret store under
//! provider-scoped keys (`<id>`, `<id>_endpoint`, `<id>_model`,
//! `<id>_api_version`, `<id>_proxy`); `user-supplied` mode takes them from
//! the request. Either way, missing values fall back to the adapter's
//! defaults, and a key-requiring adapter without a key is rejected here,
//! before anything is persisted.

use super::error::{ProviderError, ProviderResult};
use super::traits::Provider;
use crate::secrets::SecretStore;
use crate::types::{CredentialMode, ProviderConfig};

/// Concrete parameters for one provider call
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    pub provider_id: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub api_version: Option<String>,
    pub proxy: Option<String>,
}

impl ResolvedProvider {
    /// Parameters for keyless calls (model listing, tests)
    pub fn new(provider_id: impl Into<String>, endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            endpoint: endpoint.into(),
            api_key: None,
            model: model.into(),
            api_version: None,
            proxy: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// API key, or `MissingApiKey` for this provider
    pub fn require_api_key(&self) -> ProviderResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::missing_api_key(&self.provider_id))
    }
}

impl std::fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("provider_id", &self.provider_id)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("api_version", &self.api_version)
            .field("proxy", &self.proxy)
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Resolve `config` against `provider`'s defaults and the secret store
pub fn resolve_provider_config(
    config: &ProviderConfig,
    provider: &dyn Provider,
    secrets: &dyn SecretStore,
) -> ProviderResult<ResolvedProvider> {
    let id = provider.name().to_string();
    let secret = |suffix: &str| {
        let key = if suffix.is_empty() {
            id.clone()
        } else {
            format!("{}_{}", id, suffix)
        };
        non_empty(secrets.get(&key))
    };

    let (endpoint, api_key, model, api_version, proxy) = match config.mode {
        CredentialMode::BuiltIn => (
            secret("endpoint"),
            secret(""),
            non_empty(config.model.clone()).or_else(|| secret("model")),
            non_empty(config.api_version.clone()).or_else(|| secret("api_version")),
            secret("proxy").or_else(|| non_empty(config.proxy.clone())),
        ),
        CredentialMode::UserSupplied => (
            non_empty(config.endpoint.clone()),
            non_empty(config.api_key.clone()),
            non_empty(config.model.clone()),
            non_empty(config.api_version.clone()),
            non_empty(config.proxy.clone()),
        ),
    };

    let endpoint = endpoint
        .or_else(|| non_empty(Some(provider.default_api_base().to_string())))
        .ok_or_else(|| ProviderError::config(&id, "no endpoint configured"))?;

    let model = model
        .or_else(|| provider.default_model().map(str::to_string))
        .ok_or_else(|| ProviderError::config(&id, "no model configured"))?;

    if provider.requires_api_key() && api_key.is_none() {
        return Err(ProviderError::missing_api_key(&id));
    }

    Ok(ResolvedProvider {
        provider_id: id,
        endpoint: endpoint.trim_end_matches('/').to_string(),
        api_key,
        model,
        api_version,
        proxy,
    })
}

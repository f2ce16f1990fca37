//! Per-request provider selection

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Generative backends with a built-in adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Azure,
    Anthropic,
    Ollama,
    LmStudio,
    Gemini,
}

impl ProviderKind {
    /// Registry identifier
    pub fn id(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Azure => "azure",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Ollama => "ollama",
            ProviderKind::LmStudio => "lmstudio",
            ProviderKind::Gemini => "gemini",
        }
    }

    pub fn all() -> [ProviderKind; 6] {
        [
            ProviderKind::OpenAi,
            ProviderKind::Azure,
            ProviderKind::Anthropic,
            ProviderKind::Ollama,
            ProviderKind::LmStudio,
            ProviderKind::Gemini,
        ]
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim().to_lowercase();
        ProviderKind::all()
            .into_iter()
            .find(|k| k.id() == id)
            .ok_or(id)
    }
}

/// Where a provider's credentials come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialMode {
    /// Server-side secrets (environment / secret store)
    #[default]
    BuiltIn,
    /// Values carried on the request itself
    UserSupplied,
}

/// Provider parameters carried by a generation request
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Provider selector, matched case-insensitively against the registry
    pub provider: String,
    #[serde(default)]
    pub mode: CredentialMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Outbound proxy URL for adapters that honor one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl ProviderConfig {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Default::default()
        }
    }

    /// Normalized registry identifier
    pub fn provider_id(&self) -> String {
        self.provider.trim().to_lowercase()
    }

    pub fn user_supplied(mut self) -> Self {
        self.mode = CredentialMode::UserSupplied;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("mode", &self.mode)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("api_version", &self.api_version)
            .field("proxy", &self.proxy)
            .finish()
    }
}

//! Provider error types

use thiserror::Error;

/// Errors that can occur during provider operations
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Missing API key
    #[error("API key is required for {provider}")]
    MissingApiKey { provider: String },

    /// Endpoint or model could not be determined, or a setting is malformed
    #[error("{provider} is misconfigured: {message}")]
    Config { provider: String, message: String },

    /// Backend answered with a non-success status
    #[error("{provider} API error ({status}): {message}")]
    ApiError {
        provider: String,
        status: u16,
        message: String,
    },

    /// Connection failure, reset, TLS error
    #[error("{provider} transport error: {message}")]
    Transport { provider: String, message: String },

    /// No response or no fragment within the configured bound
    #[error("{provider} timed out after {seconds}s")]
    Timeout { provider: String, seconds: u64 },

    /// Payload could not be decoded
    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    /// Backend reported an error inside an open stream
    #[error("{provider} stream error: {message}")]
    StreamError { provider: String, message: String },

    #[error("{provider} does not support model listing")]
    ModelListingUnsupported { provider: String },

    /// Request was cancelled
    #[error("Request cancelled")]
    Cancelled,
}

impl ProviderError {
    pub fn api_error(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    pub fn missing_api_key(provider: impl Into<String>) -> Self {
        Self::MissingApiKey {
            provider: provider.into(),
        }
    }

    pub fn config(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn transport(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn timeout(provider: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            provider: provider.into(),
            seconds,
        }
    }

    pub fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn stream_error(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StreamError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Map a reqwest failure, keeping timeouts distinguishable
    pub fn from_reqwest(provider: &str, err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::timeout(provider, timeout_secs)
        } else {
            Self::transport(provider, err.to_string())
        }
    }

    /// Provider that produced the error, when known
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::MissingApiKey { provider }
            | Self::Config { provider, .. }
            | Self::ApiError { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::InvalidResponse { provider, .. }
            | Self::StreamError { provider, .. }
            | Self::ModelListingUnsupported { provider } => Some(provider),
            Self::Cancelled => None,
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

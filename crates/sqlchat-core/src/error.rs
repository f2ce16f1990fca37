//! Error taxonomy exposed to callers of the query and conversation pipelines

use serde::Serialize;
use thiserror::Error;

use crate::drivers::DriverError;
use crate::persistence::PersistenceError;
use crate::providers::ProviderError;

/// Prefix shared by every backend failure, whichever provider produced it
pub const PROVIDER_ERROR_PREFIX: &str = "Model backend request failed: ";

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Model backend request failed: {0}")]
    Provider(ProviderError),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Unsupported database driver: {0}")]
    UnsupportedDriver(String),

    #[error("Query execution failed: {0}")]
    QueryExecution(String),

    #[error("Schema introspection failed: {0}")]
    SchemaIntrospection(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Coarse classification of a failure reported before streaming began
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStatus {
    BadRequest,
    Unauthorized,
    NotFound,
    Unavailable,
    Internal,
}

impl ErrorStatus {
    /// Matching HTTP status code
    pub fn http_code(&self) -> u16 {
        match self {
            ErrorStatus::BadRequest => 400,
            ErrorStatus::Unauthorized => 401,
            ErrorStatus::NotFound => 404,
            ErrorStatus::Unavailable => 503,
            ErrorStatus::Internal => 500,
        }
    }
}

const UNAUTHORIZED_MARKERS: [&str; 8] = [
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "api key",
    "authentication",
    "access denied",
    "permission denied",
];

const UNAVAILABLE_MARKERS: [&str; 9] = [
    "timed out",
    "timeout",
    "connect",
    "refused",
    "unreachable",
    "502",
    "503",
    "transport",
    "dns",
];

/// Classify a failure from its message text
pub fn infer_status(message: &str, fallback: ErrorStatus) -> ErrorStatus {
    let lower = message.to_lowercase();
    if UNAUTHORIZED_MARKERS.iter().any(|m| lower.contains(m)) {
        ErrorStatus::Unauthorized
    } else if UNAVAILABLE_MARKERS.iter().any(|m| lower.contains(m)) {
        ErrorStatus::Unavailable
    } else {
        fallback
    }
}

impl CoreError {
    pub fn status(&self) -> ErrorStatus {
        match self {
            CoreError::Provider(err) => match err {
                ProviderError::Timeout { .. } | ProviderError::Transport { .. } => ErrorStatus::Unavailable,
                ProviderError::MissingApiKey { .. } => ErrorStatus::Unauthorized,
                ProviderError::ModelListingUnsupported { .. } | ProviderError::Config { .. } => {
                    ErrorStatus::BadRequest
                }
                other => infer_status(&other.to_string(), ErrorStatus::Internal),
            },
            CoreError::UnsupportedProvider(_) | CoreError::UnsupportedDriver(_) => ErrorStatus::BadRequest,
            CoreError::ConnectionNotFound(_) | CoreError::ConversationNotFound(_) => ErrorStatus::NotFound,
            CoreError::QueryExecution(message) | CoreError::SchemaIntrospection(message) => {
                infer_status(message, ErrorStatus::Internal)
            }
            CoreError::Persistence(_) => ErrorStatus::Internal,
        }
    }
}

impl From<ProviderError> for CoreError {
    fn from(err: ProviderError) -> Self {
        CoreError::Provider(err)
    }
}

impl From<DriverError> for CoreError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::UnsupportedDriver(driver) => CoreError::UnsupportedDriver(driver),
            DriverError::Schema(message) => CoreError::SchemaIntrospection(message),
            other => CoreError::QueryExecution(other.to_string()),
        }
    }
}

impl From<PersistenceError> for CoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound {
                kind: "conversation",
                id,
            } => CoreError::ConversationNotFound(id),
            other => CoreError::Persistence(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_errors_share_prefix() {
        let openai: CoreError = ProviderError::api_error("openai", 500, "boom").into();
        let ollama: CoreError = ProviderError::transport("ollama", "connection refused").into();
        assert!(openai.to_string().starts_with(PROVIDER_ERROR_PREFIX));
        assert!(ollama.to_string().starts_with(PROVIDER_ERROR_PREFIX));
    }

    #[test]
    fn test_provider_status_inference() {
        let auth: CoreError = ProviderError::api_error("openai", 401, "Incorrect API key provided").into();
        assert_eq!(auth.status(), ErrorStatus::Unauthorized);

        let down: CoreError = ProviderError::api_error("azure", 503, "Service Unavailable").into();
        assert_eq!(down.status(), ErrorStatus::Unavailable);

        let timeout: CoreError = ProviderError::timeout("anthropic", 10).into();
        assert_eq!(timeout.status(), ErrorStatus::Unavailable);

        let odd: CoreError = ProviderError::invalid_response("gemini", "unexpected payload").into();
        assert_eq!(odd.status(), ErrorStatus::Internal);
    }

    #[test]
    fn test_missing_key_is_a_prefixed_provider_error() {
        let err: CoreError = ProviderError::missing_api_key("openai").into();
        assert_eq!(
            err.to_string(),
            "Model backend request failed: API key is required for openai"
        );
        assert!(matches!(err, CoreError::Provider(ProviderError::MissingApiKey { .. })));
        assert_eq!(err.status(), ErrorStatus::Unauthorized);
    }

    #[test]
    fn test_fixed_statuses() {
        assert_eq!(CoreError::UnsupportedProvider("Foo".into()).status(), ErrorStatus::BadRequest);
        assert_eq!(CoreError::ConnectionNotFound("c9".into()).status(), ErrorStatus::NotFound);
        assert_eq!(CoreError::ConnectionNotFound("c9".into()).status().http_code(), 404);
    }

    #[test]
    fn test_driver_error_mapping() {
        let err: CoreError = DriverError::Connect {
            driver: "postgresql".into(),
            host: "db:5432".into(),
            message: "Connection refused".into(),
        }
        .into();
        assert!(matches!(err, CoreError::QueryExecution(_)));
        assert_eq!(err.status(), ErrorStatus::Unavailable);

        let err: CoreError = DriverError::Query("relation \"nope\" does not exist".into()).into();
        assert_eq!(err.status(), ErrorStatus::Internal);

        let err: CoreError = DriverError::UnsupportedDriver("oracle".into()).into();
        assert!(matches!(err, CoreError::UnsupportedDriver(_)));
    }

    #[test]
    fn test_persistence_error_mapping() {
        let err: CoreError = PersistenceError::conversation_not_found("x").into();
        assert!(matches!(err, CoreError::ConversationNotFound(_)));
        assert_eq!(err.status(), ErrorStatus::NotFound);
    }
}

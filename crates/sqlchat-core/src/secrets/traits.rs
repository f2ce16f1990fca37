//! Read-only lookup of server-side provider credentials

/// Where built-in provider credentials come from
///
/// Keys are provider-scoped names: the bare id holds the API key
/// (`openai`), suffixed ids hold the rest (`openai_endpoint`, `azure_model`,
/// `azure_api_version`). A store may map them onto its own naming.
pub trait SecretStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

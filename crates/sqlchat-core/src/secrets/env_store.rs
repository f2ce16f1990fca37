//! Environment variable secret store

use std::collections::HashMap;
use std::env;

use once_cell::sync::Lazy;

use super::traits::SecretStore;

/// Provider-scoped keys that do not follow the `<KEY>` upper-case rule
static ENV_VAR_MAP: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("openai", vec!["OPENAI_API_KEY"]);
    m.insert("anthropic", vec!["ANTHROPIC_API_KEY"]);
    m.insert("azure", vec!["AZURE_OPENAI_API_KEY", "AZURE_API_KEY"]);
    m.insert("azure_endpoint", vec!["AZURE_OPENAI_ENDPOINT", "AZURE_ENDPOINT"]);
    m.insert("azure_model", vec!["AZURE_OPENAI_DEPLOYMENT", "AZURE_MODEL"]);
    m.insert("azure_api_version", vec!["AZURE_OPENAI_API_VERSION", "AZURE_API_VERSION"]);
    m.insert("gemini", vec!["GEMINI_API_KEY", "GOOGLE_API_KEY"]);
    m.insert("ollama_endpoint", vec!["OLLAMA_HOST", "OLLAMA_ENDPOINT"]);
    m
});

/// Credentials read from the process environment
///
/// Lookup order for a key:
/// 1. the key itself as a variable name (`OPENAI_API_KEY`)
/// 2. the explicit mapping above (`azure` → `AZURE_OPENAI_API_KEY`)
/// 3. `<KEY>_API_KEY` for bare provider ids, `<KEY>` upper-cased otherwise
#[derive(Debug, Default)]
pub struct EnvSecretStore {
    _private: (),
}

impl EnvSecretStore {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn read(name: &str) -> Option<String> {
        env::var(name).ok().filter(|v| !v.is_empty())
    }
}

impl SecretStore for EnvSecretStore {
    fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = Self::read(key) {
            return Some(value);
        }

        let lower_key = key.to_lowercase();
        if let Some(env_vars) = ENV_VAR_MAP.get(lower_key.as_str()) {
            if let Some(value) = env_vars.iter().find_map(|var| Self::read(var)) {
                return Some(value);
            }
        }

        let derived = if lower_key.contains('_') {
            lower_key.to_uppercase()
        } else {
            format!("{}_API_KEY", lower_key.to_uppercase())
        };
        Self::read(&derived)
    }
}

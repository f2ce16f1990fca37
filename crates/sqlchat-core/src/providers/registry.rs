//! Provider registry: provider id → adapter

use std::collections::HashMap;
use std::sync::Arc;

use super::genai_provider::GenaiProvider;
use super::pacing::StreamPacing;
use super::traits::Provider;
use crate::logging::Logger;
use crate::types::ProviderKind;

/// Adding a backend means registering one more `Provider`
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in adapter
    pub fn with_defaults(pacing: StreamPacing, logger: Arc<dyn Logger>) -> Self {
        let mut registry = Self::new();
        for kind in ProviderKind::all() {
            registry.register(Arc::new(GenaiProvider::new(kind, pacing.clone(), Arc::clone(&logger))));
        }
        registry
    }

    /// Add or replace the adapter registered under `provider.name()`
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.name().to_lowercase(), provider);
    }

    /// Look up an adapter by case-insensitive selector
    pub fn get(&self, selector: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(&selector.trim().to_lowercase()).cloned()
    }

    pub fn contains(&self, selector: &str) -> bool {
        self.get(selector).is_some()
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry").field("ids", &self.ids()).finish()
    }
}

//! Process-wide cancellation registry
//!
//! Maps a correlation id (conversation id or execution id) to the
//! `CancellationToken` of the pipeline currently running under it. The
//! registry is the only shared mutable state across requests.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::CancellationToken;

#[derive(Debug, Default)]
pub struct CancellationCoordinator {
    entries: Mutex<HashMap<String, CancellationToken>>,
}

impl CancellationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh token under `key`
    ///
    /// A pipeline already registered under the same key keeps its token but
    /// is no longer reachable through the registry. The entry is cleared when
    /// the returned guard drops.
    pub fn register(self: &Arc<Self>, key: impl Into<String>) -> CancellationGuard {
        let key = key.into();
        let token = CancellationToken::new();
        self.entries.lock().insert(key.clone(), token.clone());
        CancellationGuard {
            coordinator: Arc::clone(self),
            key,
            token,
        }
    }

    /// Signal the pipeline registered under `key`; false when none is live
    pub fn cancel(&self, key: &str) -> bool {
        match self.entries.lock().get(key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_cancelled(&self, key: &str) -> bool {
        self.entries
            .lock()
            .get(key)
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }

    pub fn clear(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove `key` only if it still maps to `token`
    fn release(&self, key: &str, token: &CancellationToken) {
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|current| current.same_as(token)) {
            entries.remove(key);
        }
    }
}

/// Registration held by a running pipeline
#[derive(Debug)]
pub struct CancellationGuard {
    coordinator: Arc<CancellationCoordinator>,
    key: String,
    token: CancellationToken,
}

impl CancellationGuard {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for CancellationGuard {
    fn drop(&mut self) {
        self.coordinator.release(&self.key, &self.token);
    }
}

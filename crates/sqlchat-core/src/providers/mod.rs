//! Provider adapters
//!
//! Each generative backend implements [`Provider`]; the [`ProviderRegistry`]
//! maps a case-insensitive provider id to its adapter. Built-in backends are
//! all served by [`GenaiProvider`] over the genai client. Adapters only open
//! the backend stream: message building, request timeout, pacing and
//! cancellation are shared through [`Provider::generate`].
//!
//! ```rust,ignore
//! use sqlchat_core::providers::{ProviderRegistry, resolve_provider_config};
//!
//! let registry = ProviderRegistry::with_defaults(config.pacing(), logger);
//! let provider = registry.get("openai").ok_or(...)?;
//! let resolved = resolve_provider_config(&request.provider, provider.as_ref(), &secrets)?;
//! let mut fragments = provider.generate(&resolved, &system_prompt, &history, cancel).await?;
//! ```

mod credentials;
mod error;
mod genai_adapter;
mod genai_provider;
mod http;
mod mock;
mod pacing;
mod registry;
#[cfg(test)]
mod test_server;
mod traits;

pub use credentials::{resolve_provider_config, ResolvedProvider};
pub use error::{ProviderError, ProviderResult};
pub use genai_provider::GenaiProvider;
pub use http::ProxyPolicy;
pub use mock::{MockConfig, MockMode, MockProvider};
pub use pacing::StreamPacing;
pub use registry::ProviderRegistry;
pub use traits::{FragmentStream, PromptMessages, Provider, SystemPromptPlacement};

//! Server-side credentials for built-in providers
//!
//! - `EnvSecretStore`: process environment
//! - `MemorySecretStore`: fixed in-process table

mod traits;
mod env_store;
mod memory_store;

pub use traits::SecretStore;
pub use env_store::EnvSecretStore;
pub use memory_store::MemorySecretStore;

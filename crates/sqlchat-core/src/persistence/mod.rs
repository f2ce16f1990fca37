//! Persistence collaborator
//!
//! Storage itself is external; this crate depends only on the
//! [`Persistence`] trait. [`MemoryPersistence`] is the in-process
//! implementation used by the server binary and tests.

mod memory;
mod traits;

pub use memory::MemoryPersistence;
pub use traits::{Persistence, PersistenceError, PersistenceResult};

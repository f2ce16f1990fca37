//! Query execution pipeline

mod engine;

pub use engine::{QueryEngine, QueryExecution, QueryRequest};

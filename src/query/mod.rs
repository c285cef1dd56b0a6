pub mod engine;
pub mod expand;
pub mod rerank;
pub mod rrf;

pub use engine::{deep_search, run_query, QueryOptions};

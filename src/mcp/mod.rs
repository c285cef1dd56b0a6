pub mod protocol;
pub mod transport_http;
pub mod transport_stdio;
pub mod types;

use crate::contracts::{Embedder, HookRunner};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared state every MCP transport dispatches requests against.
pub struct McpState {
    pub pool: SqlitePool,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub hook: Arc<dyn HookRunner>,
    pub vec_loaded: bool,
}

//! Capability traits at the seams where qpg talks to the outside world:
//! the local store, a Postgres source, the embedding model, and the
//! external rerank hook. Swapping implementations (e.g. a mock store in
//! tests) never requires touching call sites.

use crate::pg::introspect::IntrospectionBundle;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Anything that can hand out a connection pool to the local SQLite store.
#[async_trait]
pub trait Store: Send + Sync {
    fn pool(&self) -> &SqlitePool;
}

/// A source of schema introspection bundles — normally a live Postgres
/// connection, but trivially fakeable in tests.
#[async_trait]
pub trait PgReader: Send + Sync {
    async fn introspect(&self, include_functions: bool) -> Result<IntrospectionBundle>;
}

/// Produces a fixed-length embedding vector for a piece of text.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Runs the external rerank hook (`QPG_RERANK_HOOK`), if configured.
#[async_trait]
pub trait HookRunner: Send + Sync {
    async fn run(&self, query: &str, rows: &serde_json::Value) -> Result<Option<Vec<String>>>;
}

/// Abstracts "now" so ingest/context-cache timestamps are testable.
pub trait Clock: Send + Sync {
    fn now_rfc3339(&self) -> String;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_rfc3339(&self) -> String {
        chrono::Utc::now().to_rfc3339()
    }
}

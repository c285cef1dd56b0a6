pub mod pool;
pub mod schema;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Opens the local store, creating the schema if needed, and returns the
/// pool plus whether `sqlite-vec` loaded successfully.
pub async fn open(index_db: &Path) -> Result<(SqlitePool, bool)> {
    let (pool, vec_loaded) = pool::open_pool(index_db).await?;
    schema::ensure_schema(&pool).await?;
    Ok((pool, vec_loaded))
}

pub fn now_expr() -> &'static str {
    "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')"
}

//! Opens the local SQLite pool, probing for the `sqlite-vec` extension and
//! falling back to JSON-blob vector storage when it isn't available.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

const VEC_EXTENSION_NAMES: &[&str] = &["vec0", "sqlite_vec"];

/// Opens (creating if absent) the local SQLite database at `index_db`.
/// Returns the pool plus whether the `vec0` virtual table module loaded.
pub async fn open_pool(index_db: &Path) -> Result<(SqlitePool, bool)> {
    if let Some(parent) = index_db.parent() {
        std::fs::create_dir_all(parent)?;
    }

    for extension in VEC_EXTENSION_NAMES {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", index_db.display()))?
            .create_if_missing(true)
            .extension(*extension);

        match SqlitePoolOptions::new().max_connections(4).connect_with(options).await {
            Ok(pool) => {
                if probe_vec_functions(&pool).await {
                    return Ok((pool, true));
                }
            }
            Err(e) => {
                warn!(extension = %extension, error = %e, "sqlite-vec extension failed to load");
            }
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", index_db.display()))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().max_connections(4).connect_with(options).await?;
    Ok((pool, false))
}

async fn probe_vec_functions(pool: &SqlitePool) -> bool {
    sqlx::query("SELECT vec_f32('[0.0, 1.0]')")
        .fetch_one(pool)
        .await
        .is_ok()
}

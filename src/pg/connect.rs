//! Connects to a registered Postgres source with a read-only, bounded
//! session: a statement timeout, an idle-in-transaction timeout, and
//! (already enforced at registration time) a read-only transaction mode.

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

pub struct SessionGuards {
    pub statement_timeout: String,
    pub idle_in_transaction_timeout: String,
}

impl Default for SessionGuards {
    fn default() -> Self {
        Self {
            statement_timeout: "5s".to_string(),
            idle_in_transaction_timeout: "10s".to_string(),
        }
    }
}

pub async fn connect_pg(dsn: &str, guards: &SessionGuards) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(10))
        .connect(dsn)
        .await?;
    apply_session_guards(&pool, guards).await?;
    Ok(pool)
}

async fn apply_session_guards(pool: &PgPool, guards: &SessionGuards) -> Result<()> {
    sqlx::query("SELECT set_config('statement_timeout', $1, false)")
        .bind(&guards.statement_timeout)
        .execute(pool)
        .await?;
    sqlx::query("SELECT set_config('idle_in_transaction_session_timeout', $1, false)")
        .bind(&guards.idle_in_transaction_timeout)
        .execute(pool)
        .await?;
    sqlx::query("SELECT set_config('default_transaction_read_only', 'on', false)")
        .execute(pool)
        .await?;
    Ok(())
}

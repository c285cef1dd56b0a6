//! Registered Postgres sources: the sources table is the root of every
//! ingested schema and everything else (objects, contexts, vectors) hangs
//! off `source_id`.

use crate::dsn::enforce_readonly_dsn;
use crate::error::SourceError;
use chrono::Utc;
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SourceRecord {
    pub id: i64,
    pub name: String,
    pub dsn: String,
    #[sqlx(skip)]
    pub include_schemas: Vec<String>,
    #[sqlx(skip)]
    pub skip_patterns: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    pub last_indexed_at: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, FromRow)]
struct SourceRow {
    id: i64,
    name: String,
    dsn: String,
    include_schemas_json: String,
    skip_patterns_json: String,
    created_at: String,
    updated_at: String,
    last_indexed_at: Option<String>,
    last_error: Option<String>,
}

fn row_to_source(row: SourceRow) -> SourceRecord {
    SourceRecord {
        id: row.id,
        name: row.name,
        dsn: row.dsn,
        include_schemas: serde_json::from_str(&row.include_schemas_json).unwrap_or_default(),
        skip_patterns: serde_json::from_str(&row.skip_patterns_json).unwrap_or_default(),
        created_at: row.created_at,
        updated_at: row.updated_at,
        last_indexed_at: row.last_indexed_at,
        last_error: row.last_error,
    }
}

pub async fn add_source(
    pool: &SqlitePool,
    name: &str,
    dsn: &str,
    include_schemas: &[String],
    skip_patterns: &[String],
) -> Result<SourceRecord, SourceError> {
    let normalized_dsn = enforce_readonly_dsn(dsn).map_err(|_| {
        SourceError::Dsn(crate::error::DsnError::InvalidUrl(dsn.to_string()))
    })?;

    let include_sorted: BTreeSet<&String> = include_schemas.iter().collect();
    let skip_sorted: BTreeSet<&String> = skip_patterns.iter().collect();
    let include_json = serde_json::to_string(&include_sorted).unwrap_or_else(|_| "[]".to_string());
    let skip_json = serde_json::to_string(&skip_sorted).unwrap_or_else(|_| "[]".to_string());

    let now = Utc::now().to_rfc3339();

    let result = sqlx::query(
        "INSERT INTO sources (name, dsn, include_schemas_json, skip_patterns_json, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(&normalized_dsn)
    .bind(&include_json)
    .bind(&skip_json)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await;

    match result {
        Ok(_) => get_source(pool, name).await.map_err(|_| SourceError::NotFound(name.to_string())),
        Err(sqlx::Error::Database(e)) if e.message().contains("UNIQUE") => {
            Err(SourceError::AlreadyExists(name.to_string()))
        }
        Err(e) => Err(SourceError::Store(e)),
    }
}

pub async fn list_sources(pool: &SqlitePool) -> Result<Vec<SourceRecord>, sqlx::Error> {
    let rows: Vec<SourceRow> = sqlx::query_as(
        "SELECT id, name, dsn, include_schemas_json, skip_patterns_json, created_at, updated_at, last_indexed_at, last_error
         FROM sources ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(row_to_source).collect())
}

pub async fn get_source(pool: &SqlitePool, name: &str) -> Result<SourceRecord, SourceError> {
    let row: Option<SourceRow> = sqlx::query_as(
        "SELECT id, name, dsn, include_schemas_json, skip_patterns_json, created_at, updated_at, last_indexed_at, last_error
         FROM sources WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    row.map(row_to_source).ok_or_else(|| SourceError::NotFound(name.to_string()))
}

/// Removes a source and everything indexed under it. `db_objects` and its
/// children (columns, constraints, indexes, dependencies, lexical_docs,
/// object_context_effective, object_vectors) cascade via the `ON DELETE
/// CASCADE` foreign keys declared in the schema; `objects_fts` is a
/// virtual table with no FK support, so its rows are deleted explicitly
/// before the cascade removes the `db_objects` rows they reference.
pub async fn delete_source(pool: &SqlitePool, name: &str) -> Result<(), SourceError> {
    let source = get_source(pool, name).await?;

    sqlx::query("DELETE FROM objects_fts WHERE object_id IN (SELECT id FROM db_objects WHERE source_id = ?)")
        .bind(source.id)
        .execute(pool)
        .await?;

    sqlx::query("DELETE FROM contexts WHERE target_uri = ? OR target_uri LIKE ? OR target_uri LIKE ?")
        .bind(format!("qpg://{name}"))
        .bind(format!("qpg://{name}/%"))
        .bind(format!("qpg://{name}#%"))
        .execute(pool)
        .await?;

    let result = sqlx::query("DELETE FROM sources WHERE id = ?")
        .bind(source.id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(SourceError::NotFound(name.to_string()));
    }
    Ok(())
}

pub async fn rename_source(pool: &SqlitePool, old_name: &str, new_name: &str) -> Result<(), SourceError> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query("UPDATE sources SET name = ?, updated_at = ? WHERE name = ?")
        .bind(new_name)
        .bind(&now)
        .bind(old_name)
        .execute(pool)
        .await;

    match result {
        Ok(r) if r.rows_affected() == 0 => Err(SourceError::NotFound(old_name.to_string())),
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.message().contains("UNIQUE") => {
            Err(SourceError::AlreadyExists(new_name.to_string()))
        }
        Err(e) => Err(SourceError::Store(e)),
    }
}

pub async fn mark_source_indexed(pool: &SqlitePool, source_id: i64) -> Result<(), sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE sources SET last_indexed_at = ?, last_error = NULL, updated_at = ? WHERE id = ?")
        .bind(&now)
        .bind(&now)
        .bind(source_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_source_error(pool: &SqlitePool, source_id: i64, error: &str) -> Result<(), sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE sources SET last_error = ?, updated_at = ? WHERE id = ?")
        .bind(error)
        .bind(&now)
        .bind(source_id)
        .execute(pool)
        .await?;
    Ok(())
}

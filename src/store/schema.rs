//! Local store DDL. One `CREATE TABLE IF NOT EXISTS` per statement so
//! `ensure_schema` stays idempotent across repeated `qpg init`/startup runs.

use anyhow::Result;
use sqlx::SqlitePool;

const DDL: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS sources (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        dsn TEXT NOT NULL,
        include_schemas_json TEXT NOT NULL DEFAULT '[]',
        skip_patterns_json TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        last_indexed_at TEXT,
        last_error TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS db_objects (
        id TEXT PRIMARY KEY,
        source_id INTEGER NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
        schema_name TEXT,
        object_name TEXT NOT NULL,
        object_type TEXT NOT NULL,
        fqname TEXT NOT NULL,
        definition TEXT NOT NULL DEFAULT '',
        comment TEXT NOT NULL DEFAULT '',
        signature TEXT,
        owner TEXT,
        is_system INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL,
        UNIQUE(source_id, object_type, fqname)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS columns (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        object_id TEXT NOT NULL REFERENCES db_objects(id) ON DELETE CASCADE,
        column_name TEXT NOT NULL,
        data_type TEXT NOT NULL,
        is_nullable INTEGER NOT NULL,
        ordinal_position INTEGER NOT NULL,
        default_expr TEXT,
        comment TEXT,
        updated_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS constraints (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        object_id TEXT NOT NULL REFERENCES db_objects(id) ON DELETE CASCADE,
        constraint_name TEXT NOT NULL,
        constraint_type TEXT NOT NULL,
        definition TEXT NOT NULL,
        columns_json TEXT NOT NULL DEFAULT '[]',
        updated_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS indexes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        object_id TEXT NOT NULL REFERENCES db_objects(id) ON DELETE CASCADE,
        index_name TEXT NOT NULL,
        definition TEXT NOT NULL,
        is_unique INTEGER NOT NULL DEFAULT 0,
        is_primary INTEGER NOT NULL DEFAULT 0,
        columns_json TEXT NOT NULL DEFAULT '[]',
        updated_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS dependencies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        object_id TEXT NOT NULL REFERENCES db_objects(id) ON DELETE CASCADE,
        depends_on_object_id TEXT NOT NULL REFERENCES db_objects(id) ON DELETE CASCADE,
        dependency_type TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS contexts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        target_uri TEXT NOT NULL,
        body TEXT NOT NULL,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS object_context_effective (
        object_id TEXT PRIMARY KEY REFERENCES db_objects(id) ON DELETE CASCADE,
        context_text TEXT NOT NULL DEFAULT '',
        updated_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS lexical_docs (
        object_id TEXT PRIMARY KEY REFERENCES db_objects(id) ON DELETE CASCADE,
        source_id INTEGER NOT NULL,
        name_col TEXT NOT NULL DEFAULT '',
        comment_col TEXT NOT NULL DEFAULT '',
        defs_col TEXT NOT NULL DEFAULT '',
        context_col TEXT NOT NULL DEFAULT '',
        updated_at TEXT NOT NULL
    )"#,
    r#"CREATE VIRTUAL TABLE IF NOT EXISTS objects_fts USING fts5(
        object_id UNINDEXED,
        source_name UNINDEXED,
        schema_name UNINDEXED,
        kind UNINDEXED,
        name_col,
        comment_col,
        defs_col,
        context_col,
        tokenize = 'unicode61 remove_diacritics 2'
    )"#,
    r#"CREATE TABLE IF NOT EXISTS object_vectors (
        object_id TEXT PRIMARY KEY REFERENCES db_objects(id) ON DELETE CASCADE,
        embedding BLOB NOT NULL,
        dim INTEGER NOT NULL DEFAULT 0,
        model TEXT NOT NULL DEFAULT 'codebert-base-v1',
        updated_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS llm_cache (
        key TEXT PRIMARY KEY,
        value_json TEXT NOT NULL,
        created_at TEXT NOT NULL,
        expires_at TEXT
    )"#,
];

pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    for statement in DDL {
        sqlx::query(statement).execute(pool).await?;
    }
    ensure_sources_columns(pool).await?;
    Ok(())
}

/// `sources` gained `include_schemas_json`/`skip_patterns_json` after its
/// initial release; add them idempotently for databases created earlier.
async fn ensure_sources_columns(pool: &SqlitePool) -> Result<()> {
    let existing: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('sources')")
        .fetch_all(pool)
        .await?;

    if !existing.iter().any(|c| c == "include_schemas_json") {
        sqlx::query("ALTER TABLE sources ADD COLUMN include_schemas_json TEXT NOT NULL DEFAULT '[]'")
            .execute(pool)
            .await?;
    }
    if !existing.iter().any(|c| c == "skip_patterns_json") {
        sqlx::query("ALTER TABLE sources ADD COLUMN skip_patterns_json TEXT NOT NULL DEFAULT '[]'")
            .execute(pool)
            .await?;
    }
    Ok(())
}

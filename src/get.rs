//! Resolves a single object — by `#<id-prefix>` or by `source/fqname` —
//! into its full payload: columns, constraints, indexes, dependencies,
//! dependents, and effective context.

use crate::error::GetError;
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ColumnRow {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub ordinal_position: i64,
    pub default_expr: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ConstraintRow {
    pub constraint_name: String,
    pub constraint_type: String,
    pub definition: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct IndexRow {
    pub index_name: String,
    pub definition: String,
    pub is_unique: bool,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DependencyRow {
    pub fqname: String,
    pub object_type: String,
    pub dependency_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectPayload {
    pub object_id: String,
    pub source_name: String,
    pub schema_name: Option<String>,
    pub object_name: String,
    pub object_type: String,
    pub fqname: String,
    pub definition: String,
    pub comment: String,
    pub signature: Option<String>,
    pub owner: Option<String>,
    pub is_system: bool,
    pub columns: Vec<ColumnRow>,
    pub constraints: Vec<ConstraintRow>,
    pub indexes: Vec<IndexRow>,
    pub dependencies: Vec<DependencyRow>,
    pub dependents: Vec<DependencyRow>,
    pub effective_context: String,
}

#[derive(FromRow)]
struct ObjectRow {
    id: String,
    source_name: String,
    schema_name: Option<String>,
    object_name: String,
    object_type: String,
    fqname: String,
    definition: String,
    comment: String,
    signature: Option<String>,
    owner: Option<String>,
    is_system: bool,
}

/// Resolves `key` — either a bare or `#`-prefixed object id prefix, or a
/// `source:fqname` pair — to the unique matching object row. Errs if zero
/// or more than one object matches an id prefix.
async fn resolve_object_row(pool: &SqlitePool, source: &str, key: &str) -> Result<ObjectRow, GetError> {
    let id_prefix = key.strip_prefix('#').unwrap_or(key);
    let by_id: Vec<ObjectRow> = sqlx::query_as(
        "SELECT o.id, s.name AS source_name, o.schema_name, o.object_name, o.object_type, o.fqname,
                o.definition, o.comment, o.signature, o.owner, o.is_system
         FROM db_objects o JOIN sources s ON s.id = o.source_id
         WHERE s.name = ? AND o.id LIKE ? || '%'",
    )
    .bind(source)
    .bind(id_prefix)
    .fetch_all(pool)
    .await?;

    if by_id.len() == 1 {
        return Ok(by_id.into_iter().next().unwrap());
    }
    if by_id.len() > 1 {
        return Err(GetError::NotFound(format!("ambiguous id prefix '{key}' matches {} objects", by_id.len())));
    }

    let by_fqname: Option<ObjectRow> = sqlx::query_as(
        "SELECT o.id, s.name AS source_name, o.schema_name, o.object_name, o.object_type, o.fqname,
                o.definition, o.comment, o.signature, o.owner, o.is_system
         FROM db_objects o JOIN sources s ON s.id = o.source_id
         WHERE s.name = ? AND o.fqname = ?",
    )
    .bind(source)
    .bind(key)
    .fetch_optional(pool)
    .await?;

    by_fqname.ok_or_else(|| GetError::NotFound(key.to_string()))
}

pub async fn get_object(pool: &SqlitePool, source: &str, key: &str) -> Result<ObjectPayload, GetError> {
    let row = resolve_object_row(pool, source, key).await?;

    let columns: Vec<ColumnRow> = sqlx::query_as(
        "SELECT column_name, data_type, is_nullable, ordinal_position, default_expr, comment
         FROM columns WHERE object_id = ? ORDER BY ordinal_position",
    )
    .bind(&row.id)
    .fetch_all(pool)
    .await?;

    let constraints: Vec<ConstraintRow> = sqlx::query_as(
        "SELECT constraint_name, constraint_type, definition FROM constraints WHERE object_id = ? ORDER BY constraint_name",
    )
    .bind(&row.id)
    .fetch_all(pool)
    .await?;

    let indexes: Vec<IndexRow> = sqlx::query_as(
        "SELECT index_name, definition, is_unique, is_primary FROM indexes WHERE object_id = ? ORDER BY index_name",
    )
    .bind(&row.id)
    .fetch_all(pool)
    .await?;

    let dependencies: Vec<DependencyRow> = sqlx::query_as(
        "SELECT d.fqname AS fqname, d.object_type AS object_type, dep.dependency_type AS dependency_type
         FROM dependencies dep
         JOIN db_objects d ON d.id = dep.depends_on_object_id
         WHERE dep.object_id = ?
         ORDER BY d.fqname",
    )
    .bind(&row.id)
    .fetch_all(pool)
    .await?;

    let dependents: Vec<DependencyRow> = sqlx::query_as(
        "SELECT d.fqname AS fqname, d.object_type AS object_type, dep.dependency_type AS dependency_type
         FROM dependencies dep
         JOIN db_objects d ON d.id = dep.object_id
         WHERE dep.depends_on_object_id = ?
         ORDER BY d.fqname",
    )
    .bind(&row.id)
    .fetch_all(pool)
    .await?;

    let effective_context: String = sqlx::query_scalar("SELECT context_text FROM object_context_effective WHERE object_id = ?")
        .bind(&row.id)
        .fetch_optional(pool)
        .await?
        .unwrap_or_default();

    Ok(ObjectPayload {
        object_id: row.id,
        source_name: row.source_name,
        schema_name: row.schema_name,
        object_name: row.object_name,
        object_type: row.object_type,
        fqname: row.fqname,
        definition: row.definition,
        comment: row.comment,
        signature: row.signature,
        owner: row.owner,
        is_system: row.is_system,
        columns,
        constraints,
        indexes,
        dependencies,
        dependents,
        effective_context,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_hash_prefix_for_id_lookup() {
        assert_eq!("#abc123".strip_prefix('#').unwrap(), "abc123");
        assert_eq!("abc123".strip_prefix('#').unwrap_or("abc123"), "abc123");
    }
}

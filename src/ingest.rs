//! Turns an `IntrospectionBundle` into rows in the local store: objects,
//! their synthetic column/constraint/index children, dependency edges,
//! effective context, lexical documents, and embeddings.
//!
//! The whole delete-then-rebuild sequence runs inside a single
//! transaction so a mid-way failure (a bad embedding call, a disk error)
//! leaves the previous index for this source intact instead of a
//! half-rebuilt one.

use crate::contexts::{resolve_effective_context, ContextRecord};
use crate::contracts::Embedder;
use crate::index::fts::rebuild_fts;
use crate::index::vector::upsert_embedding;
use crate::pg::introspect::IntrospectionBundle;
use crate::types::{ObjectId, ObjectRef};
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateStats {
    pub objects: usize,
    pub columns: usize,
    pub constraints: usize,
    pub indexes: usize,
    pub dependencies: usize,
    pub vectors: usize,
}

struct Registered {
    object_name: String,
    schema_name: Option<String>,
}

impl Registered {
    /// `schema.name | name` — the lexical name column, per object.
    fn name_col(&self) -> String {
        match &self.schema_name {
            Some(schema) => format!("{schema}.{}", self.object_name),
            None => self.object_name.clone(),
        }
    }
}

/// Rebuilds a single source's slice of the local store from a freshly
/// introspected bundle. Idempotent: existing objects for the source are
/// deleted first, so this can be called on every `qpg update`.
pub async fn update_source_index(
    pool: &SqlitePool,
    source_id: i64,
    source_name: &str,
    bundle: &IntrospectionBundle,
    vec_loaded: bool,
    embedder: Option<&dyn Embedder>,
) -> Result<UpdateStats, sqlx::Error> {
    let mut stats = UpdateStats::default();
    let now = Utc::now().to_rfc3339();

    let mut tx = pool.begin().await?;

    let existing_ids: Vec<String> = sqlx::query_scalar("SELECT id FROM db_objects WHERE source_id = ?")
        .bind(source_id)
        .fetch_all(&mut *tx)
        .await?;
    for id in &existing_ids {
        sqlx::query("DELETE FROM dependencies WHERE object_id = ? OR depends_on_object_id = ?")
            .bind(id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM columns WHERE object_id = ?").bind(id).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM constraints WHERE object_id = ?").bind(id).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM indexes WHERE object_id = ?").bind(id).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM object_context_effective WHERE object_id = ?").bind(id).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM lexical_docs WHERE object_id = ?").bind(id).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM object_vectors WHERE object_id = ?").bind(id).execute(&mut *tx).await?;
    }
    sqlx::query("DELETE FROM db_objects WHERE source_id = ?").bind(source_id).execute(&mut *tx).await?;

    let mut defs_map: HashMap<String, Vec<String>> = HashMap::new();
    let mut registered: HashMap<String, Registered> = HashMap::new();
    let mut fqname_to_id: HashMap<String, String> = HashMap::new();

    for obj in &bundle.objects {
        let fqname = obj.fqname();
        let object_id = ObjectId::compute(source_name, &obj.object_type, &fqname);
        let id_str = object_id.to_string();

        sqlx::query(
            "INSERT INTO db_objects (id, source_id, schema_name, object_name, object_type, fqname, definition, comment, signature, owner, is_system, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id_str)
        .bind(source_id)
        .bind(&obj.schema_name)
        .bind(&obj.object_name)
        .bind(&obj.object_type)
        .bind(&fqname)
        .bind(obj.definition.trim())
        .bind(obj.comment.trim())
        .bind(&obj.signature)
        .bind(&obj.owner)
        .bind(obj.is_system as i64)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        stats.objects += 1;

        fqname_to_id.insert(fqname.clone(), id_str.clone());
        registered.insert(
            id_str.clone(),
            Registered { object_name: obj.object_name.clone(), schema_name: obj.schema_name.clone() },
        );
        let defs = defs_map.entry(id_str.clone()).or_default();

        for column in &obj.columns {
            sqlx::query(
                "INSERT INTO columns (object_id, column_name, data_type, is_nullable, ordinal_position, default_expr, comment, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&id_str)
            .bind(&column.column_name)
            .bind(&column.data_type)
            .bind(column.is_nullable as i64)
            .bind(column.ordinal_position)
            .bind(&column.default_expr)
            .bind(&column.comment)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            stats.columns += 1;

            let child_name = format!("{}.{}", obj.object_name, column.column_name);
            let child_fqname = format!("{fqname}.{}", column.column_name);
            let child_id = ObjectId::compute(source_name, "column", &child_fqname).to_string();
            let child_definition = format!("{} {}", column.column_name, column.data_type);
            let child_def_line = format!("column {child_definition}");
            sqlx::query(
                "INSERT OR IGNORE INTO db_objects (id, source_id, schema_name, object_name, object_type, fqname, definition, comment, owner, is_system, updated_at)
                 VALUES (?, ?, ?, ?, 'column', ?, ?, '', NULL, ?, ?)",
            )
            .bind(&child_id)
            .bind(source_id)
            .bind(&obj.schema_name)
            .bind(&child_name)
            .bind(&child_fqname)
            .bind(&child_definition)
            .bind(obj.is_system as i64)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            registered.insert(
                child_id.clone(),
                Registered { object_name: child_name, schema_name: obj.schema_name.clone() },
            );
            defs_map.entry(child_id).or_default().push(child_def_line.clone());

            defs.push(child_def_line);
        }

        for constraint in &obj.constraints {
            let columns_json = serde_json::to_string(&constraint.columns).unwrap_or_else(|_| "[]".to_string());
            sqlx::query(
                "INSERT INTO constraints (object_id, constraint_name, constraint_type, definition, columns_json, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&id_str)
            .bind(&constraint.constraint_name)
            .bind(&constraint.constraint_type)
            .bind(&constraint.definition)
            .bind(&columns_json)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            stats.constraints += 1;

            let child_name = format!("{}.{}", obj.object_name, constraint.constraint_name);
            let child_fqname = format!("{fqname}.{}", constraint.constraint_name);
            let child_id = ObjectId::compute(source_name, "constraint", &child_fqname).to_string();
            let child_def_line = format!("constraint {} {}", constraint.constraint_name, constraint.definition);
            sqlx::query(
                "INSERT OR IGNORE INTO db_objects (id, source_id, schema_name, object_name, object_type, fqname, definition, comment, owner, is_system, updated_at)
                 VALUES (?, ?, ?, ?, 'constraint', ?, ?, '', NULL, ?, ?)",
            )
            .bind(&child_id)
            .bind(source_id)
            .bind(&obj.schema_name)
            .bind(&child_name)
            .bind(&child_fqname)
            .bind(&constraint.definition)
            .bind(obj.is_system as i64)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            registered.insert(
                child_id.clone(),
                Registered { object_name: child_name, schema_name: obj.schema_name.clone() },
            );
            defs_map.entry(child_id).or_default().push(child_def_line.clone());

            defs.push(child_def_line);
        }

        for index in &obj.indexes {
            let columns_json = serde_json::to_string(&index.columns).unwrap_or_else(|_| "[]".to_string());
            sqlx::query(
                "INSERT INTO indexes (object_id, index_name, definition, is_unique, is_primary, columns_json, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&id_str)
            .bind(&index.index_name)
            .bind(&index.definition)
            .bind(index.is_unique as i64)
            .bind(index.is_primary as i64)
            .bind(&columns_json)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            stats.indexes += 1;

            let child_name = format!("{}.{}", obj.object_name, index.index_name);
            let child_fqname = format!("{fqname}.{}", index.index_name);
            let child_id = ObjectId::compute(source_name, "index", &child_fqname).to_string();
            let child_def_line = format!("index {} {}", index.index_name, index.definition);
            sqlx::query(
                "INSERT OR IGNORE INTO db_objects (id, source_id, schema_name, object_name, object_type, fqname, definition, comment, owner, is_system, updated_at)
                 VALUES (?, ?, ?, ?, 'index', ?, ?, '', NULL, ?, ?)",
            )
            .bind(&child_id)
            .bind(source_id)
            .bind(&obj.schema_name)
            .bind(&child_name)
            .bind(&child_fqname)
            .bind(&index.definition)
            .bind(obj.is_system as i64)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            registered.insert(
                child_id.clone(),
                Registered { object_name: child_name, schema_name: obj.schema_name.clone() },
            );
            defs_map.entry(child_id).or_default().push(child_def_line.clone());

            defs.push(child_def_line);
        }
    }

    for obj in &bundle.objects {
        let fqname = obj.fqname();
        let Some(from_id) = fqname_to_id.get(&fqname) else { continue };
        for dep in &obj.dependencies {
            if let Some(to_id) = fqname_to_id.get(&dep.depends_on_fqname) {
                sqlx::query(
                    "INSERT INTO dependencies (object_id, depends_on_object_id, dependency_type, updated_at) VALUES (?, ?, ?, ?)",
                )
                .bind(from_id)
                .bind(to_id)
                .bind(&dep.dependency_type)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
                stats.dependencies += 1;
            }
        }
    }

    let contexts: Vec<ContextRecord> = sqlx::query_as("SELECT id, target_uri, body, created_at FROM contexts ORDER BY id")
        .fetch_all(&mut *tx)
        .await?;

    // Every registered object — root and synthetic child alike — gets its
    // own effective context, lexical document, and (when embedding is
    // enabled) vector, so children surface as first-class search results.
    for (object_id, info) in &registered {
        let object_ref = ObjectRef {
            source: source_name.to_string(),
            schema: info.schema_name.clone(),
            object_name: info.object_name.clone(),
            object_id: object_id.clone(),
        };
        let context_text = resolve_effective_context(&contexts, &object_ref);

        sqlx::query(
            "INSERT INTO object_context_effective (object_id, context_text, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(object_id) DO UPDATE SET context_text = excluded.context_text, updated_at = excluded.updated_at",
        )
        .bind(object_id)
        .bind(&context_text)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let comment_text: String = sqlx::query_scalar("SELECT comment FROM db_objects WHERE id = ?")
            .bind(object_id)
            .fetch_one(&mut *tx)
            .await
            .unwrap_or_default();
        let defs_text = defs_map.get(object_id).map(|lines| lines.join("\n")).unwrap_or_default();
        let name_col = info.name_col();

        sqlx::query(
            "INSERT INTO lexical_docs (object_id, source_id, name_col, comment_col, defs_col, context_col, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(object_id) DO UPDATE SET name_col = excluded.name_col, comment_col = excluded.comment_col,
                defs_col = excluded.defs_col, context_col = excluded.context_col, updated_at = excluded.updated_at",
        )
        .bind(object_id)
        .bind(source_id)
        .bind(&name_col)
        .bind(&comment_text)
        .bind(&defs_text)
        .bind(&context_text)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        if let Some(embedder) = embedder {
            let vector_text = [name_col.as_str(), comment_text.as_str(), defs_text.as_str(), context_text.as_str()]
                .iter()
                .filter(|s| !s.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join("\n");
            let embedding = embedder.embed(&vector_text).await.unwrap_or_default();
            if !embedding.is_empty() {
                upsert_embedding(&mut tx, object_id, &embedding, vec_loaded).await?;
                stats.vectors += 1;
            }
        }
    }

    rebuild_fts(&mut tx, Some(source_id)).await?;

    tx.commit().await?;

    Ok(stats)
}

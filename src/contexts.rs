//! Context notes and the `qpg://` URI grammar that scopes them to a
//! source, schema, object, or single object id.

use crate::error::ContextError;
use crate::sources::get_source;
use crate::types::{ContextScope, ObjectRef};
use chrono::Utc;
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use url::Url;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ContextRecord {
    pub id: i64,
    pub target_uri: String,
    pub body: String,
    pub created_at: String,
}

pub async fn add_context(pool: &SqlitePool, source: &str, target_uri: &str, body: &str) -> Result<ContextRecord, ContextError> {
    get_source(pool, source).await.map_err(|_| ContextError::SourceNotFound(source.to_string()))?;

    let now = Utc::now().to_rfc3339();
    let result = sqlx::query("INSERT INTO contexts (target_uri, body, created_at) VALUES (?, ?, ?)")
        .bind(target_uri)
        .bind(body)
        .bind(&now)
        .execute(pool)
        .await?;

    let id = result.last_insert_rowid();
    Ok(ContextRecord {
        id,
        target_uri: target_uri.to_string(),
        body: body.to_string(),
        created_at: now,
    })
}

pub async fn list_contexts(pool: &SqlitePool) -> Result<Vec<ContextRecord>, sqlx::Error> {
    sqlx::query_as("SELECT id, target_uri, body, created_at FROM contexts ORDER BY id")
        .fetch_all(pool)
        .await
}

pub async fn remove_context(pool: &SqlitePool, key: &str) -> Result<u64, sqlx::Error> {
    let result = if let Ok(id) = key.parse::<i64>() {
        sqlx::query("DELETE FROM contexts WHERE id = ?").bind(id).execute(pool).await?
    } else {
        sqlx::query("DELETE FROM contexts WHERE target_uri = ?").bind(key).execute(pool).await?
    };
    Ok(result.rows_affected())
}

/// Parses a `qpg://<source>[/<schema>[.<object>]]` or `qpg://<source>#<id>`
/// URI into a scope. Fragment wins over path; within the path, a `/`
/// separator wins over a `.` separator.
pub fn parse_context_target(uri: &str) -> Result<ContextScope, ContextError> {
    let url = Url::parse(uri).map_err(|_| ContextError::InvalidTarget(uri.to_string()))?;
    if url.scheme() != "qpg" {
        return Err(ContextError::InvalidTarget(uri.to_string()));
    }
    let source = url.host_str().ok_or_else(|| ContextError::InvalidTarget(uri.to_string()))?.to_string();

    if let Some(fragment) = url.fragment() {
        if !fragment.is_empty() {
            return Ok(ContextScope {
                source,
                object_id: Some(fragment.to_string()),
                ..Default::default()
            });
        }
    }

    let path = url.path().trim_start_matches('/');
    if path.is_empty() {
        return Ok(ContextScope { source, ..Default::default() });
    }

    if let Some((schema, object)) = path.split_once('/') {
        return Ok(ContextScope {
            source,
            schema: Some(schema.to_string()),
            object_name: Some(object.to_string()),
            ..Default::default()
        });
    }

    if let Some((schema, object)) = path.split_once('.') {
        return Ok(ContextScope {
            source,
            schema: Some(schema.to_string()),
            object_name: Some(object.to_string()),
            ..Default::default()
        });
    }

    Ok(ContextScope {
        source,
        schema: Some(path.to_string()),
        ..Default::default()
    })
}

/// Does `scope` apply to `obj`? Source must match; any further-specified
/// field in `scope` must also match. `object_name` matches a child
/// (`"<parent>.<child>"`) by prefix, so table-level contexts flow down to
/// their columns and indexes.
pub fn context_applies(scope: &ContextScope, obj: &ObjectRef) -> bool {
    if scope.source != obj.source {
        return false;
    }
    if let Some(object_id) = &scope.object_id {
        return object_id == &obj.object_id;
    }
    if let Some(schema) = &scope.schema {
        if Some(schema) != obj.schema.as_ref() {
            return false;
        }
    }
    if let Some(object_name) = &scope.object_name {
        return &obj.object_name == object_name || obj.object_name.starts_with(&format!("{object_name}."));
    }
    true
}

/// Folds every context whose scope applies to `obj`, in list order,
/// trimming each body and skipping it if empty, then deduplicating
/// identical bodies while keeping first-occurrence order.
pub fn resolve_effective_context(contexts: &[ContextRecord], obj: &ObjectRef) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut lines = Vec::new();

    for context in contexts {
        let Ok(scope) = parse_context_target(&context.target_uri) else {
            continue;
        };
        if !context_applies(&scope, obj) {
            continue;
        }
        let trimmed = context.body.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            lines.push(trimmed.to_string());
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(source: &str, schema: Option<&str>, name: &str) -> ObjectRef {
        ObjectRef {
            source: source.to_string(),
            schema: schema.map(str::to_string),
            object_name: name.to_string(),
            object_id: format!("{source}:{name}"),
        }
    }

    #[test]
    fn parse_fragment_scope() {
        let scope = parse_context_target("qpg://prod#abc123def456").unwrap();
        assert_eq!(scope.source, "prod");
        assert_eq!(scope.object_id.as_deref(), Some("abc123def456"));
    }

    #[test]
    fn parse_path_schema_object() {
        let scope = parse_context_target("qpg://prod/public/orders").unwrap();
        assert_eq!(scope.schema.as_deref(), Some("public"));
        assert_eq!(scope.object_name.as_deref(), Some("orders"));
    }

    #[test]
    fn parse_dotted_schema_object() {
        let scope = parse_context_target("qpg://prod/public.orders").unwrap();
        assert_eq!(scope.schema.as_deref(), Some("public"));
        assert_eq!(scope.object_name.as_deref(), Some("orders"));
    }

    #[test]
    fn parse_schema_only() {
        let scope = parse_context_target("qpg://prod/public").unwrap();
        assert_eq!(scope.schema.as_deref(), Some("public"));
        assert!(scope.object_name.is_none());
    }

    #[test]
    fn child_inherits_parent_object_context() {
        let scope = ContextScope {
            source: "prod".to_string(),
            schema: Some("public".to_string()),
            object_name: Some("orders".to_string()),
            object_id: None,
        };
        assert!(context_applies(&scope, &obj("prod", Some("public"), "orders.status")));
        assert!(!context_applies(&scope, &obj("prod", Some("public"), "orders_items")));
    }

    #[test]
    fn resolve_effective_context_dedupes_and_preserves_order() {
        let contexts = vec![
            ContextRecord { id: 1, target_uri: "qpg://prod/public".to_string(), body: "schema note".to_string(), created_at: String::new() },
            ContextRecord { id: 2, target_uri: "qpg://prod/public.orders".to_string(), body: "table note".to_string(), created_at: String::new() },
            ContextRecord { id: 3, target_uri: "qpg://prod/public".to_string(), body: "schema note".to_string(), created_at: String::new() },
        ];
        let text = resolve_effective_context(&contexts, &obj("prod", Some("public"), "orders"));
        assert_eq!(text, "schema note\ntable note");
    }

    #[test]
    fn whitespace_only_bodies_are_skipped() {
        let contexts = vec![
            ContextRecord { id: 1, target_uri: "qpg://prod/public.orders".to_string(), body: "   \n  ".to_string(), created_at: String::new() },
            ContextRecord { id: 2, target_uri: "qpg://prod/public.orders".to_string(), body: "  real note  ".to_string(), created_at: String::new() },
        ];
        let text = resolve_effective_context(&contexts, &obj("prod", Some("public"), "orders"));
        assert_eq!(text, "real note");
    }

    #[test]
    fn invalid_uris_are_skipped_silently() {
        let contexts = vec![
            ContextRecord { id: 1, target_uri: "not-a-uri".to_string(), body: "ignored".to_string(), created_at: String::new() },
        ];
        let text = resolve_effective_context(&contexts, &obj("prod", Some("public"), "orders"));
        assert_eq!(text, "");
    }
}

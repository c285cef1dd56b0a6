//! BM25 lexical search over the `objects_fts` virtual table.

use crate::index::RankedRow;
use sqlx::{FromRow, SqliteConnection, SqlitePool};

const EMPTY_MATCH_SENTINEL: &str = r#""""#;

fn sanitize_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|t| t.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect::<String>())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Builds an FTS5 `MATCH` expression: quoted tokens OR-joined. An
/// all-punctuation/empty query degrades to a sentinel that matches
/// nothing, rather than an empty `MATCH` string (which FTS5 rejects).
pub fn make_match_query(text: &str) -> String {
    let tokens = sanitize_tokens(text);
    if tokens.is_empty() {
        return EMPTY_MATCH_SENTINEL.to_string();
    }
    tokens.iter().map(|t| format!("\"{t}\"")).collect::<Vec<_>>().join(" OR ")
}

/// Rebuilds `objects_fts` from `lexical_docs`, either for one source or
/// (when `source_id` is `None`) the whole index. Takes a live connection
/// rather than a pool so callers that already hold an open transaction —
/// `update_source_index`'s delete/insert/docs/fts/mark sequence — can run
/// this as part of it instead of autocommitting separately.
pub async fn rebuild_fts(conn: &mut SqliteConnection, source_id: Option<i64>) -> Result<(), sqlx::Error> {
    match source_id {
        Some(id) => {
            sqlx::query("DELETE FROM objects_fts WHERE object_id IN (SELECT id FROM db_objects WHERE source_id = ?)")
                .bind(id)
                .execute(&mut *conn)
                .await?;
            sqlx::query(
                "INSERT INTO objects_fts (object_id, source_name, schema_name, kind, name_col, comment_col, defs_col, context_col)
                 SELECT l.object_id, s.name, o.schema_name, o.object_type, l.name_col, l.comment_col, l.defs_col, l.context_col
                 FROM lexical_docs l
                 JOIN db_objects o ON o.id = l.object_id
                 JOIN sources s ON s.id = o.source_id
                 WHERE o.source_id = ?",
            )
            .bind(id)
            .execute(&mut *conn)
            .await?;
        }
        None => {
            sqlx::query("DELETE FROM objects_fts").execute(&mut *conn).await?;
            sqlx::query(
                "INSERT INTO objects_fts (object_id, source_name, schema_name, kind, name_col, comment_col, defs_col, context_col)
                 SELECT l.object_id, s.name, o.schema_name, o.object_type, l.name_col, l.comment_col, l.defs_col, l.context_col
                 FROM lexical_docs l
                 JOIN db_objects o ON o.id = l.object_id
                 JOIN sources s ON s.id = o.source_id",
            )
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

pub struct SearchFtsParams<'a> {
    pub query: &'a str,
    pub limit: usize,
    pub source: Option<&'a str>,
    pub schema: Option<&'a str>,
    pub kind: Option<&'a str>,
    pub min_score: Option<f64>,
}

#[derive(FromRow)]
struct FtsRow {
    object_id: String,
    source_name: String,
    schema_name: Option<String>,
    kind: String,
    name_snippet: String,
    context_snippet: String,
    bm25_score: f64,
}

/// Column weights (name, comment, definitions, context) tuned so object
/// names dominate ranking while effective context still contributes.
pub async fn search_fts(pool: &SqlitePool, params: SearchFtsParams<'_>) -> Result<Vec<RankedRow>, sqlx::Error> {
    let match_query = make_match_query(params.query);

    let rows: Vec<FtsRow> = sqlx::query_as(
        "SELECT object_id, source_name, schema_name, kind,
                snippet(objects_fts, 4, '[', ']', '...', 8) AS name_snippet,
                snippet(objects_fts, 7, '[', ']', '...', 8) AS context_snippet,
                bm25(objects_fts, 3.5, 1.5, 1.1, 5.0) AS bm25_score
         FROM objects_fts
         WHERE objects_fts MATCH ?
           AND (? IS NULL OR source_name = ?)
           AND (? IS NULL OR schema_name = ?)
           AND (? IS NULL OR kind = ?)
         ORDER BY bm25_score
         LIMIT ?",
    )
    .bind(&match_query)
    .bind(params.source)
    .bind(params.source)
    .bind(params.schema)
    .bind(params.schema)
    .bind(params.kind)
    .bind(params.kind)
    .bind(params.limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| RankedRow {
            object_id: r.object_id,
            source_name: r.source_name,
            schema_name: r.schema_name,
            kind: r.kind,
            name_snippet: r.name_snippet,
            context_snippet: r.context_snippet,
            score: 1.0 / (1.0 + r.bm25_score.max(0.0)),
        })
        .filter(|row| params.min_score.map(|min| row.score >= min).unwrap_or(true))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_match_query_or_joins_tokens() {
        assert_eq!(make_match_query("payment refund"), "\"payment\" OR \"refund\"");
    }

    #[test]
    fn make_match_query_empty_input_uses_sentinel() {
        assert_eq!(make_match_query("   "), EMPTY_MATCH_SENTINEL);
        assert_eq!(make_match_query("***"), EMPTY_MATCH_SENTINEL);
    }

    #[test]
    fn sanitize_tokens_strips_punctuation() {
        assert_eq!(sanitize_tokens("payment's #status!"), vec!["payments", "status"]);
    }
}

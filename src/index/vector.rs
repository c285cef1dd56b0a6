//! Vector storage and cosine-similarity search, backed by `sqlite-vec`
//! when the extension loaded, falling back to a plain BLOB column and
//! in-process scoring otherwise.

use crate::index::RankedRow;
use sqlx::{FromRow, SqliteConnection, SqlitePool};

fn to_json_vector(embedding: &[f32]) -> String {
    let rounded: Vec<f64> = embedding.iter().map(|v| (*v as f64 * 1e8).round() / 1e8).collect();
    serde_json::to_string(&rounded).unwrap_or_else(|_| "[]".to_string())
}

fn decode_vector(blob: &str) -> Vec<f32> {
    serde_json::from_str::<Vec<f64>>(blob)
        .map(|v| v.into_iter().map(|x| x as f32).collect())
        .unwrap_or_default()
}

/// Cosine similarity. Either vector having zero norm (e.g. an embedder
/// returned all-zeros) is defined as similarity 0.0 rather than dividing
/// by zero.
fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Upserts one object's embedding. Takes a live connection rather than a
/// pool so it can run inside `update_source_index`'s single transaction.
pub async fn upsert_embedding(
    conn: &mut SqliteConnection,
    object_id: &str,
    embedding: &[f32],
    vec_loaded: bool,
) -> Result<(), sqlx::Error> {
    let now = chrono::Utc::now().to_rfc3339();
    if vec_loaded {
        let blob: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
        sqlx::query(
            "INSERT INTO object_vectors (object_id, embedding, dim, updated_at) VALUES (?, vec_f32(?), ?, ?)
             ON CONFLICT(object_id) DO UPDATE SET embedding = vec_f32(?), dim = ?, updated_at = ?",
        )
        .bind(object_id)
        .bind(&blob)
        .bind(embedding.len() as i64)
        .bind(&now)
        .bind(&blob)
        .bind(embedding.len() as i64)
        .bind(&now)
        .execute(&mut *conn)
        .await?;
    } else {
        let json = to_json_vector(embedding);
        sqlx::query(
            "INSERT INTO object_vectors (object_id, embedding, dim, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(object_id) DO UPDATE SET embedding = excluded.embedding, dim = excluded.dim, updated_at = excluded.updated_at",
        )
        .bind(object_id)
        .bind(&json)
        .bind(embedding.len() as i64)
        .bind(&now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[derive(FromRow)]
struct NativeRow {
    object_id: String,
    source_name: String,
    schema_name: Option<String>,
    object_type: String,
    object_name: String,
    distance: f64,
}

#[derive(FromRow)]
struct FallbackRow {
    object_id: String,
    source_name: String,
    schema_name: Option<String>,
    object_type: String,
    object_name: String,
    embedding: String,
}

pub async fn vector_search(
    pool: &SqlitePool,
    query_embedding: &[f32],
    limit: usize,
    vec_loaded: bool,
    min_score: Option<f64>,
) -> Result<Vec<RankedRow>, sqlx::Error> {
    let ranked = if vec_loaded {
        let blob: Vec<u8> = query_embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
        let rows: Vec<NativeRow> = sqlx::query_as(
            "SELECT v.object_id, s.name AS source_name, o.schema_name, o.object_type, o.object_name,
                    vec_distance_cosine(v.embedding, vec_f32(?)) AS distance
             FROM object_vectors v
             JOIN db_objects o ON o.id = v.object_id
             JOIN sources s ON s.id = o.source_id
             ORDER BY distance ASC
             LIMIT ?",
        )
        .bind(&blob)
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;

        rows.into_iter()
            .map(|r| RankedRow {
                object_id: r.object_id,
                source_name: r.source_name,
                schema_name: r.schema_name,
                kind: r.object_type,
                name_snippet: r.object_name,
                context_snippet: String::new(),
                score: 1.0 - r.distance,
            })
            .collect::<Vec<_>>()
    } else {
        let rows: Vec<FallbackRow> = sqlx::query_as(
            "SELECT v.object_id, s.name AS source_name, o.schema_name, o.object_type, o.object_name, v.embedding
             FROM object_vectors v
             JOIN db_objects o ON o.id = v.object_id
             JOIN sources s ON s.id = o.source_id",
        )
        .fetch_all(pool)
        .await?;

        let mut scored: Vec<RankedRow> = rows
            .into_iter()
            .map(|r| {
                let decoded = decode_vector(&r.embedding);
                RankedRow {
                    object_id: r.object_id,
                    source_name: r.source_name,
                    schema_name: r.schema_name,
                    kind: r.object_type,
                    name_snippet: r.object_name,
                    context_snippet: String::new(),
                    score: cosine(query_embedding, &decoded),
                }
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    };

    Ok(ranked.into_iter().filter(|row| min_score.map(|min| row.score >= min).unwrap_or(true)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_zero_vector_is_zero() {
        let zero = vec![0.0, 0.0, 0.0];
        let other = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine(&zero, &other), 0.0);
        assert_eq!(cosine(&other, &zero), 0.0);
    }

    #[test]
    fn cosine_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn json_vector_roundtrips() {
        let original = vec![0.1_f32, -0.25, 3.0];
        let json = to_json_vector(&original);
        let decoded = decode_vector(&json);
        for (a, b) in original.iter().zip(decoded.iter()) {
            assert!((*a as f64 - *b as f64).abs() < 1e-6);
        }
    }
}

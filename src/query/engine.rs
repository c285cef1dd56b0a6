//! Composite query flow: expand the query, run lexical search per
//! expansion plus one vector search, fuse everything with reciprocal
//! rank fusion, give the external rerank hook a chance to reorder the
//! fused candidates, then apply the caller's score floor and limit.

use crate::contracts::{Embedder, HookRunner};
use crate::index::fts::{search_fts, SearchFtsParams};
use crate::index::vector::vector_search;
use crate::index::RankedRow;
use crate::query::expand::expand_query;
use crate::query::rerank::apply_rerank_order;
use crate::query::rrf::reciprocal_rank_fusion;
use sqlx::SqlitePool;

#[derive(Debug, Clone)]
pub struct QueryOptions<'a> {
    pub text: &'a str,
    pub limit: usize,
    pub source: Option<&'a str>,
    pub schema: Option<&'a str>,
    pub kind: Option<&'a str>,
    pub min_score: Option<f64>,
}

/// Candidate pool fetched per ranked list before fusion, wider than the
/// caller's final `limit` so fusion has enough material to work with.
fn candidate_pool_size(limit: usize) -> usize {
    (limit * 4).max(40)
}

/// Breaks ties left by RRF in favor of rows that land early in the fused
/// order: `position_bonus = 1/(i+1)` where `i` is the 1-based post-fuse
/// index, folded in as `score += 0.1 * position_bonus`, then re-sorted.
fn apply_position_bonus(rows: &mut [RankedRow]) {
    for (idx, row) in rows.iter_mut().enumerate() {
        let i = idx + 1;
        let position_bonus = 1.0 / (i as f64 + 1.0);
        row.score += 0.1 * position_bonus;
    }
    rows.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}

pub async fn run_query(
    pool: &SqlitePool,
    embedder: Option<&dyn Embedder>,
    hook: &dyn HookRunner,
    vec_loaded: bool,
    opts: &QueryOptions<'_>,
) -> Result<Vec<RankedRow>, anyhow::Error> {
    let pool_size = candidate_pool_size(opts.limit);
    let expansions = expand_query(opts.text);

    let mut lists: Vec<Vec<RankedRow>> = Vec::new();
    for expansion in &expansions {
        let rows = search_fts(
            pool,
            SearchFtsParams {
                query: expansion,
                limit: pool_size,
                source: opts.source,
                schema: opts.schema,
                kind: opts.kind,
                min_score: None,
            },
        )
        .await?;
        lists.push(rows);
    }

    if let Some(embedder) = embedder {
        let embedding = embedder.embed(opts.text).await?;
        if !embedding.is_empty() {
            let vrows = vector_search(pool, &embedding, pool_size, vec_loaded, None).await?;
            lists.push(vrows);
        }
    }

    let mut fused = reciprocal_rank_fusion(&lists);
    apply_position_bonus(&mut fused);

    let rows_json = serde_json::to_value(
        fused.iter().take(pool_size).collect::<Vec<_>>(),
    )
    .unwrap_or(serde_json::Value::Null);

    let reordered = match hook.run(opts.text, &rows_json).await {
        Ok(Some(order)) => apply_rerank_order(&fused, &order, |r| r.object_id.clone()),
        Ok(None) => fused,
        Err(err) => {
            tracing::warn!(%err, "rerank hook failed, using fused order");
            fused
        }
    };

    let filtered: Vec<RankedRow> = reordered
        .into_iter()
        .filter(|row| opts.min_score.map(|min| row.score >= min).unwrap_or(true))
        .take(opts.limit)
        .collect();

    Ok(filtered)
}

/// `deep_search` widens the candidate pool and always exercises the
/// vector path (when an embedder is configured), for callers that want
/// recall over latency — e.g. the MCP `deep_search` tool.
pub async fn deep_search(
    pool: &SqlitePool,
    embedder: Option<&dyn Embedder>,
    hook: &dyn HookRunner,
    vec_loaded: bool,
    opts: &QueryOptions<'_>,
) -> Result<Vec<RankedRow>, anyhow::Error> {
    let widened = QueryOptions { limit: opts.limit.max(20) * 2, ..opts.clone() };
    run_query(pool, embedder, hook, vec_loaded, &widened).await
}

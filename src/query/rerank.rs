//! Optional external rerank hook: a subprocess named by `QPG_RERANK_HOOK`,
//! fed `{"query": ..., "rows": [...]}` on stdin and expected to print a
//! JSON array of object ids (the desired order) on stdout. Any failure —
//! missing env var, non-zero exit, unparseable output — is non-fatal and
//! simply leaves the input ranking untouched.

use crate::contracts::HookRunner;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub const RERANK_HOOK_ENV: &str = "QPG_RERANK_HOOK";

pub struct ProcessHookRunner;

#[async_trait]
impl HookRunner for ProcessHookRunner {
    async fn run(&self, query: &str, rows: &Value) -> Result<Option<Vec<String>>> {
        let Ok(command) = std::env::var(RERANK_HOOK_ENV) else {
            return Ok(None);
        };
        if command.trim().is_empty() {
            return Ok(None);
        }

        let payload = serde_json::json!({ "query": query, "rows": rows });

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("failed to spawn rerank hook")?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(payload.to_string().as_bytes()).await?;
        }

        let output = child.wait_with_output().await.context("rerank hook did not exit cleanly")?;
        if !output.status.success() {
            tracing::warn!(status = ?output.status, "rerank hook exited non-zero, ignoring");
            return Ok(None);
        }

        match serde_json::from_slice::<Vec<String>>(&output.stdout) {
            Ok(order) => Ok(Some(order)),
            Err(err) => {
                tracing::warn!(%err, "rerank hook output was not a JSON array of ids, ignoring");
                Ok(None)
            }
        }
    }
}

/// Reorders `rows` (by `object_id`) according to `order`. Rows named in
/// `order` come first in that sequence; any row the hook omitted keeps
/// its relative position and is appended after.
pub fn apply_rerank_order<T: Clone>(rows: &[T], ids: &[String], id_of: impl Fn(&T) -> String) -> Vec<T> {
    let mut by_id: std::collections::HashMap<String, T> = rows.iter().map(|r| (id_of(r), r.clone())).collect();
    let mut reordered = Vec::with_capacity(rows.len());
    for id in ids {
        if let Some(row) = by_id.remove(id) {
            reordered.push(row);
        }
    }
    for row in rows {
        if by_id.contains_key(&id_of(row)) {
            reordered.push(row.clone());
        }
    }
    reordered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_rerank_order_moves_named_ids_first() {
        let rows = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let ids = vec!["c".to_string(), "a".to_string()];
        let reordered = apply_rerank_order(&rows, &ids, |r| r.clone());
        assert_eq!(reordered, vec!["c", "a", "b"]);
    }

    #[test]
    fn apply_rerank_order_keeps_unmentioned_rows() {
        let rows = vec!["a".to_string(), "b".to_string()];
        let ids: Vec<String> = vec![];
        let reordered = apply_rerank_order(&rows, &ids, |r| r.clone());
        assert_eq!(reordered, rows);
    }
}

//! Reciprocal rank fusion across an arbitrary number of ranked lists.

use crate::index::RankedRow;
use std::collections::HashMap;

const DEFAULT_K: f64 = 60.0;
/// Extra credit for landing rank 0 in any contributing list, so an object
/// that's the single best hit somewhere doesn't get buried by volume.
const TOP_RANK_BONUS: f64 = 0.02;

/// Fuses multiple ranked lists of the same row type by object id. Rows
/// that appear in more than one list accumulate score across all of them.
pub fn reciprocal_rank_fusion(ranked_lists: &[Vec<RankedRow>]) -> Vec<RankedRow> {
    let mut fused: HashMap<String, (RankedRow, f64)> = HashMap::new();

    for list in ranked_lists {
        for (rank, row) in list.iter().enumerate() {
            let contribution = 1.0 / (DEFAULT_K + rank as f64 + 1.0) + if rank == 0 { TOP_RANK_BONUS } else { 0.0 };
            fused
                .entry(row.object_id.clone())
                .and_modify(|(existing, score)| {
                    *score += contribution;
                    if row.context_snippet.len() > existing.context_snippet.len() {
                        existing.context_snippet = row.context_snippet.clone();
                    }
                })
                .or_insert_with(|| (row.clone(), contribution));
        }
    }

    let mut rows: Vec<RankedRow> = fused
        .into_values()
        .map(|(mut row, score)| {
            row.score = score;
            row
        })
        .collect();
    rows.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str) -> RankedRow {
        RankedRow {
            object_id: id.to_string(),
            source_name: "src".to_string(),
            schema_name: None,
            kind: "table".to_string(),
            name_snippet: id.to_string(),
            context_snippet: String::new(),
            score: 0.0,
        }
    }

    #[test]
    fn fusion_ranks_rows_appearing_in_both_lists_highest() {
        let list_a = vec![row("a"), row("b"), row("c")];
        let list_b = vec![row("b"), row("a"), row("d")];
        let fused = reciprocal_rank_fusion(&[list_a, list_b]);
        assert_eq!(fused[0].object_id, "a");
        assert!(fused.iter().position(|r| r.object_id == "c").unwrap() > 1);
    }

    #[test]
    fn fusion_of_single_list_preserves_order() {
        let list = vec![row("x"), row("y"), row("z")];
        let fused = reciprocal_rank_fusion(&[list]);
        assert_eq!(fused.iter().map(|r| r.object_id.clone()).collect::<Vec<_>>(), vec!["x", "y", "z"]);
    }
}

//! Fixed synonym expansion so a literal miss ("charge" vs "payment") still
//! turns up the lexically distant row.

const SYNONYMS: &[(&str, &[&str])] = &[
    ("payment", &["payments", "billing", "charge"]),
    ("refund", &["refunds", "reversal", "chargeback"]),
    ("subscription", &["subscriptions", "plan", "renewal"]),
    ("status", &["state", "lifecycle"]),
    ("order", &["orders", "purchase"]),
];

/// Returns the original query plus one expansion per matched synonym
/// group, each substituting the matched word for one of its synonyms.
pub fn expand_query(query: &str) -> Vec<String> {
    let mut expansions = vec![query.to_string()];
    let lower = query.to_lowercase();

    for (word, synonyms) in SYNONYMS {
        if lower.split_whitespace().any(|tok| tok == *word) {
            for synonym in *synonyms {
                let replaced = lower.replacen(word, synonym, 1);
                if !expansions.contains(&replaced) {
                    expansions.push(replaced);
                }
            }
        }
    }

    expansions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_query_includes_original() {
        let expanded = expand_query("find the widget");
        assert_eq!(expanded, vec!["find the widget".to_string()]);
    }

    #[test]
    fn expand_query_adds_synonyms_for_known_word() {
        let expanded = expand_query("payment table");
        assert!(expanded.iter().any(|q| q.contains("billing")));
        assert!(expanded.iter().any(|q| q.contains("charge")));
        assert!(expanded.iter().any(|q| q.contains("payments")));
        assert_eq!(expanded.len(), 4);
    }

    #[test]
    fn expand_query_is_case_insensitive_on_match() {
        let expanded = expand_query("Refund Table");
        assert!(expanded.len() > 1);
    }

    #[test]
    fn expand_query_covers_all_five_synonym_groups() {
        for word in ["payment", "refund", "subscription", "status", "order"] {
            assert!(expand_query(word).len() > 1, "'{word}' should expand");
        }
    }
}

use fusion_search::FusedResult;
use serde_json::Value;

use crate::command::FuseOutcome;

/// Markdown table of a fusion run, for humans reading a terminal.
pub fn render_fuse_report(outcome: &FuseOutcome, with_details: bool) -> String {
    let mut md = String::new();
    md.push_str(&format!(
        "# Fused results (k={}, {} results)\n\n",
        outcome.k,
        outcome.results.len()
    ));

    if with_details {
        md.push_str("| # | id | title | score | details |\n");
        md.push_str("|---:|---|---|---:|---|\n");
    } else {
        md.push_str("| # | id | title | score |\n");
        md.push_str("|---:|---|---|---:|\n");
    }

    for (idx, result) in outcome.results.iter().enumerate() {
        md.push_str(&format!(
            "| {} | `{}` | {} | `{:.6}` |",
            idx + 1,
            escape_cell(result.id()),
            escape_cell(&truncate_one_line(&title_of(result), 60)),
            result.score
        ));
        if with_details {
            md.push_str(&format!(" {} |", escape_cell(&result.score_details().to_string())));
        }
        md.push('\n');
    }

    md
}

fn title_of(result: &FusedResult) -> String {
    match result.candidate.payload.get("title") {
        Some(Value::String(title)) => title.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn truncate_one_line(text: &str, max_chars: usize) -> String {
    let mut s = text.replace(['\n', '\r', '\t'], " ");
    s = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if s.chars().count() <= max_chars {
        return s;
    }
    let truncated: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{truncated}…")
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusion_search::{Candidate, Contribution};
    use serde_json::{json, Map};
    use std::collections::BTreeMap;

    fn outcome() -> FuseOutcome {
        let mut payload = Map::new();
        payload.insert("title".to_string(), json!("AI | ML\nsuccess"));
        let mut contributions = BTreeMap::new();
        contributions.insert(
            "vector".to_string(),
            Contribution {
                rank: 1,
                value: 0.5,
                native_score: Some(0.9),
            },
        );
        FuseOutcome {
            k: 60.0,
            results: vec![FusedResult {
                candidate: Candidate::with_payload("ai_success_1", payload),
                score: 0.5,
                contributions,
            }],
        }
    }

    #[test]
    fn renders_rows_with_escaped_titles() {
        let md = render_fuse_report(&outcome(), false);
        assert!(md.starts_with("# Fused results (k=60, 1 results)"));
        assert!(md.contains("| 1 | `ai_success_1` | AI \\| ML success | `0.500000` |"));
        assert!(!md.contains("details"));
    }

    #[test]
    fn renders_details_column_on_request() {
        let md = render_fuse_report(&outcome(), true);
        assert!(md.contains("| details |"));
        assert!(md.contains("0.500000 = vector#1 0.500000"));
    }

    #[test]
    fn truncates_long_titles() {
        let long = "x".repeat(100);
        assert_eq!(truncate_one_line(&long, 10).chars().count(), 10);
    }
}

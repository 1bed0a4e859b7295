//! FTS5 query preprocessing per §4.3: strip the FTS operator set, split
//! into terms, re-emit as a disjunction of prefix tokens so arbitrary
//! user input can never produce a syntax error from SQLite's MATCH
//! parser.

const FTS_OPERATORS: &[char] = &['*', '"', '(', ')', '{', '}', '[', ']', '^', '~', '\\'];

/// Returns `None` when the query has no usable terms (empty, or
/// entirely punctuation) — callers treat that as "no matches" rather
/// than running an empty MATCH expression.
pub fn prepare_fts_query(raw: &str) -> Option<String> {
    let stripped: String = raw
        .chars()
        .map(|c| if FTS_OPERATORS.contains(&c) { ' ' } else { c })
        .collect();

    let terms: Vec<String> = stripped
        .split_whitespace()
        .map(|t| format!("\"{t}\"*"))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_operators_and_emits_prefix_disjunction() {
        assert_eq!(
            prepare_fts_query("read file"),
            Some("\"read\"* OR \"file\"*".to_string())
        );
    }

    #[test]
    fn symbol_only_input_yields_no_query_rather_than_raising() {
        assert_eq!(prepare_fts_query("***"), None);
        assert_eq!(prepare_fts_query(""), None);
    }

    #[test]
    fn strips_quotes_and_brackets() {
        let out = prepare_fts_query("\"weird\" [query]").unwrap();
        assert_eq!(out, "\"weird\"* OR \"query\"*");
    }
}

use std::collections::HashSet;

/// Search queries for a run: each keyword, then `"<competitor> alternative"`
/// for each competitor. Blank entries are skipped and repeats removed
/// case-insensitively, keeping the first spelling.
#[must_use]
pub fn build_search_queries(keywords: &[String], competitors: &[String]) -> Vec<String> {
    let candidates = keywords
        .iter()
        .map(|k| k.trim().to_owned())
        .chain(
            competitors
                .iter()
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .map(|c| format!("{c} alternative")),
        );

    let mut seen = HashSet::new();
    candidates
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.to_lowercase()))
        .collect()
}

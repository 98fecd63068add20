//! Ranking of raw indexer results.

use std::cmp::Ordering;

use super::SearchResult;

/// What the caller is looking for.
#[derive(Debug, Clone, Default)]
pub struct RankCriteria {
    /// Title identifier expected somewhere in the release name.
    pub title_id: String,
    /// Wanted version number, matched bare or `v`-prefixed.
    pub version: Option<u64>,
    pub min_seeders: u32,
    /// Every term must appear in the title.
    pub required_terms: Vec<String>,
    /// No term may appear in the title.
    pub blacklist_terms: Vec<String>,
}

/// Lowercase, replace punctuation with spaces and collapse whitespace.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn passes_filters(result: &SearchResult, normalized_title: &str, criteria: &RankCriteria) -> bool {
    if result.seeders < criteria.min_seeders {
        return false;
    }

    let required_ok = criteria
        .required_terms
        .iter()
        .map(|t| normalize(t))
        .filter(|t| !t.is_empty())
        .all(|t| normalized_title.contains(&t));
    if !required_ok {
        return false;
    }

    !criteria
        .blacklist_terms
        .iter()
        .map(|t| normalize(t))
        .filter(|t| !t.is_empty())
        .any(|t| normalized_title.contains(&t))
}

/// Score a result that already passed the filters.
pub fn score_result(result: &SearchResult, criteria: &RankCriteria) -> f64 {
    let title = normalize(&result.title);
    let tokens: Vec<&str> = title.split(' ').collect();
    let mut score = 0.0;

    let title_id = normalize(&criteria.title_id);
    if !title_id.is_empty() && title.contains(&title_id) {
        score += 50.0;
    }

    if let Some(version) = criteria.version {
        let bare = version.to_string();
        let prefixed = format!("v{}", version);
        if tokens.iter().any(|t| *t == bare || *t == prefixed) {
            score += 30.0;
        }
    }

    if tokens.contains(&"update") {
        score += 10.0;
    }

    if tokens.iter().any(|t| *t == "nsp" || *t == "nsz") {
        score += 5.0;
    }

    score + f64::from(result.seeders.min(200)) / 10.0
}

/// Filter and order results, best first.
///
/// Ties on score are broken by more seeders, then smaller size. The sort is
/// stable, so equal results keep their input order.
pub fn rank_results(results: &[SearchResult], criteria: &RankCriteria) -> Vec<SearchResult> {
    let mut scored: Vec<(f64, &SearchResult)> = results
        .iter()
        .filter(|r| passes_filters(r, &normalize(&r.title), criteria))
        .map(|r| (score_result(r, criteria), r))
        .collect();

    scored.sort_by(|(score_a, a), (score_b, b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.seeders.cmp(&a.seeders))
            .then_with(|| a.size.cmp(&b.size))
    });

    scored.into_iter().map(|(_, r)| r.clone()).collect()
}

/// Pick the best result, or `None` when nothing survives the filters.
pub fn pick_best_result(results: &[SearchResult], criteria: &RankCriteria) -> Option<SearchResult> {
    rank_results(results, criteria).into_iter().next()
}

//! Filtering and staged text matching.
//!
//! A query runs in two steps. [`filter_candidates`] applies the organism,
//! project-type and keyword predicates to the whole row collection and
//! records how many rows survive each one. [`search`] then matches the
//! free-text query against the surviving candidates, escalating through
//! progressively looser strategies until one of them returns something:
//!
//! | Stage     | A candidate matches when                                    |
//! |-----------|-------------------------------------------------------------|
//! | `full`    | every query token is in its token set                       |
//! | `partial` | at least `ceil(partial_min_fraction × n)` tokens are        |
//! | `phrase`  | the normalized query is a substring of title or description |
//! | `fuzzy`   | a strict majority of tokens are within edit distance        |
//!
//! An empty query skips matching (`filter_only`); nothing after `fuzzy` is
//! `no_match`, which is a normal, empty result. Match order is row order;
//! the ranker decides presentation order.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CatalogError, Result};
use crate::index::TokenIndex;
use crate::models::{AggregateRow, RowId};
use crate::normalize::{alias_key, Normalizer};
use crate::tokenize::{normalize_text, Tokenizer};

pub const MAX_PAGE_SIZE: i64 = 200;
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Matching thresholds, the `[search]` config section.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_partial_min_fraction")]
    pub partial_min_fraction: f64,
    #[serde(default = "default_phrase_min_chars")]
    pub phrase_min_chars: usize,
    /// Edit distance allowed for query tokens longer than five characters.
    #[serde(default = "default_fuzzy_max_distance")]
    pub fuzzy_max_distance: usize,
    /// Upper bound on candidates compared in the fuzzy stage.
    #[serde(default = "default_fuzzy_candidate_cap")]
    pub fuzzy_candidate_cap: usize,
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
}

fn default_partial_min_fraction() -> f64 {
    0.5
}

fn default_phrase_min_chars() -> usize {
    4
}

fn default_fuzzy_max_distance() -> usize {
    2
}

fn default_fuzzy_candidate_cap() -> usize {
    2000
}

fn default_max_query_chars() -> usize {
    512
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            partial_min_fraction: default_partial_min_fraction(),
            phrase_min_chars: default_phrase_min_chars(),
            fuzzy_max_distance: default_fuzzy_max_distance(),
            fuzzy_candidate_cap: default_fuzzy_candidate_cap(),
            max_query_chars: default_max_query_chars(),
        }
    }
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

/// One catalog query. Immutable once validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    #[serde(default)]
    pub organism: Vec<String>,
    #[serde(default)]
    pub project_type: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, alias = "query")]
    pub q: String,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    #[serde(default)]
    pub compact: bool,
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            organism: Vec::new(),
            project_type: Vec::new(),
            keywords: Vec::new(),
            q: String::new(),
            page: default_page(),
            page_size: default_page_size(),
            compact: false,
        }
    }
}

impl QueryFilter {
    /// Reject the filter before it reaches a snapshot.
    pub fn validate(&self, settings: &SearchSettings) -> Result<()> {
        if self.page < 1 {
            return Err(CatalogError::validation(
                "page",
                format!("must be at least 1, got {}", self.page),
            ));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(CatalogError::validation(
                "page_size",
                format!(
                    "must be between 1 and {}, got {}",
                    MAX_PAGE_SIZE, self.page_size
                ),
            ));
        }
        for (field, values) in [
            ("organism", &self.organism),
            ("project_type", &self.project_type),
            ("keywords", &self.keywords),
        ] {
            if values.iter().any(|v| v.trim().is_empty()) {
                return Err(CatalogError::validation(field, "entries must not be blank"));
            }
        }
        let query_chars = self.q.chars().count();
        if query_chars > settings.max_query_chars {
            return Err(CatalogError::validation(
                "q",
                format!(
                    "must be at most {} characters, got {}",
                    settings.max_query_chars, query_chars
                ),
            ));
        }
        Ok(())
    }

    /// Order- and case-insensitive key; equivalent filters share it.
    pub fn cache_key(&self) -> String {
        let canon = |values: &[String]| -> Vec<String> {
            values
                .iter()
                .map(|v| v.trim().to_lowercase())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };
        serde_json::json!({
            "organism": canon(&self.organism),
            "project_type": canon(&self.project_type),
            "keywords": canon(&self.keywords),
            "q": self.q.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase(),
            "page": self.page,
            "page_size": self.page_size,
            "compact": self.compact,
        })
        .to_string()
    }

    /// `?organism=...&q=...` rendering that reproduces this filter.
    pub fn query_params(&self) -> String {
        let mut parts = Vec::new();
        for (key, values) in [
            ("organism", &self.organism),
            ("project_type", &self.project_type),
            ("keywords", &self.keywords),
        ] {
            for value in values {
                parts.push(format!("{}={}", key, encode_component(value)));
            }
        }
        if !self.q.trim().is_empty() {
            parts.push(format!("q={}", encode_component(self.q.trim())));
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!("?{}", parts.join("&"))
        }
    }

    pub fn has_text_query(&self) -> bool {
        !self.q.trim().is_empty()
    }
}

fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// How many rows survived each filter predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub initial: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_organism: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_project_type: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_keywords: Option<usize>,
}

/// Apply the hard predicates. Returns surviving row ids in row order.
pub fn filter_candidates(
    rows: &[AggregateRow],
    index: &TokenIndex,
    tokenizer: &Tokenizer,
    normalizer: &Normalizer,
    filter: &QueryFilter,
) -> (Vec<RowId>, FilterStats) {
    let mut working: Vec<RowId> = (0..rows.len()).collect();
    let mut stats = FilterStats {
        initial: working.len(),
        ..Default::default()
    };

    if !filter.organism.is_empty() {
        let wanted: HashSet<String> = filter
            .organism
            .iter()
            .map(|o| alias_key(&normalizer.organism_label(o)))
            .collect();
        working.retain(|&r| wanted.contains(&alias_key(&rows[r].organism_label)));
        stats.after_organism = Some(working.len());
    }

    if !filter.project_type.is_empty() {
        let wanted: HashSet<String> = filter
            .project_type
            .iter()
            .map(|p| alias_key(&normalizer.project_label(p)))
            .collect();
        working.retain(|&r| wanted.contains(&alias_key(&rows[r].project_label)));
        stats.after_project_type = Some(working.len());
    }

    if !filter.keywords.is_empty() {
        for keyword in &filter.keywords {
            let tokens = tokenizer.tokens(keyword);
            if tokens.is_empty() {
                // Keyword made only of short words or stopwords.
                let needle = normalize_text(keyword);
                working.retain(|&r| {
                    index
                        .row_text(r)
                        .map(|t| t.title.contains(&needle) || t.description.contains(&needle))
                        .unwrap_or(false)
                });
            } else {
                working.retain(|&r| tokens.iter().all(|t| index.contains(r, t)));
            }
        }
        stats.after_keywords = Some(working.len());
    }

    (working, stats)
}

/// Strategy that produced the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStage {
    FilterOnly,
    Full,
    Partial,
    Phrase,
    Fuzzy,
    NoMatch,
}

impl MatchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStage::FilterOnly => "filter_only",
            MatchStage::Full => "full",
            MatchStage::Partial => "partial",
            MatchStage::Phrase => "phrase",
            MatchStage::Fuzzy => "fuzzy",
            MatchStage::NoMatch => "no_match",
        }
    }
}

impl std::fmt::Display for MatchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One matched row and the share of query tokens it covered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowMatch {
    pub row: RowId,
    /// In `[0, 1]`; 1.0 for `filter_only` and `phrase`.
    pub coverage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub stage: MatchStage,
    pub matches: Vec<RowMatch>,
    pub query_tokens: Vec<String>,
}

impl SearchResult {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }
}

/// Match `query` against `candidates`, escalating stage by stage.
pub fn search(
    candidates: &[RowId],
    query: &str,
    index: &TokenIndex,
    tokenizer: &Tokenizer,
    settings: &SearchSettings,
) -> SearchResult {
    let query_tokens = tokenizer.unique_tokens(query);

    if query.trim().is_empty() {
        return SearchResult {
            stage: MatchStage::FilterOnly,
            matches: candidates
                .iter()
                .map(|&row| RowMatch { row, coverage: 1.0 })
                .collect(),
            query_tokens,
        };
    }

    let (stage, matches) = 'stages: {
        if !query_tokens.is_empty() {
            let hits = token_hits(candidates, &query_tokens, index);
            let n = query_tokens.len();

            let full = select_by_hits(candidates, &hits, n, n);
            if !full.is_empty() {
                break 'stages (MatchStage::Full, full);
            }

            let min_hits = ((settings.partial_min_fraction * n as f64).ceil() as usize).max(1);
            let partial = select_by_hits(candidates, &hits, n, min_hits);
            if !partial.is_empty() {
                break 'stages (MatchStage::Partial, partial);
            }
        }

        let phrase = phrase_matches(candidates, query, index, settings.phrase_min_chars);
        if !phrase.is_empty() {
            break 'stages (MatchStage::Phrase, phrase);
        }

        let fuzzy = fuzzy_matches(candidates, &query_tokens, index, settings);
        if !fuzzy.is_empty() {
            break 'stages (MatchStage::Fuzzy, fuzzy);
        }

        (MatchStage::NoMatch, Vec::new())
    };

    debug!(
        stage = stage.as_str(),
        candidates = candidates.len(),
        matches = matches.len(),
        "staged search finished"
    );

    SearchResult {
        stage,
        matches,
        query_tokens,
    }
}

/// Count query-token hits per candidate by walking postings lists.
fn token_hits(candidates: &[RowId], tokens: &[String], index: &TokenIndex) -> HashMap<RowId, usize> {
    let allowed: HashSet<RowId> = candidates.iter().copied().collect();
    let mut hits: HashMap<RowId, usize> = HashMap::new();
    for token in tokens {
        if let Some(postings) = index.postings(token) {
            for row in postings.iter().filter(|r| allowed.contains(*r)) {
                *hits.entry(*row).or_insert(0) += 1;
            }
        }
    }
    hits
}

fn select_by_hits(
    candidates: &[RowId],
    hits: &HashMap<RowId, usize>,
    n: usize,
    min_hits: usize,
) -> Vec<RowMatch> {
    candidates
        .iter()
        .filter_map(|&row| {
            let count = hits.get(&row).copied().unwrap_or(0);
            (count >= min_hits).then(|| RowMatch {
                row,
                coverage: count as f64 / n as f64,
            })
        })
        .collect()
}

fn phrase_matches(
    candidates: &[RowId],
    query: &str,
    index: &TokenIndex,
    min_chars: usize,
) -> Vec<RowMatch> {
    let phrase = normalize_text(query);
    if phrase.chars().count() < min_chars {
        return Vec::new();
    }
    candidates
        .iter()
        .filter(|&&row| {
            index
                .row_text(row)
                .map(|t| t.title.contains(&phrase) || t.description.contains(&phrase))
                .unwrap_or(false)
        })
        .map(|&row| RowMatch { row, coverage: 1.0 })
        .collect()
}

/// Edit distance tolerated for a query token.
pub fn fuzzy_tolerance(token: &str, max_distance: usize) -> usize {
    if token.chars().count() <= 5 {
        1
    } else {
        max_distance
    }
}

fn fuzzy_matches(
    candidates: &[RowId],
    query_tokens: &[String],
    index: &TokenIndex,
    settings: &SearchSettings,
) -> Vec<RowMatch> {
    let n = query_tokens.len();
    if n == 0 {
        return Vec::new();
    }
    let tolerances: Vec<usize> = query_tokens
        .iter()
        .map(|t| fuzzy_tolerance(t, settings.fuzzy_max_distance))
        .collect();

    let mut out = Vec::new();
    for &row in candidates.iter().take(settings.fuzzy_candidate_cap) {
        let Some(row_tokens) = index.row_tokens(row) else {
            continue;
        };
        let matched = query_tokens
            .iter()
            .zip(&tolerances)
            .filter(|(q, tol)| row_tokens.iter().any(|t| within_distance(q, t, **tol)))
            .count();
        if matched * 2 > n {
            out.push(RowMatch {
                row,
                coverage: matched as f64 / n as f64,
            });
        }
    }
    out
}

fn within_distance(a: &str, b: &str, tolerance: usize) -> bool {
    let (la, lb) = (a.chars().count(), b.chars().count());
    if la.abs_diff(lb) > tolerance {
        return false;
    }
    strsim::levenshtein(a, b) <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    fn row(id: &str, organism: &str, project: &str, title: &str, desc: &str) -> AggregateRow {
        AggregateRow {
            identifier: id.to_string(),
            organism_label: organism.to_string(),
            project_label: project.to_string(),
            kind: SourceKind::Study,
            title: Some(title.to_string()),
            description: Some(desc.to_string()),
            abstract_text: None,
            conclusions: None,
            release_date: None,
            citation_count: None,
            doi: None,
            url: None,
        }
    }

    fn fixture() -> (Vec<AggregateRow>, TokenIndex, Tokenizer) {
        let rows = vec![
            row("OSD-1", "Plant", "High Altitude", "Arabidopsis root growth under high altitude", "Seedlings at altitude."),
            row("OSD-2", "Plant", "Ground", "Leaf development in wheat", "Controlled chamber."),
            row("OSD-3", "Rodent", "Spaceflight", "Bone density loss in mice", "Microgravity exposure."),
            row("OSD-4", "Rodent", "Ground", "Muscle atrophy markers", "Hindlimb unloading."),
        ];
        let tok = Tokenizer::default();
        let idx = TokenIndex::build(&rows, &tok);
        (rows, idx, tok)
    }

    fn ids(rows: &[AggregateRow], result: &SearchResult) -> Vec<String> {
        result
            .matches
            .iter()
            .map(|m| rows[m.row].identifier.clone())
            .collect()
    }

    #[test]
    fn test_validate_rejects_page_size_out_of_range() {
        let filter = QueryFilter {
            page_size: 500,
            ..Default::default()
        };
        let err = filter.validate(&SearchSettings::default()).unwrap_err();
        assert!(matches!(err, CatalogError::Validation { field: "page_size", .. }));
        assert!(err.to_string().contains("between 1 and 200"));
    }

    #[test]
    fn test_validate_rejects_page_zero_and_blank_entries() {
        let settings = SearchSettings::default();
        let filter = QueryFilter {
            page: 0,
            ..Default::default()
        };
        assert!(matches!(
            filter.validate(&settings),
            Err(CatalogError::Validation { field: "page", .. })
        ));
        let filter = QueryFilter {
            organism: vec!["  ".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            filter.validate(&settings),
            Err(CatalogError::Validation { field: "organism", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_long_query() {
        let filter = QueryFilter {
            q: "x".repeat(600),
            ..Default::default()
        };
        assert!(filter.validate(&SearchSettings::default()).is_err());
    }

    #[test]
    fn test_cache_key_ignores_order_and_case() {
        let a = QueryFilter {
            organism: vec!["Plant".to_string(), "Rodent".to_string()],
            q: "Root  Growth".to_string(),
            ..Default::default()
        };
        let b = QueryFilter {
            organism: vec!["rodent".to_string(), "plant".to_string()],
            q: "root growth".to_string(),
            ..Default::default()
        };
        assert_eq!(a.cache_key(), b.cache_key());
        let c = QueryFilter { page: 2, ..b };
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[test]
    fn test_query_params_encoding() {
        let filter = QueryFilter {
            organism: vec!["Fruit Fly".to_string()],
            q: "bone loss".to_string(),
            ..Default::default()
        };
        assert_eq!(filter.query_params(), "?organism=Fruit%20Fly&q=bone%20loss");
        assert_eq!(QueryFilter::default().query_params(), "");
    }

    #[test]
    fn test_filter_by_organism_uses_aliases() {
        let (rows, idx, tok) = fixture();
        let filter = QueryFilter {
            organism: vec!["plant".to_string()],
            ..Default::default()
        };
        let (cands, stats) = filter_candidates(&rows, &idx, &tok, &Normalizer::default(), &filter);
        assert_eq!(cands, vec![0, 1]);
        assert_eq!(stats.initial, 4);
        assert_eq!(stats.after_organism, Some(2));
        assert_eq!(stats.after_project_type, None);
    }

    #[test]
    fn test_filter_keywords_are_anded() {
        let (rows, idx, tok) = fixture();
        let filter = QueryFilter {
            keywords: vec!["bone".to_string(), "mice".to_string()],
            ..Default::default()
        };
        let (cands, stats) = filter_candidates(&rows, &idx, &tok, &Normalizer::default(), &filter);
        assert_eq!(cands, vec![2]);
        assert_eq!(stats.after_keywords, Some(1));

        let filter = QueryFilter {
            keywords: vec!["bone".to_string(), "wheat".to_string()],
            ..Default::default()
        };
        let (cands, _) = filter_candidates(&rows, &idx, &tok, &Normalizer::default(), &filter);
        assert!(cands.is_empty());
    }

    #[test]
    fn test_empty_query_is_filter_only() {
        let (_, idx, tok) = fixture();
        let result = search(&[0, 1], "  ", &idx, &tok, &SearchSettings::default());
        assert_eq!(result.stage, MatchStage::FilterOnly);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_full_stage_wins_when_possible() {
        let (rows, idx, tok) = fixture();
        let all: Vec<RowId> = (0..rows.len()).collect();
        let result = search(&all, "bone density", &idx, &tok, &SearchSettings::default());
        assert_eq!(result.stage, MatchStage::Full);
        assert_eq!(ids(&rows, &result), vec!["OSD-3"]);
        assert_eq!(result.matches[0].coverage, 1.0);
    }

    #[test]
    fn test_partial_stage_when_no_full_match() {
        let (rows, idx, tok) = fixture();
        let result = search(&[0, 1], "root development", &idx, &tok, &SearchSettings::default());
        assert_eq!(result.stage, MatchStage::Partial);
        assert_eq!(ids(&rows, &result), vec!["OSD-1", "OSD-2"]);
        assert!((result.matches[0].coverage - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_phrase_stage_when_query_has_no_tokens() {
        let (rows, idx, tok) = fixture();
        let all: Vec<RowId> = (0..rows.len()).collect();
        let result = search(&all, "s in m", &idx, &tok, &SearchSettings::default());
        assert!(result.query_tokens.is_empty());
        assert_eq!(result.stage, MatchStage::Phrase);
        assert_eq!(ids(&rows, &result), vec!["OSD-3"]);
    }

    #[test]
    fn test_short_words_do_not_block_full_match() {
        let (rows, idx, tok) = fixture();
        let all: Vec<RowId> = (0..rows.len()).collect();
        let result = search(&all, "in wheat", &idx, &tok, &SearchSettings::default());
        assert_eq!(result.stage, MatchStage::Full);
        assert_eq!(ids(&rows, &result), vec!["OSD-2"]);
    }

    #[test]
    fn test_fuzzy_stage_tolerates_typos() {
        let (rows, idx, tok) = fixture();
        let all: Vec<RowId> = (0..rows.len()).collect();
        let result = search(&all, "arabidopsys", &idx, &tok, &SearchSettings::default());
        assert_eq!(result.stage, MatchStage::Fuzzy);
        assert_eq!(ids(&rows, &result), vec!["OSD-1"]);
    }

    #[test]
    fn test_fuzzy_respects_candidate_cap() {
        let (_, idx, tok) = fixture();
        let settings = SearchSettings {
            fuzzy_candidate_cap: 0,
            ..Default::default()
        };
        let result = search(&[0, 1, 2, 3], "arabidopsys", &idx, &tok, &settings);
        assert_eq!(result.stage, MatchStage::NoMatch);
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        let (_, idx, tok) = fixture();
        let result = search(&[0, 1, 2, 3], "zzzzqqqq", &idx, &tok, &SearchSettings::default());
        assert_eq!(result.stage, MatchStage::NoMatch);
        assert!(result.is_empty());
        assert_eq!(result.query_tokens, vec!["zzzzqqqq"]);
    }

    #[test]
    fn test_search_only_returns_candidates() {
        let (rows, idx, tok) = fixture();
        let result = search(&[2, 3], "root growth", &idx, &tok, &SearchSettings::default());
        assert!(result.matches.iter().all(|m| m.row == 2 || m.row == 3));
        assert_eq!(ids(&rows, &result).len(), 0);
    }
}

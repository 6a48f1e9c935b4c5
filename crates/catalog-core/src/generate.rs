//! Heuristic derivation of descriptive fields.
//!
//! Everything here is extractive: values are assembled from the rows' own
//! text and the active filter, with no randomness and no external calls, so
//! the same (rows, filter, query) always produces the same output.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::index::TokenIndex;
use crate::models::AggregateRow;
use crate::rank::RankedRow;
use crate::search::QueryFilter;
use crate::tokenize::{normalize_text, split_sentences, Tokenizer};

/// Titles that say nothing about the study.
const GENERIC_TITLES: &[&str] = &[
    "untitled",
    "no title",
    "sin titulo",
    "study",
    "experiment",
    "dataset",
    "data",
    "research",
    "article",
    "estudio",
];

const TOP_KEYWORDS: usize = 5;

/// Tuning for the generator, the `[generation]` config section.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateSettings {
    /// Titles shorter than this are considered generic.
    #[serde(default = "default_generic_title_min_chars")]
    pub generic_title_min_chars: usize,
    #[serde(default = "default_alt_title_tokens")]
    pub alt_title_tokens: usize,
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
    #[serde(default = "default_emerging_limit")]
    pub emerging_limit: usize,
    /// Tokens in more rows than this are not "globally rare".
    #[serde(default = "default_emerging_max_global")]
    pub emerging_max_global: usize,
    #[serde(default = "default_emerging_samples")]
    pub emerging_samples: usize,
    #[serde(default = "default_frequent_limit")]
    pub frequent_limit: usize,
    /// Ranked rows scanned for frequent terms.
    #[serde(default = "default_frequent_head")]
    pub frequent_head: usize,
    #[serde(default = "default_suggested_limit")]
    pub suggested_keywords_limit: usize,
    #[serde(default = "default_highlight_count")]
    pub highlight_count: usize,
    #[serde(default = "default_description_words")]
    pub description_max_words: usize,
    #[serde(default = "default_description_rows")]
    pub description_source_rows: usize,
}

fn default_generic_title_min_chars() -> usize {
    20
}
fn default_alt_title_tokens() -> usize {
    6
}
fn default_summary_max_chars() -> usize {
    280
}
fn default_emerging_limit() -> usize {
    5
}
fn default_emerging_max_global() -> usize {
    12
}
fn default_emerging_samples() -> usize {
    4
}
fn default_frequent_limit() -> usize {
    8
}
fn default_frequent_head() -> usize {
    120
}
fn default_suggested_limit() -> usize {
    12
}
fn default_highlight_count() -> usize {
    3
}
fn default_description_words() -> usize {
    160
}
fn default_description_rows() -> usize {
    60
}

impl Default for GenerateSettings {
    fn default() -> Self {
        Self {
            generic_title_min_chars: default_generic_title_min_chars(),
            alt_title_tokens: default_alt_title_tokens(),
            summary_max_chars: default_summary_max_chars(),
            emerging_limit: default_emerging_limit(),
            emerging_max_global: default_emerging_max_global(),
            emerging_samples: default_emerging_samples(),
            frequent_limit: default_frequent_limit(),
            frequent_head: default_frequent_head(),
            suggested_keywords_limit: default_suggested_limit(),
            highlight_count: default_highlight_count(),
            description_max_words: default_description_words(),
            description_source_rows: default_description_rows(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicSample {
    pub id: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmergingTopic {
    pub topic: String,
    pub subset_occurrences: usize,
    pub global_occurrences: usize,
    pub score: f64,
    pub sample_studies: Vec<TopicSample>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermCount {
    pub token: String,
    pub occurrences: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedMeta {
    pub mode: String,
    pub fallback_chain: Vec<String>,
    pub final_source: String,
    pub llm_used: bool,
    pub tokens_sampled: usize,
}

/// Result-set level title and description.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedBlock {
    pub title: String,
    pub description: String,
    pub meta: GeneratedMeta,
}

/// Result-set title built from the filter exactly as the caller spelled it.
pub fn block_title(filter: &QueryFilter) -> String {
    let mut parts: Vec<String> = Vec::new();
    let organisms: Vec<&str> = filter.organism.iter().take(2).map(|s| s.trim()).collect();
    parts.push(if organisms.is_empty() {
        "Studies".to_string()
    } else {
        organisms.join(", ")
    });
    let projects: Vec<&str> = filter.project_type.iter().take(2).map(|s| s.trim()).collect();
    if !projects.is_empty() {
        parts.push(projects.join(", "));
    }
    if filter.has_text_query() {
        parts.push(format!("\"{}\"", filter.q.trim()));
    }
    parts.join(" - ")
}

/// Per-row generated fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowGenerated {
    pub alt_title: Option<String>,
    pub compact_summary: Option<String>,
    pub top_keywords: Vec<String>,
}

pub struct Generator<'a> {
    tokenizer: &'a Tokenizer,
    settings: &'a GenerateSettings,
}

impl<'a> Generator<'a> {
    pub fn new(tokenizer: &'a Tokenizer, settings: &'a GenerateSettings) -> Self {
        Self {
            tokenizer,
            settings,
        }
    }

    pub fn row_fields(&self, row: &AggregateRow, focus: &HashSet<String>) -> RowGenerated {
        RowGenerated {
            alt_title: self.alt_title(row),
            compact_summary: self.compact_summary(row, focus),
            top_keywords: self.top_keywords(row, focus),
        }
    }

    /// Distinctive row tokens, the ones the query asked for first.
    pub fn top_keywords(&self, row: &AggregateRow, focus: &HashSet<String>) -> Vec<String> {
        let mut tokens = self.distinctive_tokens(&row.searchable_text());
        tokens.sort_by_key(|t| !focus.contains(t));
        tokens.truncate(TOP_KEYWORDS);
        tokens
    }

    pub fn is_generic_title(&self, title: Option<&str>) -> bool {
        let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) else {
            return true;
        };
        if title.chars().count() < self.settings.generic_title_min_chars {
            return true;
        }
        if GENERIC_TITLES.contains(&normalize_text(title).as_str()) {
            return true;
        }
        self.distinctive_tokens(title).len() < 3
    }

    /// Derived title for generic titles, else the title unchanged.
    pub fn alt_title(&self, row: &AggregateRow) -> Option<String> {
        if !self.is_generic_title(row.title.as_deref()) {
            return row.title.clone();
        }
        let derived: Vec<String> = row
            .description
            .as_deref()
            .map(|d| self.distinctive_tokens(d))
            .unwrap_or_default()
            .into_iter()
            .take(self.settings.alt_title_tokens)
            .collect();
        if derived.is_empty() {
            return row.title.clone();
        }
        Some(capitalize(&derived.join(" ")))
    }

    /// Best-overlapping sentence, or a lead excerpt without overlap.
    pub fn compact_summary(&self, row: &AggregateRow, focus: &HashSet<String>) -> Option<String> {
        let text = row
            .description
            .as_deref()
            .or(row.abstract_text.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())?;

        let mut best: Option<(usize, String)> = None;
        if !focus.is_empty() {
            for sentence in split_sentences(text) {
                let overlap = self
                    .tokenizer
                    .token_set(&sentence)
                    .iter()
                    .filter(|t| focus.contains(*t))
                    .count();
                if overlap > 0 && best.as_ref().map_or(true, |(b, _)| overlap > *b) {
                    best = Some((overlap, sentence));
                }
            }
        }

        let chosen = match best {
            Some((_, sentence)) => sentence,
            None => text.to_string(),
        };
        Some(truncate_words(&chosen, self.settings.summary_max_chars))
    }

    /// Tokens frequent in the matched subset but rare in the whole catalog.
    pub fn emerging_terms(
        &self,
        rows: &[AggregateRow],
        ranked: &[RankedRow],
        index: &TokenIndex,
    ) -> Vec<EmergingTopic> {
        if ranked.is_empty() {
            return Vec::new();
        }
        let mut subset: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for r in ranked {
            if let Some(tokens) = index.row_tokens(r.row) {
                for token in tokens.iter().filter(|t| is_topic_token(t)) {
                    subset.entry(token.as_str()).or_default().push(r.row);
                }
            }
        }

        let subset_cap = ((ranked.len() as f64) * 0.5) as usize;
        let subset_cap = subset_cap.max(6);
        let mut candidates: Vec<EmergingTopic> = subset
            .into_iter()
            .filter_map(|(token, members)| {
                let sub = members.len();
                let glob = index.doc_freq(token);
                if glob == 0 || glob > self.settings.emerging_max_global || sub > subset_cap {
                    return None;
                }
                let (s, g) = (sub as f64, glob as f64);
                let score = (s / g) * (1.0 + s).ln() / (1.0 + (1.0 + g).ln());
                Some(EmergingTopic {
                    topic: token.to_string(),
                    subset_occurrences: sub,
                    global_occurrences: glob,
                    score,
                    sample_studies: members
                        .iter()
                        .take(self.settings.emerging_samples)
                        .map(|&row| TopicSample {
                            id: rows[row].identifier.clone(),
                            title: rows[row].title.clone(),
                        })
                        .collect(),
                })
            })
            .collect();

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.topic.cmp(&b.topic)));
        candidates.truncate(self.settings.emerging_limit);
        candidates
    }

    /// Most frequent tokens over the leading ranked rows.
    pub fn frequent_subset(&self, rows: &[AggregateRow], ranked: &[RankedRow], limit: usize) -> Vec<TermCount> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for r in ranked.iter().take(self.settings.frequent_head) {
            for token in self.tokenizer.tokens(&rows[r.row].searchable_text()) {
                if is_topic_token(&token) {
                    *counts.entry(token).or_insert(0) += 1;
                }
            }
        }
        let mut terms: Vec<TermCount> = counts
            .into_iter()
            .map(|(token, occurrences)| TermCount { token, occurrences })
            .collect();
        terms.sort_by(|a, b| {
            b.occurrences
                .cmp(&a.occurrences)
                .then_with(|| a.token.cmp(&b.token))
        });
        terms.truncate(limit);
        terms
    }

    /// Frequent subset terms the user has not already asked for.
    pub fn suggested_keywords(
        &self,
        rows: &[AggregateRow],
        ranked: &[RankedRow],
        focus: &HashSet<String>,
    ) -> Vec<String> {
        let wide = self.settings.suggested_keywords_limit + focus.len();
        self.frequent_subset(rows, ranked, wide)
            .into_iter()
            .map(|t| t.token)
            .filter(|t| !focus.contains(t))
            .take(self.settings.suggested_keywords_limit)
            .collect()
    }

    /// Title from the active filters, description from leading sentences
    /// of the top ranked rows.
    pub fn generated_block(
        &self,
        rows: &[AggregateRow],
        ranked: &[RankedRow],
        filter: &QueryFilter,
    ) -> GeneratedBlock {
        let mut sentences = Vec::new();
        let mut words = 0;
        'rows: for r in ranked.iter().take(self.settings.description_source_rows) {
            let Some(desc) = rows[r.row].description.as_deref() else {
                continue;
            };
            for sentence in split_sentences(desc) {
                let len = sentence.chars().count();
                if !(40..400).contains(&len) {
                    continue;
                }
                let count = sentence.split_whitespace().count();
                if words + count > self.settings.description_max_words {
                    break 'rows;
                }
                words += count;
                sentences.push(sentence);
            }
        }

        GeneratedBlock {
            title: block_title(filter),
            description: sentences.join(" "),
            meta: GeneratedMeta {
                mode: "heuristic".to_string(),
                fallback_chain: Vec::new(),
                final_source: "heuristic".to_string(),
                llm_used: false,
                tokens_sampled: words,
            },
        }
    }

    /// Identifiers of the best `highlight_count` rows of a page.
    pub fn highlighted(&self, rows: &[AggregateRow], page: &[RankedRow]) -> Vec<String> {
        let mut best: Vec<&RankedRow> = page.iter().collect();
        best.sort_by(|a, b| b.score.total_cmp(&a.score));
        best.into_iter()
            .take(self.settings.highlight_count)
            .map(|r| rows[r.row].identifier.clone())
            .collect()
    }

    fn distinctive_tokens(&self, text: &str) -> Vec<String> {
        self.tokenizer
            .unique_tokens(text)
            .into_iter()
            .filter(|t| is_topic_token(t))
            .collect()
    }
}

/// Longer than three characters and not purely numeric.
fn is_topic_token(token: &str) -> bool {
    token.chars().count() > 3 && !token.chars().all(|c| c.is_ascii_digit())
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Cut at a word boundary at or before `max_chars`, marking the cut.
pub fn truncate_words(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out = String::new();
    for word in text.split_whitespace() {
        let sep = usize::from(!out.is_empty());
        let extra = sep + word.chars().count();
        if out.chars().count() + extra > max_chars.saturating_sub(3) {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    if out.is_empty() {
        out = text.chars().take(max_chars.saturating_sub(3)).collect();
    }
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    fn row(id: &str, title: Option<&str>, desc: &str) -> AggregateRow {
        AggregateRow {
            identifier: id.to_string(),
            organism_label: "Plant".to_string(),
            project_label: "Ground".to_string(),
            kind: SourceKind::Study,
            title: title.map(|s| s.to_string()),
            description: Some(desc.to_string()),
            abstract_text: None,
            conclusions: None,
            release_date: None,
            citation_count: None,
            doi: None,
            url: None,
        }
    }

    fn ranked(n: usize) -> Vec<RankedRow> {
        (0..n)
            .map(|row| RankedRow {
                row,
                score: 1.0 - row as f64 * 0.1,
                coverage: 1.0,
                breakdown: crate::rank::ScoreBreakdown {
                    text: 1.0,
                    recency: 0.5,
                    citations: 0.0,
                    completeness: 0.5,
                },
            })
            .collect()
    }

    fn focus(words: &[&str]) -> HashSet<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_generic_title_detection() {
        let tok = Tokenizer::default();
        let settings = GenerateSettings::default();
        let gen = Generator::new(&tok, &settings);
        assert!(gen.is_generic_title(None));
        assert!(gen.is_generic_title(Some("Study")));
        assert!(gen.is_generic_title(Some("Dataset 12")));
        assert!(gen.is_generic_title(Some("Untitled untitled untitled")));
        assert!(!gen.is_generic_title(Some("Arabidopsis root growth under altitude")));
    }

    #[test]
    fn test_alt_title_from_description() {
        let tok = Tokenizer::default();
        let settings = GenerateSettings::default();
        let gen = Generator::new(&tok, &settings);
        let r = row("OSD-1", Some("Study"), "Microgravity effects on murine bone density in orbit.");
        assert_eq!(
            gen.alt_title(&r).as_deref(),
            Some("Microgravity effects murine bone density orbit")
        );
        let good = row("OSD-2", Some("Arabidopsis root growth under altitude"), "x");
        assert_eq!(gen.alt_title(&good), good.title);
    }

    #[test]
    fn test_compact_summary_prefers_overlap() {
        let tok = Tokenizer::default();
        let settings = GenerateSettings::default();
        let gen = Generator::new(&tok, &settings);
        let r = row(
            "OSD-1",
            Some("t"),
            "Plants were grown in chambers. Root elongation slowed at altitude. Leaves were fine.",
        );
        assert_eq!(
            gen.compact_summary(&r, &focus(&["root"])).as_deref(),
            Some("Root elongation slowed at altitude.")
        );
        let lead = gen.compact_summary(&r, &HashSet::new()).unwrap();
        assert!(lead.starts_with("Plants were grown"));
    }

    #[test]
    fn test_summary_truncates_long_text() {
        let tok = Tokenizer::default();
        let settings = GenerateSettings {
            summary_max_chars: 30,
            ..Default::default()
        };
        let gen = Generator::new(&tok, &settings);
        let r = row("OSD-1", None, "alpha beta gamma delta epsilon zeta eta theta iota kappa");
        let summary = gen.compact_summary(&r, &HashSet::new()).unwrap();
        assert!(summary.chars().count() <= 30);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn test_emerging_terms_prefer_locally_frequent_rare_tokens() {
        let rows = vec![
            row("A", Some("a"), "tardigrade desiccation common"),
            row("B", Some("b"), "tardigrade survival common"),
            row("C", Some("c"), "plant common"),
            row("D", Some("d"), "plant common"),
        ];
        let tok = Tokenizer::default();
        let index = TokenIndex::build(&rows, &tok);
        let settings = GenerateSettings::default();
        let gen = Generator::new(&tok, &settings);
        let topics = gen.emerging_terms(&rows, &ranked(2), &index);
        assert_eq!(topics[0].topic, "tardigrade");
        assert_eq!(topics[0].subset_occurrences, 2);
        assert_eq!(topics[0].global_occurrences, 2);
        let ids: Vec<&str> = topics[0].sample_studies.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert!(topics.iter().all(|t| t.topic != "plant"));
    }

    #[test]
    fn test_frequent_subset_and_suggestions() {
        let rows = vec![
            row("A", Some("Bone loss"), "bone density bone"),
            row("B", Some("Bone marrow"), "marrow cells"),
        ];
        let tok = Tokenizer::default();
        let settings = GenerateSettings::default();
        let gen = Generator::new(&tok, &settings);
        let freq = gen.frequent_subset(&rows, &ranked(2), 2);
        assert_eq!(freq[0], TermCount { token: "bone".to_string(), occurrences: 4 });
        assert_eq!(freq[1].token, "marrow");
        let suggested = gen.suggested_keywords(&rows, &ranked(2), &focus(&["bone"]));
        assert!(!suggested.contains(&"bone".to_string()));
        assert_eq!(suggested[0], "marrow");
    }

    #[test]
    fn test_generated_block_is_deterministic() {
        let rows = vec![row(
            "A",
            Some("Root growth"),
            "Arabidopsis seedlings were cultivated for fourteen days at high altitude. Short.",
        )];
        let tok = Tokenizer::default();
        let settings = GenerateSettings::default();
        let gen = Generator::new(&tok, &settings);
        let filter = QueryFilter {
            organism: vec!["Plant".to_string()],
            project_type: vec!["High Altitude".to_string()],
            ..Default::default()
        };
        let a = gen.generated_block(&rows, &ranked(1), &filter);
        let b = gen.generated_block(&rows, &ranked(1), &filter);
        assert_eq!(a, b);
        assert_eq!(a.title, "Plant - High Altitude");
        assert_eq!(
            a.description,
            "Arabidopsis seedlings were cultivated for fourteen days at high altitude."
        );
        assert_eq!(a.meta.mode, "heuristic");
        assert!(!a.meta.llm_used);
    }

    #[test]
    fn test_top_keywords_put_focus_first() {
        let tok = Tokenizer::default();
        let settings = GenerateSettings::default();
        let gen = Generator::new(&tok, &settings);
        let r = row("A", Some("Spaceflight effects on bone"), "density markers");
        assert_eq!(
            gen.top_keywords(&r, &focus(&["bone"])),
            vec!["bone", "spaceflight", "effects", "density", "markers"]
        );
    }

    #[test]
    fn test_highlighted_takes_top_of_page() {
        let rows = vec![row("A", None, "x"), row("B", None, "y"), row("C", None, "z"), row("D", None, "w")];
        let tok = Tokenizer::default();
        let settings = GenerateSettings::default();
        let gen = Generator::new(&tok, &settings);
        assert_eq!(gen.highlighted(&rows, &ranked(4)), vec!["A", "B", "C"]);
    }
}

//! Heuristic relevance ranking.
//!
//! # Scoring
//!
//! Each matched row gets four components in `[0, 1]`, combined as a weighted
//! average (weights are divided by their sum, so any non-negative weights
//! keep the score in `[0, 1]`):
//!
//! - **text**: strength of the stage that matched it. Each stage owns a
//!   band so that `full` (1.0) > `partial` > `phrase` > `fuzzy` at any
//!   coverage: `partial` runs from `phrase_strength` up to `partial_base`
//!   with coverage, `phrase` is fixed, and `fuzzy` is scaled by coverage and
//!   capped just under `phrase_strength`. `filter_only` is neutral.
//! - **recency**: min-max of release dates over the dated rows of the set.
//!   Undated rows, or a set whose dates span zero days, get 0.5.
//! - **citations**: `c / (c + half_saturation)`; absent counts are 0.
//! - **completeness**: title length against 120 chars and description
//!   length against 800, averaged.
//!
//! Rows are ordered by score (desc), then identifier, organism and project.

use serde::{Deserialize, Serialize};

use crate::models::{AggregateRow, RowId};
use crate::search::{MatchStage, SearchResult};

/// Weights and thresholds, the `[ranking]` config section.
#[derive(Debug, Clone, Deserialize)]
pub struct RankSettings {
    #[serde(default = "default_text_weight")]
    pub text_weight: f64,
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,
    #[serde(default = "default_citation_weight")]
    pub citation_weight: f64,
    #[serde(default = "default_completeness_weight")]
    pub completeness_weight: f64,
    /// Citation count at which the citation component reaches 0.5.
    #[serde(default = "default_half_saturation")]
    pub citation_half_saturation: f64,
    #[serde(default = "default_partial_base")]
    pub partial_base: f64,
    #[serde(default = "default_phrase_strength")]
    pub phrase_strength: f64,
    #[serde(default = "default_fuzzy_strength")]
    pub fuzzy_strength: f64,
    #[serde(default = "default_filter_only_strength")]
    pub filter_only_strength: f64,
    #[serde(default)]
    pub important_min_score: f64,
    /// Rows scoring at least this share of the best score are important.
    #[serde(default = "default_important_relative")]
    pub important_relative: f64,
}

fn default_text_weight() -> f64 {
    0.45
}
fn default_recency_weight() -> f64 {
    0.15
}
fn default_citation_weight() -> f64 {
    0.20
}
fn default_completeness_weight() -> f64 {
    0.20
}
fn default_half_saturation() -> f64 {
    10.0
}
fn default_partial_base() -> f64 {
    0.8
}
fn default_phrase_strength() -> f64 {
    0.6
}
fn default_fuzzy_strength() -> f64 {
    0.4
}
fn default_filter_only_strength() -> f64 {
    0.5
}
fn default_important_relative() -> f64 {
    0.8
}

impl Default for RankSettings {
    fn default() -> Self {
        Self {
            text_weight: default_text_weight(),
            recency_weight: default_recency_weight(),
            citation_weight: default_citation_weight(),
            completeness_weight: default_completeness_weight(),
            citation_half_saturation: default_half_saturation(),
            partial_base: default_partial_base(),
            phrase_strength: default_phrase_strength(),
            fuzzy_strength: default_fuzzy_strength(),
            filter_only_strength: default_filter_only_strength(),
            important_min_score: 0.0,
            important_relative: default_important_relative(),
        }
    }
}

/// Per-component values behind a score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub text: f64,
    pub recency: f64,
    pub citations: f64,
    pub completeness: f64,
}

/// A row as seen by one query. Never stored in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRow {
    pub row: RowId,
    pub score: f64,
    pub coverage: f64,
    pub breakdown: ScoreBreakdown,
}

/// Score and order every match of `result`.
pub fn rank(rows: &[AggregateRow], result: &SearchResult, settings: &RankSettings) -> Vec<RankedRow> {
    let dated: Vec<i64> = result
        .matches
        .iter()
        .filter_map(|m| rows[m.row].release_date.map(|d| d.timestamp()))
        .collect();
    let oldest = dated.iter().copied().min();
    let newest = dated.iter().copied().max();

    let weight_sum = settings.text_weight.max(0.0)
        + settings.recency_weight.max(0.0)
        + settings.citation_weight.max(0.0)
        + settings.completeness_weight.max(0.0);

    let mut ranked: Vec<RankedRow> = result
        .matches
        .iter()
        .map(|m| {
            let row = &rows[m.row];
            let breakdown = ScoreBreakdown {
                text: text_strength(result.stage, m.coverage, settings),
                recency: recency(row, oldest, newest),
                citations: citation_strength(row.citation_count, settings.citation_half_saturation),
                completeness: completeness(row),
            };
            let score = if weight_sum > 0.0 {
                (settings.text_weight.max(0.0) * breakdown.text
                    + settings.recency_weight.max(0.0) * breakdown.recency
                    + settings.citation_weight.max(0.0) * breakdown.citations
                    + settings.completeness_weight.max(0.0) * breakdown.completeness)
                    / weight_sum
            } else {
                0.0
            };
            RankedRow {
                row: m.row,
                score: score.clamp(0.0, 1.0),
                coverage: m.coverage,
                breakdown,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        let (ra, rb) = (&rows[a.row], &rows[b.row]);
        b.score
            .total_cmp(&a.score)
            .then_with(|| ra.identifier.cmp(&rb.identifier))
            .then_with(|| ra.organism_label.cmp(&rb.organism_label))
            .then_with(|| ra.project_label.cmp(&rb.project_label))
    });
    ranked
}

/// Number of leading rows of a ranked list that count as important.
pub fn important_cutoff(ranked: &[RankedRow], settings: &RankSettings) -> usize {
    let Some(best) = ranked.first().map(|r| r.score) else {
        return 0;
    };
    let threshold = settings
        .important_min_score
        .max(settings.important_relative * best);
    ranked.iter().take_while(|r| r.score >= threshold).count()
}

/// Gap kept between adjacent stage bands.
const STAGE_GAP: f64 = 0.01;

pub fn text_strength(stage: MatchStage, coverage: f64, settings: &RankSettings) -> f64 {
    let coverage = coverage.clamp(0.0, 1.0);
    let phrase = settings.phrase_strength.clamp(2.0 * STAGE_GAP, 1.0 - 2.0 * STAGE_GAP);
    let strength = match stage {
        MatchStage::Full => 1.0,
        MatchStage::Partial => {
            let floor = phrase + STAGE_GAP;
            let ceiling = settings.partial_base.clamp(floor, 1.0 - STAGE_GAP);
            floor + (ceiling - floor) * coverage
        }
        MatchStage::Phrase => phrase,
        MatchStage::Fuzzy => (settings.fuzzy_strength * coverage).min(phrase - STAGE_GAP),
        MatchStage::FilterOnly => settings.filter_only_strength,
        MatchStage::NoMatch => 0.0,
    };
    strength.clamp(0.0, 1.0)
}

fn recency(row: &AggregateRow, oldest: Option<i64>, newest: Option<i64>) -> f64 {
    match (row.release_date, oldest, newest) {
        (Some(date), Some(lo), Some(hi)) if hi > lo => {
            (date.timestamp() - lo) as f64 / (hi - lo) as f64
        }
        _ => 0.5,
    }
}

pub fn citation_strength(count: Option<u64>, half_saturation: f64) -> f64 {
    match count {
        Some(c) if c > 0 => {
            let c = c as f64;
            c / (c + half_saturation.max(f64::EPSILON))
        }
        _ => 0.0,
    }
}

fn completeness(row: &AggregateRow) -> f64 {
    let title = row.title.as_deref().map(|t| t.chars().count()).unwrap_or(0) as f64;
    let desc = row
        .description
        .as_deref()
        .map(|d| d.chars().count())
        .unwrap_or(0) as f64;
    0.5 * (title / 120.0).min(1.0) + 0.5 * (desc / 800.0).min(1.0)
}

//! Response shapes returned by the catalog facade.
//!
//! These serialize verbatim to the HTTP and CLI `--json` outputs, so field
//! names here are the public contract.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::consolidate::StoredRecord;
use crate::generate::{EmergingTopic, GeneratedBlock, RowGenerated, TermCount};
use crate::models::{is_missing_value, is_present, AggregateRow, SourceKind};
use crate::normalize::NormalizationStats;
use crate::rank::{RankedRow, ScoreBreakdown};
use crate::search::{FilterStats, MatchStage, QueryFilter};
use crate::spell::SpellCheckReport;

/// The filter as received, plus a reproducible query string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiltersEcho {
    pub organism: Vec<String>,
    pub project_type: Vec<String>,
    pub keywords: Vec<String>,
    pub q: Option<String>,
    pub page: i64,
    pub page_size: i64,
    pub compact: bool,
    pub query_params: String,
}

impl From<&QueryFilter> for FiltersEcho {
    fn from(filter: &QueryFilter) -> Self {
        Self {
            organism: filter.organism.clone(),
            project_type: filter.project_type.clone(),
            keywords: filter.keywords.clone(),
            q: filter.has_text_query().then(|| filter.q.trim().to_string()),
            page: filter.page,
            page_size: filter.page_size,
            compact: filter.compact,
            query_params: filter.query_params(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub total_studies: usize,
    pub important: usize,
    pub less_relevant: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    /// Requested page clamped to the last available page.
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

impl Pagination {
    pub fn new(requested_page: usize, page_size: usize, total_items: usize) -> Self {
        let page_size = page_size.max(1);
        let total_pages = total_items.div_ceil(page_size).max(1);
        Self {
            page: requested_page.clamp(1, total_pages),
            page_size,
            total_pages,
            total_items,
        }
    }

    /// Index range of the current page within the ranked list.
    pub fn range(&self) -> std::ops::Range<usize> {
        let start = ((self.page - 1) * self.page_size).min(self.total_items);
        let end = (start + self.page_size).min(self.total_items);
        start..end
    }
}

/// One ranked study as listed in a response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleItem {
    pub id: String,
    pub kind: SourceKind,
    pub title: Option<String>,
    pub alt_title: Option<String>,
    pub compact_summary: Option<String>,
    pub rank_score: f64,
    pub organism: String,
    pub project_type: String,
    pub release_date: Option<String>,
    pub citation_count: Option<u64>,
    pub url: Option<String>,
    pub top_keywords: Vec<String>,
}

impl ArticleItem {
    pub fn new(row: &AggregateRow, ranked: &RankedRow, generated: RowGenerated) -> Self {
        Self {
            id: row.identifier.clone(),
            kind: row.kind,
            title: row.title.clone(),
            alt_title: generated.alt_title,
            compact_summary: generated.compact_summary,
            rank_score: round4(ranked.score),
            organism: row.organism_label.clone(),
            project_type: row.project_label.clone(),
            release_date: row.release_date_iso(),
            citation_count: row.citation_count,
            url: row.url.clone(),
            top_keywords: generated.top_keywords,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Articles {
    pub important: Vec<ArticleItem>,
    pub less_relevant: Vec<ArticleItem>,
    pub page_items: Vec<ArticleItem>,
    /// Identifiers of the best rows on the current page.
    pub highlighted: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Topics {
    pub emerging: Vec<EmergingTopic>,
    pub frequent_subset: Vec<TermCount>,
    pub by_topic_index: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingPreview {
    pub id: String,
    pub score: f64,
    pub components: ScoreBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugBlock {
    pub stage: MatchStage,
    pub cache_hit: bool,
    pub query_terms: Vec<String>,
    pub filter_stats: FilterStats,
    pub ranking_preview: Vec<RankingPreview>,
    pub snapshot_version: u64,
    pub elapsed_ms: f64,
}

/// A row with its score, as exported in `data.studies_full`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyRecord {
    #[serde(flatten)]
    pub row: AggregateRow,
    pub rank_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataBlock {
    pub studies_full: Vec<StudyRecord>,
    pub total_full: usize,
    pub suggested_keywords: Vec<String>,
}

/// Full answer to a catalog query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub filters: FiltersEcho,
    pub generated: GeneratedBlock,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spell_check: Option<SpellCheckReport>,
    pub counts: Counts,
    pub pagination: Pagination,
    pub articles: Articles,
    pub topics: Topics,
    pub debug: DebugBlock,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<DataBlock>,
    pub exported_at: String,
}

/// A row enriched with everything its richest raw record adds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyDetail {
    pub identifier: String,
    pub organism_label: String,
    pub project_label: String,
    pub kind: SourceKind,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub conclusions: Option<String>,
    pub release_date: Option<String>,
    pub citation_count: Option<u64>,
    pub doi: Option<String>,
    pub url: Option<String>,
    pub figure_refs: Vec<String>,
    /// Origins of every raw record sharing this row's key.
    pub sources: Vec<String>,
    /// Source fields without a dedicated slot.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl StudyDetail {
    /// Fill gaps in `row` from `richest`; populated row fields always win.
    pub fn merge(row: &AggregateRow, richest: Option<&StoredRecord>, contributors: &[&StoredRecord]) -> Self {
        let fill = |current: &Option<String>, raw: Option<&str>| -> Option<String> {
            if is_present(current.as_deref()) {
                current.clone()
            } else {
                raw.filter(|v| is_present(Some(*v))).map(|v| v.trim().to_string())
            }
        };

        let mut detail = Self {
            identifier: row.identifier.clone(),
            organism_label: row.organism_label.clone(),
            project_label: row.project_label.clone(),
            kind: row.kind,
            title: row.title.clone(),
            description: row.description.clone(),
            abstract_text: row.abstract_text.clone(),
            conclusions: row.conclusions.clone(),
            release_date: row.release_date_iso(),
            citation_count: row.citation_count,
            doi: row.doi.clone(),
            url: row.url.clone(),
            figure_refs: Vec::new(),
            sources: contributors.iter().map(|c| c.record.origin.clone()).collect(),
            extra: BTreeMap::new(),
        };

        let Some(raw) = richest else {
            return detail;
        };
        detail.title = fill(&detail.title, raw.record.title.as_deref());
        detail.description = fill(&detail.description, raw.fields.description.as_deref());
        detail.abstract_text = fill(&detail.abstract_text, raw.record.abstract_text.as_deref());
        detail.conclusions = fill(&detail.conclusions, raw.record.conclusions.as_deref());
        detail.doi = fill(&detail.doi, raw.record.ids.doi.as_deref());
        detail.url = fill(&detail.url, raw.fields.url.as_deref());
        if detail.release_date.is_none() {
            detail.release_date = raw
                .fields
                .release_date
                .map(|d| d.format("%Y-%m-%dT%H:%M:%SZ").to_string());
        }
        if detail.citation_count.is_none() {
            detail.citation_count = raw.record.citation_count;
        }
        detail.figure_refs = raw.record.figure_refs.clone();
        for (key, value) in &raw.record.extra {
            if !is_missing_value(value) {
                detail.extra.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        detail
    }
}

/// Returned by a successful reload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReloadSummary {
    pub record_count: usize,
    pub row_count: usize,
    pub column_count: usize,
    pub snapshot_version: u64,
    pub fingerprint: String,
    pub elapsed_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetsResponse {
    pub organism: BTreeMap<String, usize>,
    pub project_type: BTreeMap<String, usize>,
    pub snapshot_version: u64,
}

/// Whether a reload is running. Queries are served in both states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogState {
    Ready,
    Rebuilding,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogStatus {
    pub status: &'static str,
    pub state: CatalogState,
    pub version: &'static str,
    pub snapshot_version: u64,
    pub fingerprint: String,
    pub built_at: DateTime<Utc>,
    pub records: usize,
    pub rows: usize,
    pub columns: usize,
    pub organisms: Vec<String>,
    pub projects: Vec<String>,
    pub warnings: NormalizationStats,
    pub skipped_inputs: usize,
}

pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

//! Inverted token index and facet counts.
//!
//! Both are pure functions of an [`AggregateRow`] slice: build them from the
//! same rows and you get the same index. Neither is ever mutated after
//! construction; a reload builds new ones.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use crate::models::{AggregateRow, RowId};
use crate::tokenize::{normalize_text, Tokenizer};

/// Token → rows containing it, plus each row's own token set and
/// normalized title/description for substring matching.
#[derive(Debug, Clone, Default)]
pub struct TokenIndex {
    postings: BTreeMap<String, BTreeSet<RowId>>,
    row_tokens: Vec<BTreeSet<String>>,
    row_text: Vec<RowText>,
}

#[derive(Debug, Clone, Default)]
pub struct RowText {
    pub title: String,
    pub description: String,
}

impl TokenIndex {
    pub fn build(rows: &[AggregateRow], tokenizer: &Tokenizer) -> Self {
        let mut postings: BTreeMap<String, BTreeSet<RowId>> = BTreeMap::new();
        let mut row_tokens = Vec::with_capacity(rows.len());
        let mut row_text = Vec::with_capacity(rows.len());

        for (row_id, row) in rows.iter().enumerate() {
            let tokens = tokenizer.token_set(&row.searchable_text());
            for token in &tokens {
                postings.entry(token.clone()).or_default().insert(row_id);
            }
            row_tokens.push(tokens);
            row_text.push(RowText {
                title: row.title.as_deref().map(normalize_text).unwrap_or_default(),
                description: row
                    .description
                    .as_deref()
                    .map(normalize_text)
                    .unwrap_or_default(),
            });
        }

        Self {
            postings,
            row_tokens,
            row_text,
        }
    }

    pub fn postings(&self, token: &str) -> Option<&BTreeSet<RowId>> {
        self.postings.get(token)
    }

    /// Number of rows containing `token`.
    pub fn doc_freq(&self, token: &str) -> usize {
        self.postings.get(token).map(|p| p.len()).unwrap_or(0)
    }

    pub fn row_tokens(&self, row: RowId) -> Option<&BTreeSet<String>> {
        self.row_tokens.get(row)
    }

    pub fn row_text(&self, row: RowId) -> Option<&RowText> {
        self.row_text.get(row)
    }

    pub fn contains(&self, row: RowId, token: &str) -> bool {
        self.row_tokens
            .get(row)
            .map(|t| t.contains(token))
            .unwrap_or(false)
    }

    /// Every indexed token with its document frequency, in token order.
    pub fn vocabulary(&self) -> impl Iterator<Item = (&str, usize)> {
        self.postings.iter().map(|(t, rows)| (t.as_str(), rows.len()))
    }

    pub fn token_count(&self) -> usize {
        self.postings.len()
    }

    pub fn row_count(&self) -> usize {
        self.row_tokens.len()
    }
}

/// Distinct identifiers per organism and per project label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FacetIndex {
    pub organism: BTreeMap<String, usize>,
    pub project_type: BTreeMap<String, usize>,
}

impl FacetIndex {
    pub fn build(rows: &[AggregateRow]) -> Self {
        let mut organism_ids: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
        let mut project_ids: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
        for row in rows {
            organism_ids
                .entry(row.organism_label.as_str())
                .or_default()
                .insert(row.identifier.as_str());
            project_ids
                .entry(row.project_label.as_str())
                .or_default()
                .insert(row.identifier.as_str());
        }
        Self {
            organism: organism_ids
                .into_iter()
                .map(|(label, ids)| (label.to_string(), ids.len()))
                .collect(),
            project_type: project_ids
                .into_iter()
                .map(|(label, ids)| (label.to_string(), ids.len()))
                .collect(),
        }
    }

    pub fn organism_count(&self, label: &str) -> usize {
        self.organism.get(label).copied().unwrap_or(0)
    }

    pub fn project_count(&self, label: &str) -> usize {
        self.project_type.get(label).copied().unwrap_or(0)
    }
}

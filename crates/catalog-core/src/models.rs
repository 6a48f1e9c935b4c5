//! Core data models used throughout Study Catalog.
//!
//! Raw records flow in from sources, are normalized and deduplicated into a
//! [`RawStore`](crate::consolidate::RawStore), and are projected into one
//! [`AggregateRow`] per [`CanonicalKey`]. Everything here is immutable once a
//! snapshot is built; per-query values (scores, generated text) live in
//! [`RankedRow`](crate::rank::RankedRow) and the response payload instead.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of record shapes the catalog understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A study hit from a per-category study file.
    Study,
    /// A literature article from the flat article file.
    Article,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Study => "study",
            SourceKind::Article => "article",
        }
    }
}

/// Raw date value as found in a source, before any interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDate {
    Epoch(f64),
    Text(String),
}

/// Every identifier-like value a source row may carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentifierCandidates {
    /// `Study Identifier` for studies, PMC id for articles.
    pub primary: Option<String>,
    /// Accession-like code (`Accession`, or PMID for articles).
    pub accession: Option<String>,
    /// Authoritative source URL; the identifier can be derived from its path.
    pub source_url: Option<String>,
    pub pmc: Option<String>,
    pub pmid: Option<String>,
    pub doi: Option<String>,
}

impl IdentifierCandidates {
    /// External id used to deduplicate articles: PMC id, then PMID.
    pub fn external_id(&self) -> Option<&str> {
        first_present(&[self.pmc.as_deref(), self.pmid.as_deref()])
    }
}

/// One ingested source row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub kind: SourceKind,
    pub ids: IdentifierCandidates,
    pub title: Option<String>,
    pub description: Option<String>,
    pub abstract_text: Option<String>,
    pub conclusions: Option<String>,
    /// Organism label as found (directory name, field value, ...).
    pub organism: Option<String>,
    /// Project label as found (file stem).
    pub project: Option<String>,
    /// Explicit project type field, preferred over `project` when present.
    pub project_type: Option<String>,
    pub date: Option<RawDate>,
    pub citation_count: Option<u64>,
    #[serde(default)]
    pub figure_refs: Vec<String>,
    pub url: Option<String>,
    /// Label of the file or source this record came from.
    pub origin: String,
    /// Source fields without a dedicated slot, kept for detail views.
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RawRecord {
    /// Create an empty record of the given kind; sources fill in the rest.
    pub fn new(kind: SourceKind, origin: impl Into<String>) -> Self {
        Self {
            kind,
            ids: IdentifierCandidates::default(),
            title: None,
            description: None,
            abstract_text: None,
            conclusions: None,
            organism: None,
            project: None,
            project_type: None,
            date: None,
            citation_count: None,
            figure_refs: Vec::new(),
            url: None,
            origin: origin.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Number of populated fields, the measure of "richness" used for
    /// deduplication and representative selection.
    pub fn non_empty_fields(&self) -> usize {
        let texts = [
            &self.ids.primary,
            &self.ids.accession,
            &self.ids.source_url,
            &self.ids.pmc,
            &self.ids.pmid,
            &self.ids.doi,
            &self.title,
            &self.description,
            &self.abstract_text,
            &self.conclusions,
            &self.organism,
            &self.project,
            &self.project_type,
            &self.url,
        ];
        let mut count = texts.iter().filter(|v| is_present(v.as_deref())).count();
        if self.date.is_some() {
            count += 1;
        }
        if self.citation_count.is_some() {
            count += 1;
        }
        if !self.figure_refs.is_empty() {
            count += 1;
        }
        count + self.extra.values().filter(|v| !is_missing_value(v)).count()
    }

    /// Names of all populated fields, used for the reload column count.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let slots: [(&str, Option<&str>); 14] = [
            ("identifier", self.ids.primary.as_deref()),
            ("accession", self.ids.accession.as_deref()),
            ("source_url", self.ids.source_url.as_deref()),
            ("pmc", self.ids.pmc.as_deref()),
            ("pmid", self.ids.pmid.as_deref()),
            ("doi", self.ids.doi.as_deref()),
            ("title", self.title.as_deref()),
            ("description", self.description.as_deref()),
            ("abstract", self.abstract_text.as_deref()),
            ("conclusions", self.conclusions.as_deref()),
            ("organism", self.organism.as_deref()),
            ("project", self.project.as_deref()),
            ("project_type", self.project_type.as_deref()),
            ("url", self.url.as_deref()),
        ];
        for (name, value) in slots {
            if is_present(value) {
                names.push(name.to_string());
            }
        }
        if self.date.is_some() {
            names.push("date".to_string());
        }
        if self.citation_count.is_some() {
            names.push("citation_count".to_string());
        }
        if !self.figure_refs.is_empty() {
            names.push("figure_refs".to_string());
        }
        for (key, value) in &self.extra {
            if !is_missing_value(value) {
                names.push(key.clone());
            }
        }
        names
    }
}

/// (identifier, organism_label, project_label): identity of one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CanonicalKey {
    pub identifier: String,
    pub organism_label: String,
    pub project_label: String,
}

/// One row of the aggregated view: what listing, filtering and indexing see.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub identifier: String,
    pub organism_label: String,
    pub project_label: String,
    pub kind: SourceKind,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub conclusions: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub citation_count: Option<u64>,
    pub doi: Option<String>,
    pub url: Option<String>,
}

impl AggregateRow {
    pub fn key(&self) -> CanonicalKey {
        CanonicalKey {
            identifier: self.identifier.clone(),
            organism_label: self.organism_label.clone(),
            project_label: self.project_label.clone(),
        }
    }

    /// Title and description joined, the text that gets indexed.
    pub fn searchable_text(&self) -> String {
        let mut text = String::new();
        if let Some(t) = &self.title {
            text.push_str(t);
        }
        if let Some(d) = &self.description {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(d);
        }
        text
    }

    /// ISO-8601 rendering of the release date, if any.
    pub fn release_date_iso(&self) -> Option<String> {
        self.release_date
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
    }
}

/// Position of a row inside a snapshot's row collection.
pub type RowId = usize;

/// Treats `None`, blank strings and textual nulls as absent.
pub fn is_present(value: Option<&str>) -> bool {
    match value {
        None => false,
        Some(s) => {
            let t = s.trim();
            !(t.is_empty() || t.eq_ignore_ascii_case("none") || t.eq_ignore_ascii_case("nan"))
        }
    }
}

/// JSON flavour of [`is_present`]; arrays and objects count as present
/// unless empty.
pub fn is_missing_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => !is_present(Some(s)),
        serde_json::Value::Array(a) => a.is_empty(),
        serde_json::Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// First populated value in a fallback chain.
pub fn first_present<'a>(chain: &[Option<&'a str>]) -> Option<&'a str> {
    chain
        .iter()
        .copied()
        .flatten()
        .find(|s| is_present(Some(*s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_fields_ignores_blank_text() {
        let mut rec = RawRecord::new(SourceKind::Study, "test");
        rec.title = Some("  ".to_string());
        rec.description = Some("None".to_string());
        assert_eq!(rec.non_empty_fields(), 0);

        rec.title = Some("Bone loss".to_string());
        rec.extra
            .insert("Mission".to_string(), serde_json::json!("SpaceX-12"));
        rec.extra.insert("Empty".to_string(), serde_json::json!([]));
        assert_eq!(rec.non_empty_fields(), 2);
    }

    #[test]
    fn test_external_id_prefers_pmc() {
        let ids = IdentifierCandidates {
            pmc: Some("PMC123".to_string()),
            pmid: Some("999".to_string()),
            ..Default::default()
        };
        assert_eq!(ids.external_id(), Some("PMC123"));

        let ids = IdentifierCandidates {
            pmid: Some("999".to_string()),
            ..Default::default()
        };
        assert_eq!(ids.external_id(), Some("999"));
    }

    #[test]
    fn test_first_present_skips_blank() {
        assert_eq!(first_present(&[None, Some(""), Some("x")]), Some("x"));
        assert_eq!(first_present(&[None, Some(" ")]), None);
    }

    #[test]
    fn test_searchable_text_joins_title_and_description() {
        let row = AggregateRow {
            identifier: "OSD-1".to_string(),
            organism_label: "Plant".to_string(),
            project_label: "Ground".to_string(),
            kind: SourceKind::Study,
            title: Some("Root growth".to_string()),
            description: Some("Arabidopsis seedlings".to_string()),
            abstract_text: None,
            conclusions: None,
            release_date: None,
            citation_count: None,
            doi: None,
            url: None,
        };
        assert_eq!(row.searchable_text(), "Root growth Arabidopsis seedlings");
    }
}

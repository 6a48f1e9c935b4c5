//! Per-record normalization.
//!
//! Turns one [`RawRecord`] into the canonical values the rest of the engine
//! keys on: identifier, organism and project display labels, release date,
//! url, and a synthesized description. Every rule here is an explicit
//! first-match-wins fallback chain; nothing fails, it only degrades and
//! reports a [`NormalizationWarning`].
//!
//! # Identifier chain
//!
//! 1. primary identifier (`Study Identifier`, PMC id)
//! 2. accession-like code (`Accession`, PMID)
//! 3. last non-empty path segment of the authoritative source URL
//!
//! # Date chain
//!
//! Numeric epoch (seconds, or milliseconds when larger than `1e11`), then the
//! textual formats in [`TEXT_DATE_FORMATS`], then RFC 3339, then a leading
//! `YYYY-MM-DD` prefix. Anything else is absent.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{first_present, is_present, RawDate, RawRecord, SourceKind};

/// Textual date formats tried in order.
pub const TEXT_DATE_FORMATS: &[&str] = &["%m/%d/%Y %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];
// Two-digit years first: `%Y` would happily read "19" as year 19.
const TEXT_DAY_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y"];

/// Numeric values below this are not treated as epochs.
const MIN_EPOCH_SECONDS: f64 = 10_000_000.0;
const MILLIS_THRESHOLD: f64 = 100_000_000_000.0;

/// Organism label used for literature articles.
pub const LITERATURE_ORGANISM: &str = "Literature";
/// Project label used for literature articles.
pub const LITERATURE_PROJECT: &str = "PMC";

const DEFAULT_ORGANISMS: &[(&str, &str)] = &[
    ("human", "Human"),
    ("human_homo_sapiens", "Human"),
    ("homo_sapiens", "Human"),
    ("rodent", "Rodent"),
    ("plant", "Plant"),
    ("microbiota", "Microbiota"),
    ("bacteria", "Bacteria"),
    ("fungus", "Fungus"),
    ("algae", "Algae"),
    ("fish", "Fish"),
    ("snail", "Snail"),
    ("squid", "Squid"),
    ("squirrel", "Squirrel"),
    ("fruit_fly", "Fruit Fly"),
    ("worm", "Worm"),
    ("cellular_organisms", "Cellular Organisms"),
    ("literature", LITERATURE_ORGANISM),
];

const DEFAULT_PROJECTS: &[(&str, &str)] = &[
    ("ground", "Ground"),
    ("ground_study", "Ground"),
    ("high_altitude", "High Altitude"),
    ("space_flight", "Spaceflight"),
    ("spaceflight_study", "Spaceflight"),
    ("pmc", LITERATURE_PROJECT),
];

/// Something the normalizer had to fall back on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationWarning {
    UnparseableDate,
    UnresolvedIdentifier,
    UnmappedOrganism,
    UnmappedProject,
}

impl NormalizationWarning {
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizationWarning::UnparseableDate => "unparseable_date",
            NormalizationWarning::UnresolvedIdentifier => "unresolved_identifier",
            NormalizationWarning::UnmappedOrganism => "unmapped_organism",
            NormalizationWarning::UnmappedProject => "unmapped_project",
        }
    }
}

/// Per-kind warning counters collected over one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizationStats {
    pub counts: BTreeMap<String, usize>,
}

impl NormalizationStats {
    pub fn record(&mut self, warning: NormalizationWarning) {
        *self.counts.entry(warning.as_str().to_string()).or_insert(0) += 1;
    }

    pub fn get(&self, warning: NormalizationWarning) -> usize {
        self.counts.get(warning.as_str()).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Alias overrides supplied by configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NormalizeSettings {
    #[serde(default)]
    pub organism_aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub project_aliases: BTreeMap<String, String>,
}

/// Case-, spacing- and punctuation-insensitive label lookup.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: HashMap<String, String>,
}

impl AliasTable {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let mut table = Self::default();
        for (alias, label) in pairs {
            table.insert(alias, label);
        }
        table
    }

    pub fn insert(&mut self, alias: &str, label: &str) {
        self.entries.insert(alias_key(alias), label.to_string());
        // A display label always maps to itself.
        self.entries
            .entry(alias_key(label))
            .or_insert_with(|| label.to_string());
    }

    pub fn lookup(&self, raw: &str) -> Option<&str> {
        self.entries.get(&alias_key(raw)).map(|s| s.as_str())
    }

    /// Mapped display label, or the title-cased input when unmapped.
    /// The flag reports whether the table knew the label.
    pub fn resolve(&self, raw: &str) -> (String, bool) {
        match self.lookup(raw) {
            Some(label) => (label.to_string(), true),
            None => (title_case(raw), false),
        }
    }
}

/// Values the normalizer derives for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFields {
    /// `None` when the identifier chain resolved nothing.
    pub identifier: Option<String>,
    pub organism_label: String,
    pub project_label: String,
    pub release_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub warnings: Vec<NormalizationWarning>,
}

/// Stateless per-record transform configured with alias tables.
#[derive(Debug, Clone)]
pub struct Normalizer {
    organisms: AliasTable,
    projects: AliasTable,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&NormalizeSettings::default())
    }
}

impl Normalizer {
    pub fn new(settings: &NormalizeSettings) -> Self {
        let mut organisms = AliasTable::new(DEFAULT_ORGANISMS);
        let mut projects = AliasTable::new(DEFAULT_PROJECTS);
        for (alias, label) in &settings.organism_aliases {
            organisms.insert(alias, label);
        }
        for (alias, label) in &settings.project_aliases {
            projects.insert(alias, label);
        }
        Self {
            organisms,
            projects,
        }
    }

    /// Display label for an organism value (used for filters as well).
    pub fn organism_label(&self, raw: &str) -> String {
        self.organisms.resolve(raw).0
    }

    /// Display label for a project value (used for filters as well).
    pub fn project_label(&self, raw: &str) -> String {
        self.projects.resolve(raw).0
    }

    pub fn normalize(&self, record: &RawRecord) -> NormalizedFields {
        let mut warnings = Vec::new();

        let identifier = resolve_identifier(record);
        if identifier.is_none() {
            warnings.push(NormalizationWarning::UnresolvedIdentifier);
        }

        let (organism_label, project_label) = match record.kind {
            SourceKind::Article => (
                LITERATURE_ORGANISM.to_string(),
                LITERATURE_PROJECT.to_string(),
            ),
            SourceKind::Study => {
                let organism = match first_present(&[record.organism.as_deref()]) {
                    Some(raw) => {
                        let (label, known) = self.organisms.resolve(raw);
                        if !known {
                            warnings.push(NormalizationWarning::UnmappedOrganism);
                        }
                        label
                    }
                    None => {
                        warnings.push(NormalizationWarning::UnmappedOrganism);
                        "Unknown".to_string()
                    }
                };
                let project_raw =
                    first_present(&[record.project_type.as_deref(), record.project.as_deref()]);
                let project = match project_raw {
                    Some(raw) => {
                        let (label, known) = self.projects.resolve(raw);
                        if !known {
                            warnings.push(NormalizationWarning::UnmappedProject);
                        }
                        label
                    }
                    None => {
                        warnings.push(NormalizationWarning::UnmappedProject);
                        "Unknown".to_string()
                    }
                };
                (organism, project)
            }
        };

        let release_date = match &record.date {
            None => None,
            Some(raw) => {
                let parsed = parse_date(raw);
                if parsed.is_none() {
                    warnings.push(NormalizationWarning::UnparseableDate);
                }
                parsed
            }
        };

        NormalizedFields {
            identifier,
            organism_label,
            project_label,
            release_date,
            description: synthesize_description(record),
            url: resolve_url(record),
            warnings,
        }
    }
}

/// Identifier chain: primary → accession → authoritative URL path.
pub fn resolve_identifier(record: &RawRecord) -> Option<String> {
    if let Some(id) = first_present(&[
        record.ids.primary.as_deref(),
        record.ids.accession.as_deref(),
    ]) {
        return Some(clean_identifier(id));
    }
    record
        .ids
        .source_url
        .as_deref()
        .and_then(identifier_from_url)
}

fn clean_identifier(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// Last non-empty path segment of a URL, query and fragment removed.
pub fn identifier_from_url(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or("");
    let path = match without_query.find("://") {
        Some(pos) => &without_query[pos + 3..],
        None => without_query,
    };
    let mut segments = path.split('/').filter(|s| !s.trim().is_empty());
    // The first segment of an absolute URL is the host.
    if without_query.contains("://") {
        segments.next();
    }
    segments.last().map(|s| s.trim().to_string())
}

/// Studies keep their description; articles join abstract and conclusions.
pub fn synthesize_description(record: &RawRecord) -> Option<String> {
    match record.kind {
        SourceKind::Study => first_present(&[
            record.description.as_deref(),
            record.abstract_text.as_deref(),
        ])
        .map(|s| s.trim().to_string()),
        SourceKind::Article => {
            let parts: Vec<&str> = [
                record.abstract_text.as_deref(),
                record.conclusions.as_deref(),
            ]
            .into_iter()
            .flatten()
            .filter(|s| is_present(Some(*s)))
            .map(|s| s.trim())
            .collect();
            if parts.is_empty() {
                first_present(&[record.description.as_deref()]).map(|s| s.trim().to_string())
            } else {
                Some(parts.join("\n\n"))
            }
        }
    }
}

fn resolve_url(record: &RawRecord) -> Option<String> {
    if let Some(url) = first_present(&[record.url.as_deref()]) {
        return Some(url.trim().to_string());
    }
    match record.kind {
        SourceKind::Article => {
            if let Some(pmc) = first_present(&[record.ids.pmc.as_deref()]) {
                Some(format!("https://www.ncbi.nlm.nih.gov/pmc/articles/{}/", pmc.trim()))
            } else {
                first_present(&[record.ids.pmid.as_deref()])
                    .map(|pmid| format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid.trim()))
            }
        }
        SourceKind::Study => {
            first_present(&[record.ids.source_url.as_deref()]).map(|s| s.trim().to_string())
        }
    }
}

/// Parse a raw date; `None` means absent, never a sentinel.
pub fn parse_date(raw: &RawDate) -> Option<DateTime<Utc>> {
    match raw {
        RawDate::Epoch(value) => epoch_to_date(*value),
        RawDate::Text(text) => parse_date_text(text),
    }
}

fn epoch_to_date(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value < MIN_EPOCH_SECONDS {
        return None;
    }
    let seconds = if value > MILLIS_THRESHOLD {
        value / 1000.0
    } else {
        value
    };
    Utc.timestamp_opt(seconds.trunc() as i64, 0).single()
}

fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(value) = s.parse::<f64>() {
        return epoch_to_date(value);
    }
    for fmt in TEXT_DAY_FORMATS {
        if let Ok(day) = NaiveDate::parse_from_str(s, fmt) {
            return day.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    for fmt in TEXT_DATE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Leading ISO day, e.g. "2021-03-04 (epub)".
    s.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Lowercased alphanumerics only: `"Fruit_fly"`, `"fruit fly"` and
/// `"FRUIT-FLY"` all share a key.
pub fn alias_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// `"high_altitude"` → `"High Altitude"`.
pub fn title_case(raw: &str) -> String {
    raw.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

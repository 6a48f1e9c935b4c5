//! Deduplication of raw records and projection into the aggregated view.
//!
//! `consolidate` runs in two passes:
//!
//! 1. **Dedup** into a [`RawStore`]. Studies collapse on
//!    (identifier, organism label, project label), articles on their external
//!    id (PMC, then PMID). The survivor is the record with strictly more
//!    populated fields; ties keep the first one seen, and a replacement takes
//!    over the loser's position so store order is input-order stable.
//! 2. **Group** store entries by [`CanonicalKey`] into one [`AggregateRow`]
//!    each. Every field comes from the richest contributor, falling back to
//!    the next contributor (richness order, then store order) when the
//!    richest leaves it empty. Duplicates that lost the dedup are not in the
//!    store but still fill fields every stored contributor leaves empty.
//!
//! Records whose identifier cannot be resolved stay in the store but never
//! produce a row.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::models::{first_present, AggregateRow, CanonicalKey, RawRecord, SourceKind};
use crate::normalize::{NormalizationStats, NormalizedFields, Normalizer};

/// A raw record plus what the normalizer derived from it.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub record: RawRecord,
    pub fields: NormalizedFields,
    /// `None` when the identifier chain resolved nothing.
    pub key: Option<CanonicalKey>,
}

impl StoredRecord {
    fn new(record: RawRecord, normalizer: &Normalizer) -> Self {
        let fields = normalizer.normalize(&record);
        let key = fields.identifier.as_ref().map(|id| CanonicalKey {
            identifier: id.clone(),
            organism_label: fields.organism_label.clone(),
            project_label: fields.project_label.clone(),
        });
        Self {
            record,
            fields,
            key,
        }
    }

    pub fn richness(&self) -> usize {
        self.record.non_empty_fields()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DedupKey {
    Study(CanonicalKey),
    Article(String),
}

fn dedup_key(entry: &StoredRecord) -> Option<DedupKey> {
    match entry.record.kind {
        SourceKind::Study => entry.key.clone().map(DedupKey::Study),
        SourceKind::Article => entry
            .record
            .ids
            .external_id()
            .map(|id| DedupKey::Article(id.trim().to_string()))
            .or_else(|| entry.key.clone().map(DedupKey::Study)),
    }
}

/// Ordered, deduplicated collection of every ingested record.
#[derive(Debug, Clone, Default)]
pub struct RawStore {
    entries: Vec<StoredRecord>,
    by_key: HashMap<CanonicalKey, Vec<usize>>,
    /// Dedup losers, keyed by the canonical key of the entry that beat them.
    dropped: HashMap<CanonicalKey, Vec<StoredRecord>>,
}

impl RawStore {
    fn from_entries(entries: Vec<StoredRecord>, mut losers: HashMap<usize, Vec<StoredRecord>>) -> Self {
        let mut by_key: HashMap<CanonicalKey, Vec<usize>> = HashMap::new();
        let mut dropped: HashMap<CanonicalKey, Vec<StoredRecord>> = HashMap::new();
        for (pos, entry) in entries.iter().enumerate() {
            if let Some(key) = &entry.key {
                by_key.entry(key.clone()).or_default().push(pos);
                if let Some(lost) = losers.remove(&pos) {
                    dropped.entry(key.clone()).or_default().extend(lost);
                }
            }
        }
        for lost in dropped.values_mut() {
            lost.sort_by(|a, b| b.richness().cmp(&a.richness()));
        }
        Self {
            entries,
            by_key,
            dropped,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[StoredRecord] {
        &self.entries
    }

    /// Entries sharing a canonical key, in store order.
    pub fn entries_for(&self, key: &CanonicalKey) -> Vec<&StoredRecord> {
        self.by_key
            .get(key)
            .map(|positions| positions.iter().map(|&p| &self.entries[p]).collect())
            .unwrap_or_default()
    }

    /// Entries for a key, richest first; equal richness keeps store order.
    pub fn contributors(&self, key: &CanonicalKey) -> Vec<&StoredRecord> {
        let mut entries = self.entries_for(key);
        entries.sort_by(|a, b| b.richness().cmp(&a.richness()));
        entries
    }

    pub fn richest(&self, key: &CanonicalKey) -> Option<&StoredRecord> {
        self.contributors(key).into_iter().next()
    }

    /// Stored contributors followed by the duplicates they replaced.
    pub fn field_sources(&self, key: &CanonicalKey) -> Vec<&StoredRecord> {
        let mut sources = self.contributors(key);
        if let Some(lost) = self.dropped.get(key) {
            sources.extend(lost.iter());
        }
        sources
    }

    /// Records whose identifier could not be resolved.
    pub fn unresolved(&self) -> usize {
        self.entries.iter().filter(|e| e.key.is_none()).count()
    }

    /// Distinct populated field names across all stored records.
    pub fn field_names(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .flat_map(|e| e.record.field_names())
            .collect()
    }
}

/// Output of [`consolidate`].
#[derive(Debug, Clone, Default)]
pub struct Consolidation {
    pub store: RawStore,
    pub rows: Vec<AggregateRow>,
    pub stats: NormalizationStats,
    /// Input records that lost to a richer duplicate.
    pub duplicates_dropped: usize,
}

pub fn consolidate(records: Vec<RawRecord>, normalizer: &Normalizer) -> Consolidation {
    let mut stats = NormalizationStats::default();
    let mut entries: Vec<StoredRecord> = Vec::with_capacity(records.len());
    let mut seen: HashMap<DedupKey, usize> = HashMap::new();
    let mut losers: HashMap<usize, Vec<StoredRecord>> = HashMap::new();
    let mut duplicates_dropped = 0;

    for record in records {
        let entry = StoredRecord::new(record, normalizer);
        for warning in &entry.fields.warnings {
            stats.record(*warning);
        }

        let Some(key) = dedup_key(&entry) else {
            entries.push(entry);
            continue;
        };

        match seen.get(&key) {
            Some(&pos) => {
                duplicates_dropped += 1;
                if entry.richness() > entries[pos].richness() {
                    debug!(
                        origin = %entry.record.origin,
                        replaced = %entries[pos].record.origin,
                        "richer duplicate replaces stored record"
                    );
                    let replaced = std::mem::replace(&mut entries[pos], entry);
                    losers.entry(pos).or_default().push(replaced);
                } else {
                    losers.entry(pos).or_default().push(entry);
                }
            }
            None => {
                seen.insert(key, entries.len());
                entries.push(entry);
            }
        }
    }

    let store = RawStore::from_entries(entries, losers);
    let rows = build_rows(&store);

    Consolidation {
        store,
        rows,
        stats,
        duplicates_dropped,
    }
}

fn build_rows(store: &RawStore) -> Vec<AggregateRow> {
    let mut emitted: BTreeSet<&CanonicalKey> = BTreeSet::new();
    let mut rows = Vec::with_capacity(store.by_key.len());

    for entry in store.entries() {
        let Some(key) = &entry.key else { continue };
        if !emitted.insert(key) {
            continue;
        }
        let contributors = store.field_sources(key);
        rows.push(aggregate(key, &contributors));
    }
    rows
}

fn aggregate(key: &CanonicalKey, contributors: &[&StoredRecord]) -> AggregateRow {
    let text = |pick: fn(&StoredRecord) -> Option<&str>| -> Option<String> {
        let chain: Vec<Option<&str>> = contributors.iter().map(|c| pick(c)).collect();
        first_present(&chain).map(|s| s.trim().to_string())
    };

    AggregateRow {
        identifier: key.identifier.clone(),
        organism_label: key.organism_label.clone(),
        project_label: key.project_label.clone(),
        kind: contributors
            .first()
            .map(|c| c.record.kind)
            .unwrap_or(SourceKind::Study),
        title: text(|c| c.record.title.as_deref()),
        description: text(|c| c.fields.description.as_deref()),
        abstract_text: text(|c| c.record.abstract_text.as_deref()),
        conclusions: text(|c| c.record.conclusions.as_deref()),
        release_date: contributors.iter().find_map(|c| c.fields.release_date),
        citation_count: contributors.iter().find_map(|c| c.record.citation_count),
        doi: text(|c| c.record.ids.doi.as_deref()),
        url: text(|c| c.fields.url.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawDate;

    fn study(id: &str, organism: &str, project: &str) -> RawRecord {
        let mut rec = RawRecord::new(SourceKind::Study, format!("{organism}/{project}.json"));
        rec.ids.primary = Some(id.to_string());
        rec.organism = Some(organism.to_string());
        rec.project = Some(project.to_string());
        rec
    }

    #[test]
    fn test_richer_duplicate_wins_in_place() {
        let poor = study("OSD-100", "plant", "ground");
        let other = study("OSD-200", "plant", "ground");
        let mut rich = study("OSD-100", "plant", "ground");
        rich.title = Some("Root growth".to_string());
        rich.description = Some("Seedlings grown on the ground".to_string());

        let out = consolidate(vec![poor, other, rich], &Normalizer::default());
        assert_eq!(out.store.len(), 2);
        assert_eq!(out.duplicates_dropped, 1);
        assert_eq!(
            out.store.entries()[0].record.title.as_deref(),
            Some("Root growth")
        );
        assert_eq!(out.rows[0].identifier, "OSD-100");
        assert_eq!(out.rows[1].identifier, "OSD-200");
    }

    #[test]
    fn test_losing_duplicate_still_fills_empty_fields() {
        let mut poor = study("OSD-100", "rodent", "ground");
        poor.title = Some("Hindlimb unloading".to_string());
        let mut rich = study("OSD-100", "rodent", "ground");
        rich.ids.accession = Some("GLDS-100".to_string());
        rich.description = Some("Mice were suspended for 30 days.".to_string());
        rich.citation_count = Some(2);

        let out = consolidate(vec![poor, rich], &Normalizer::default());
        assert_eq!(out.store.len(), 1);
        assert_eq!(out.duplicates_dropped, 1);
        let row = &out.rows[0];
        assert_eq!(row.title.as_deref(), Some("Hindlimb unloading"));
        assert_eq!(row.description.as_deref(), Some("Mice were suspended for 30 days."));
        assert_eq!(row.citation_count, Some(2));
        assert!(out.store.entries()[0].record.title.is_none());
    }

    #[test]
    fn test_equal_richness_keeps_first_seen() {
        let mut first = study("OSD-1", "plant", "ground");
        first.title = Some("First".to_string());
        let mut second = study("OSD-1", "plant", "ground");
        second.title = Some("Second".to_string());

        let out = consolidate(vec![first, second], &Normalizer::default());
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].title.as_deref(), Some("First"));
    }

    #[test]
    fn test_same_identifier_different_project_is_two_rows() {
        let out = consolidate(
            vec![
                study("OSD-9", "plant", "ground"),
                study("OSD-9", "plant", "spaceflight"),
            ],
            &Normalizer::default(),
        );
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0].project_label, "Ground");
        assert_eq!(out.rows[1].project_label, "Spaceflight");
    }

    #[test]
    fn test_articles_dedup_on_external_id() {
        let mut a = RawRecord::new(SourceKind::Article, "articles.json");
        a.ids.primary = Some("PMC1".to_string());
        a.ids.pmc = Some("PMC1".to_string());
        let mut b = a.clone();
        b.title = Some("Better".to_string());
        b.citation_count = Some(4);

        let out = consolidate(vec![a, b], &Normalizer::default());
        assert_eq!(out.store.len(), 1);
        assert_eq!(out.rows[0].title.as_deref(), Some("Better"));
        assert_eq!(out.rows[0].citation_count, Some(4));
        assert_eq!(out.rows[0].organism_label, "Literature");
    }

    #[test]
    fn test_unresolved_records_stay_in_store_only() {
        let mut orphan = RawRecord::new(SourceKind::Study, "plant/ground.json");
        orphan.title = Some("No id at all".to_string());
        let out = consolidate(
            vec![orphan, study("OSD-2", "plant", "ground")],
            &Normalizer::default(),
        );
        assert_eq!(out.store.len(), 2);
        assert_eq!(out.store.unresolved(), 1);
        assert_eq!(out.rows.len(), 1);
        assert_eq!(
            out.stats
                .get(crate::normalize::NormalizationWarning::UnresolvedIdentifier),
            1
        );
    }

    #[test]
    fn test_fields_fall_back_across_contributors() {
        // One canonical key reached through two article dedup keys.
        let mut rich = RawRecord::new(SourceKind::Article, "articles.json");
        rich.ids.primary = Some("PMC5".to_string());
        rich.ids.pmc = Some("PMC5".to_string());
        rich.title = Some("Muscle atrophy".to_string());
        rich.abstract_text = Some("Abstract.".to_string());
        let mut poor = RawRecord::new(SourceKind::Article, "legacy.json");
        poor.ids.primary = Some("PMC5".to_string());
        poor.ids.pmid = Some("555".to_string());
        poor.date = Some(RawDate::Text("2020-02-02".to_string()));

        let out = consolidate(vec![rich, poor], &Normalizer::default());
        assert_eq!(out.store.len(), 2);
        assert_eq!(out.rows.len(), 1);
        let row = &out.rows[0];
        assert_eq!(row.title.as_deref(), Some("Muscle atrophy"));
        assert_eq!(
            row.release_date_iso().as_deref(),
            Some("2020-02-02T00:00:00Z")
        );
    }

    #[test]
    fn test_field_names_are_distinct() {
        let mut a = study("OSD-1", "plant", "ground");
        a.extra
            .insert("Mission".to_string(), serde_json::json!("ISS"));
        let b = study("OSD-2", "plant", "ground");
        let out = consolidate(vec![a, b], &Normalizer::default());
        let names = out.store.field_names();
        assert!(names.contains("identifier"));
        assert!(names.contains("Mission"));
        assert_eq!(names.iter().filter(|n| *n == "organism").count(), 1);
    }
}

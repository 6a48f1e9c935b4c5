//! The immutable bundle every query reads.
//!
//! A [`Snapshot`] owns the raw store, the aggregated rows and everything
//! derived from them. It is built in one go by [`Snapshot::build`] and never
//! modified afterwards; a reload builds a new one and swaps the reference.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::consolidate::{consolidate, RawStore};
use crate::index::{FacetIndex, TokenIndex};
use crate::models::{AggregateRow, RawRecord, RowId};
use crate::normalize::{NormalizationStats, Normalizer};
use crate::source::{SkippedItem, SourceBatch};
use crate::spell::SpellChecker;
use crate::tokenize::Tokenizer;

/// What one source contributed to a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub name: String,
    pub records: usize,
    pub skipped: Vec<SkippedItem>,
}

/// Build-time bookkeeping kept alongside the data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadDiagnostics {
    pub sources: Vec<SourceReport>,
    pub duplicates_dropped: usize,
    pub unresolved_identifiers: usize,
    pub warnings: NormalizationStats,
}

impl LoadDiagnostics {
    pub fn skipped_total(&self) -> usize {
        self.sources.iter().map(|s| s.skipped.len()).sum()
    }
}

#[derive(Debug)]
pub struct Snapshot {
    pub version: u64,
    /// SHA-256 over the aggregated rows; equal data gives equal fingerprints.
    pub fingerprint: String,
    pub built_at: DateTime<Utc>,
    pub store: RawStore,
    pub rows: Vec<AggregateRow>,
    pub token_index: TokenIndex,
    pub facet_index: FacetIndex,
    pub spell: SpellChecker,
    pub diagnostics: LoadDiagnostics,
    by_identifier: HashMap<String, RowId>,
}

impl Snapshot {
    /// Run normalization, consolidation and indexing over source output.
    pub fn build(
        version: u64,
        batches: Vec<(String, SourceBatch)>,
        normalizer: &Normalizer,
        tokenizer: &Tokenizer,
    ) -> Self {
        let mut reports = Vec::with_capacity(batches.len());
        let mut records: Vec<RawRecord> = Vec::new();
        for (name, batch) in batches {
            for item in &batch.skipped {
                warn!(source = %name, location = %item.location, reason = %item.reason, "skipped unreadable input");
            }
            reports.push(SourceReport {
                name,
                records: batch.records.len(),
                skipped: batch.skipped,
            });
            records.extend(batch.records);
        }

        let consolidation = consolidate(records, normalizer);
        let token_index = TokenIndex::build(&consolidation.rows, tokenizer);
        let facet_index = FacetIndex::build(&consolidation.rows);
        let spell = SpellChecker::build(&token_index);

        let mut by_identifier = HashMap::new();
        for (row_id, row) in consolidation.rows.iter().enumerate() {
            by_identifier.entry(row.identifier.clone()).or_insert(row_id);
        }

        let diagnostics = LoadDiagnostics {
            sources: reports,
            duplicates_dropped: consolidation.duplicates_dropped,
            unresolved_identifiers: consolidation.store.unresolved(),
            warnings: consolidation.stats,
        };

        let snapshot = Self {
            version,
            fingerprint: fingerprint(&consolidation.rows),
            built_at: Utc::now(),
            store: consolidation.store,
            rows: consolidation.rows,
            token_index,
            facet_index,
            spell,
            diagnostics,
            by_identifier,
        };

        info!(
            version,
            records = snapshot.store.len(),
            rows = snapshot.rows.len(),
            tokens = snapshot.token_index.token_count(),
            duplicates = snapshot.diagnostics.duplicates_dropped,
            warnings = snapshot.diagnostics.warnings.total(),
            skipped = snapshot.diagnostics.skipped_total(),
            "snapshot built"
        );
        snapshot
    }

    /// First row (by row order) carrying `identifier`.
    pub fn row_by_identifier(&self, identifier: &str) -> Option<(RowId, &AggregateRow)> {
        self.by_identifier
            .get(identifier)
            .map(|&id| (id, &self.rows[id]))
    }

    pub fn record_count(&self) -> usize {
        self.store.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Distinct populated field names across the raw records.
    pub fn column_count(&self) -> usize {
        self.store.field_names().len()
    }
}

fn fingerprint(rows: &[AggregateRow]) -> String {
    let mut hasher = Sha256::new();
    for row in rows {
        for part in [
            Some(row.identifier.as_str()),
            Some(row.organism_label.as_str()),
            Some(row.project_label.as_str()),
            row.title.as_deref(),
            row.description.as_deref(),
        ] {
            hasher.update(part.unwrap_or("").as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(row.release_date_iso().unwrap_or_default().as_bytes());
        hasher.update(row.citation_count.unwrap_or(0).to_le_bytes());
        hasher.update([0xffu8]);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    fn study(id: &str, organism: &str, title: &str) -> RawRecord {
        let mut rec = RawRecord::new(SourceKind::Study, "test");
        rec.ids.primary = Some(id.to_string());
        rec.organism = Some(organism.to_string());
        rec.project = Some("ground".to_string());
        rec.title = Some(title.to_string());
        rec
    }

    fn build(records: Vec<RawRecord>) -> Snapshot {
        Snapshot::build(
            1,
            vec![("mem".to_string(), SourceBatch::new(records))],
            &Normalizer::default(),
            &Tokenizer::default(),
        )
    }

    #[test]
    fn test_indexes_match_rows() {
        let snap = build(vec![
            study("OSD-1", "plant", "Root growth"),
            study("OSD-2", "rodent", "Bone loss"),
        ]);
        assert_eq!(snap.row_count(), 2);
        assert_eq!(snap.token_index.row_count(), 2);
        assert_eq!(snap.facet_index.organism_count("Plant"), 1);
        assert_eq!(snap.row_by_identifier("OSD-2").map(|(id, _)| id), Some(1));
        assert!(snap.row_by_identifier("OSD-3").is_none());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = build(vec![study("OSD-1", "plant", "Root growth")]);
        let b = build(vec![study("OSD-1", "plant", "Root growth")]);
        let c = build(vec![study("OSD-1", "plant", "Leaf growth")]);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, c.fingerprint);
    }

    #[test]
    fn test_diagnostics_record_skipped_items() {
        let mut batch = SourceBatch::new(vec![study("OSD-1", "plant", "Root growth")]);
        batch.skipped.push(SkippedItem {
            location: "plant/broken.json".to_string(),
            reason: "expected value at line 1".to_string(),
        });
        let snap = Snapshot::build(
            3,
            vec![("studies".to_string(), batch)],
            &Normalizer::default(),
            &Tokenizer::default(),
        );
        assert_eq!(snap.version, 3);
        assert_eq!(snap.diagnostics.skipped_total(), 1);
        assert_eq!(snap.diagnostics.sources[0].records, 1);
    }
}

//! The catalog facade: snapshot ownership, reload and query orchestration.
//!
//! # Concurrency
//!
//! The published [`Snapshot`] sits behind a `parking_lot::RwLock<Arc<_>>`.
//! Readers clone the `Arc` under a read lock and then work lock-free on an
//! immutable bundle. [`Catalog::reload`] reads every source and builds the
//! replacement without holding the lock, then swaps the `Arc` under a short
//! write lock. Readers that already hold the old `Arc` finish against it.
//!
//! Only one reload runs at a time. A second caller gets
//! [`CatalogError::ReloadConflict`] instead of waiting.
//!
//! # Query cache
//!
//! Responses are memoized in an LRU keyed by [`QueryFilter::cache_key`].
//! Entries remember the snapshot version they were computed against and the
//! whole cache is cleared after every successful reload.

use std::collections::{BTreeMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{CatalogError, Result};
use crate::generate::{self, GenerateSettings, Generator};
use crate::normalize::{NormalizeSettings, Normalizer};
use crate::payload::{
    round4, ArticleItem, Articles, CatalogState, CatalogStatus, Counts, DataBlock, DebugBlock,
    FacetsResponse, FiltersEcho, Pagination, QueryResponse, RankingPreview, ReloadSummary,
    StudyDetail, StudyRecord, Topics,
};
use crate::rank::{important_cutoff, rank, RankSettings, RankedRow};
use crate::search::{filter_candidates, search, MatchStage, QueryFilter, SearchSettings};
use crate::snapshot::Snapshot;
use crate::source::RecordSource;
use crate::spell::SpellCheckReport;
use crate::tokenize::{IndexSettings, Tokenizer};

const RANKING_PREVIEW: usize = 20;

fn default_cache_capacity() -> usize {
    256
}

/// Every tunable of the engine, grouped as in the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogSettings {
    #[serde(default)]
    pub normalize: NormalizeSettings,
    #[serde(default)]
    pub index: IndexSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub ranking: RankSettings,
    #[serde(default)]
    pub generation: GenerateSettings,
    #[serde(default)]
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Zero disables memoization.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

struct CachedResponse {
    version: u64,
    response: QueryResponse,
}

/// Resets the in-flight flag however the reload ends.
struct ReloadGuard<'a>(&'a AtomicBool);

impl Drop for ReloadGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Catalog {
    sources: Vec<Arc<dyn RecordSource>>,
    settings: CatalogSettings,
    normalizer: Normalizer,
    tokenizer: Tokenizer,
    current: RwLock<Arc<Snapshot>>,
    reloading: AtomicBool,
    next_version: AtomicU64,
    cache: Option<Mutex<LruCache<String, CachedResponse>>>,
}

impl Catalog {
    /// Read every source and publish the first snapshot.
    ///
    /// Any source failure aborts the load.
    pub fn load(sources: Vec<Arc<dyn RecordSource>>, settings: CatalogSettings) -> Result<Self> {
        let started = Instant::now();
        let normalizer = Normalizer::new(&settings.normalize);
        let tokenizer = Tokenizer::new(&settings.index);
        let batches = read_sources(&sources)?;
        let snapshot = Snapshot::build(1, batches, &normalizer, &tokenizer);
        info!(
            sources = sources.len(),
            rows = snapshot.row_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "catalog loaded"
        );

        let cache = NonZeroUsize::new(settings.cache.capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        Ok(Self {
            sources,
            settings,
            normalizer,
            tokenizer,
            current: RwLock::new(Arc::new(snapshot)),
            reloading: AtomicBool::new(false),
            next_version: AtomicU64::new(2),
            cache,
        })
    }

    /// Rebuild from the sources and swap the new snapshot in.
    ///
    /// On failure the previous snapshot keeps serving.
    pub fn reload(&self) -> Result<ReloadSummary> {
        if self
            .reloading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("reload rejected, another reload is running");
            return Err(CatalogError::ReloadConflict);
        }
        let _guard = ReloadGuard(&self.reloading);
        let started = Instant::now();

        let batches = match read_sources(&self.sources) {
            Ok(batches) => batches,
            Err(e) => {
                warn!(
                    error = %e,
                    serving_version = self.snapshot().version,
                    "reload failed, still serving previous snapshot"
                );
                return Err(e);
            }
        };

        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        let snapshot = Arc::new(Snapshot::build(version, batches, &self.normalizer, &self.tokenizer));
        let summary = ReloadSummary {
            record_count: snapshot.record_count(),
            row_count: snapshot.row_count(),
            column_count: snapshot.column_count(),
            snapshot_version: snapshot.version,
            fingerprint: snapshot.fingerprint.clone(),
            elapsed_ms: 0.0,
        };

        *self.current.write() = snapshot;
        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }

        let elapsed_ms = round4(started.elapsed().as_secs_f64() * 1000.0);
        info!(
            version,
            records = summary.record_count,
            rows = summary.row_count,
            elapsed_ms,
            "catalog reloaded"
        );
        Ok(ReloadSummary {
            elapsed_ms,
            ..summary
        })
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    pub fn state(&self) -> CatalogState {
        if self.reloading.load(Ordering::Acquire) {
            CatalogState::Rebuilding
        } else {
            CatalogState::Ready
        }
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    pub fn query(&self, filter: &QueryFilter) -> Result<QueryResponse> {
        filter.validate(&self.settings.search)?;
        let started = Instant::now();
        let snapshot = self.snapshot();
        let key = filter.cache_key();

        if let Some(cache) = &self.cache {
            let mut cache = cache.lock();
            if let Some(entry) = cache.get(&key) {
                if entry.version == snapshot.version {
                    let mut response = entry.response.clone();
                    // Equivalent filters share an entry; echo this caller's spelling.
                    response.filters = FiltersEcho::from(filter);
                    response.generated.title = generate::block_title(filter);
                    response.debug.cache_hit = true;
                    response.debug.elapsed_ms = round4(started.elapsed().as_secs_f64() * 1000.0);
                    debug!(version = snapshot.version, "query served from cache");
                    return Ok(response);
                }
            }
        }

        let mut response = self.build_response(&snapshot, filter);
        response.debug.elapsed_ms = round4(started.elapsed().as_secs_f64() * 1000.0);

        if let Some(cache) = &self.cache {
            cache.lock().put(
                key,
                CachedResponse {
                    version: snapshot.version,
                    response: response.clone(),
                },
            );
        }
        Ok(response)
    }

    /// Row for `id` merged with its richest raw record.
    pub fn get_by_id(&self, id: &str) -> Result<StudyDetail> {
        let snapshot = self.snapshot();
        let wanted = id.trim().trim_end_matches('/');
        let Some((_, row)) = snapshot.row_by_identifier(wanted) else {
            return Err(CatalogError::NotFound { id: id.to_string() });
        };
        let key = row.key();
        let contributors = snapshot.store.entries_for(&key);
        let richest = snapshot.store.richest(&key);
        Ok(StudyDetail::merge(row, richest, &contributors))
    }

    pub fn facets(&self) -> FacetsResponse {
        let snapshot = self.snapshot();
        FacetsResponse {
            organism: snapshot.facet_index.organism.clone(),
            project_type: snapshot.facet_index.project_type.clone(),
            snapshot_version: snapshot.version,
        }
    }

    pub fn status(&self) -> CatalogStatus {
        let snapshot = self.snapshot();
        CatalogStatus {
            status: "ok",
            state: self.state(),
            version: env!("CARGO_PKG_VERSION"),
            snapshot_version: snapshot.version,
            fingerprint: snapshot.fingerprint.clone(),
            built_at: snapshot.built_at,
            records: snapshot.record_count(),
            rows: snapshot.row_count(),
            columns: snapshot.column_count(),
            organisms: snapshot.facet_index.organism.keys().cloned().collect(),
            projects: snapshot.facet_index.project_type.keys().cloned().collect(),
            warnings: snapshot.diagnostics.warnings.clone(),
            skipped_inputs: snapshot.diagnostics.skipped_total(),
        }
    }

    pub fn spell_check(&self, query: &str) -> Result<SpellCheckReport> {
        let chars = query.chars().count();
        if chars > self.settings.search.max_query_chars {
            return Err(CatalogError::validation(
                "q",
                format!(
                    "must be at most {} characters, got {}",
                    self.settings.search.max_query_chars, chars
                ),
            ));
        }
        Ok(self.snapshot().spell.check_query(query, &self.tokenizer))
    }

    fn build_response(&self, snapshot: &Snapshot, filter: &QueryFilter) -> QueryResponse {
        let rows = &snapshot.rows;
        let (candidates, filter_stats) = filter_candidates(
            rows,
            &snapshot.token_index,
            &self.tokenizer,
            &self.normalizer,
            filter,
        );
        let result = search(
            &candidates,
            &filter.q,
            &snapshot.token_index,
            &self.tokenizer,
            &self.settings.search,
        );
        let ranked = rank(rows, &result, &self.settings.ranking);
        let cut = important_cutoff(&ranked, &self.settings.ranking);

        let mut focus: HashSet<String> = result.query_tokens.iter().cloned().collect();
        for keyword in &filter.keywords {
            focus.extend(self.tokenizer.tokens(keyword));
        }

        let generator = Generator::new(&self.tokenizer, &self.settings.generation);
        let item = |r: &RankedRow| {
            let row = &rows[r.row];
            ArticleItem::new(row, r, generator.row_fields(row, &focus))
        };

        // Both bounds were validated above.
        let pagination = Pagination::new(filter.page as usize, filter.page_size as usize, ranked.len());
        let page = &ranked[pagination.range()];

        let emerging = generator.emerging_terms(rows, &ranked, &snapshot.token_index);
        let by_topic_index: BTreeMap<String, Vec<String>> = emerging
            .iter()
            .map(|t| {
                (
                    t.topic.clone(),
                    t.sample_studies.iter().map(|s| s.id.clone()).collect(),
                )
            })
            .collect();

        let spell_check = (filter.has_text_query()
            && matches!(result.stage, MatchStage::Fuzzy | MatchStage::NoMatch))
        .then(|| snapshot.spell.check_query(&filter.q, &self.tokenizer));

        let data = (!filter.compact).then(|| DataBlock {
            studies_full: ranked
                .iter()
                .map(|r| StudyRecord {
                    row: rows[r.row].clone(),
                    rank_score: round4(r.score),
                })
                .collect(),
            total_full: ranked.len(),
            suggested_keywords: generator.suggested_keywords(rows, &ranked, &focus),
        });

        debug!(
            stage = result.stage.as_str(),
            total = ranked.len(),
            important = cut,
            version = snapshot.version,
            "query evaluated"
        );

        QueryResponse {
            filters: FiltersEcho::from(filter),
            generated: generator.generated_block(rows, &ranked, filter),
            spell_check,
            counts: Counts {
                total_studies: ranked.len(),
                important: cut,
                less_relevant: ranked.len() - cut,
            },
            pagination,
            articles: Articles {
                important: ranked[..cut].iter().map(item).collect(),
                less_relevant: ranked[cut..].iter().map(item).collect(),
                page_items: page.iter().map(item).collect(),
                highlighted: generator.highlighted(rows, page),
            },
            topics: Topics {
                emerging,
                frequent_subset: generator.frequent_subset(
                    rows,
                    &ranked,
                    self.settings.generation.frequent_limit,
                ),
                by_topic_index,
            },
            debug: DebugBlock {
                stage: result.stage,
                cache_hit: false,
                query_terms: result.query_tokens.clone(),
                filter_stats,
                ranking_preview: ranked
                    .iter()
                    .take(RANKING_PREVIEW)
                    .map(|r| RankingPreview {
                        id: rows[r.row].identifier.clone(),
                        score: round4(r.score),
                        components: r.breakdown,
                    })
                    .collect(),
                snapshot_version: snapshot.version,
                elapsed_ms: 0.0,
            },
            data,
            exported_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

fn read_sources(
    sources: &[Arc<dyn RecordSource>],
) -> Result<Vec<(String, crate::source::SourceBatch)>> {
    let mut batches = Vec::with_capacity(sources.len());
    for source in sources {
        let batch = source.read()?;
        debug!(
            source = source.name(),
            records = batch.records.len(),
            skipped = batch.skipped.len(),
            "source read"
        );
        batches.push((source.name().to_string(), batch));
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawDate, RawRecord, SourceKind};
    use crate::source::memory::MemorySource;

    fn study(id: &str, organism: &str, project: &str, title: &str, desc: &str) -> RawRecord {
        let mut rec = RawRecord::new(SourceKind::Study, format!("{organism}/{project}.json"));
        rec.ids.primary = Some(id.to_string());
        rec.organism = Some(organism.to_string());
        rec.project = Some(project.to_string());
        rec.title = Some(title.to_string());
        rec.description = Some(desc.to_string());
        rec
    }

    fn catalog_with(records: Vec<RawRecord>) -> (Catalog, Arc<MemorySource>) {
        let source = Arc::new(MemorySource::new("mem", records));
        let catalog = Catalog::load(
            vec![source.clone() as Arc<dyn RecordSource>],
            CatalogSettings::default(),
        )
        .unwrap();
        (catalog, source)
    }

    fn fixture() -> Vec<RawRecord> {
        vec![
            study("OSD-1", "plant", "high_altitude", "Arabidopsis root growth under high altitude", "Seedlings were grown at altitude for two weeks."),
            study("OSD-2", "plant", "ground", "Wheat leaf development", "Leaves were sampled daily in a chamber."),
            study("OSD-3", "rodent", "spaceflight", "Bone density loss in mice", "Mice flew for thirty days."),
        ]
    }

    #[test]
    fn test_query_filter_only() {
        let (catalog, _) = catalog_with(fixture());
        let response = catalog
            .query(&QueryFilter {
                organism: vec!["Plant".to_string()],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(response.debug.stage, MatchStage::FilterOnly);
        assert_eq!(response.counts.total_studies, 2);
        assert_eq!(
            response.counts.important + response.counts.less_relevant,
            2
        );
        assert!(response.spell_check.is_none());
        assert_eq!(response.data.as_ref().map(|d| d.total_full), Some(2));
    }

    #[test]
    fn test_compact_omits_data() {
        let (catalog, _) = catalog_with(fixture());
        let response = catalog
            .query(&QueryFilter {
                compact: true,
                ..Default::default()
            })
            .unwrap();
        assert!(response.data.is_none());
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_validation_happens_before_snapshot() {
        let (catalog, _) = catalog_with(fixture());
        let err = catalog
            .query(&QueryFilter {
                page_size: 500,
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.code(), "bad_request");
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn test_cache_hit_on_repeat_and_cleared_on_reload() {
        let (catalog, source) = catalog_with(fixture());
        let filter = QueryFilter {
            q: "bone".to_string(),
            ..Default::default()
        };
        assert!(!catalog.query(&filter).unwrap().debug.cache_hit);
        assert!(catalog.query(&filter).unwrap().debug.cache_hit);

        let mut records = fixture();
        records.push(study("OSD-4", "rodent", "ground", "Bone marrow", "Marrow cells."));
        source.set_records(records);
        catalog.reload().unwrap();

        let after = catalog.query(&filter).unwrap();
        assert!(!after.debug.cache_hit);
        assert_eq!(after.counts.total_studies, 2);
        assert_eq!(after.debug.snapshot_version, 2);
    }

    #[test]
    fn test_cache_hit_echoes_current_filter() {
        let (catalog, _) = catalog_with(fixture());
        let lower = QueryFilter {
            organism: vec!["plant".to_string()],
            ..Default::default()
        };
        let first = catalog.query(&lower).unwrap();
        assert_eq!(first.generated.title, "plant");

        let display = QueryFilter {
            organism: vec!["Plant".to_string()],
            ..Default::default()
        };
        let second = catalog.query(&display).unwrap();
        assert!(second.debug.cache_hit);
        assert_eq!(second.filters.organism, vec!["Plant"]);
        assert_eq!(second.filters.query_params, "?organism=Plant");
        assert_eq!(second.generated.title, "Plant");
        assert_eq!(second.articles, first.articles);
    }

    #[test]
    fn test_cache_disabled_with_zero_capacity() {
        let source = Arc::new(MemorySource::new("mem", fixture()));
        let settings = CatalogSettings {
            cache: CacheSettings { capacity: 0 },
            ..Default::default()
        };
        let catalog = Catalog::load(vec![source as Arc<dyn RecordSource>], settings).unwrap();
        let filter = QueryFilter::default();
        catalog.query(&filter).unwrap();
        assert!(!catalog.query(&filter).unwrap().debug.cache_hit);
    }

    #[test]
    fn test_failed_reload_keeps_serving() {
        let (catalog, source) = catalog_with(fixture());
        source.set_failure(Some("gone".to_string()));
        let err = catalog.reload().unwrap_err();
        assert_eq!(err.code(), "source_read");
        assert_eq!(catalog.snapshot().version, 1);
        assert_eq!(catalog.status().rows, 3);
        assert_eq!(catalog.state(), CatalogState::Ready);

        source.set_failure(None);
        let summary = catalog.reload().unwrap();
        assert_eq!(summary.snapshot_version, 2);
        assert_eq!(summary.row_count, 3);
    }

    #[test]
    fn test_load_fails_on_source_error() {
        let source = Arc::new(MemorySource::new("mem", fixture()));
        source.set_failure(Some("missing".to_string()));
        let result = Catalog::load(vec![source as Arc<dyn RecordSource>], CatalogSettings::default());
        assert!(matches!(result, Err(CatalogError::SourceRead { .. })));
    }

    #[test]
    fn test_reload_conflict_when_in_flight() {
        let (catalog, _) = catalog_with(fixture());
        catalog.reloading.store(true, Ordering::Release);
        assert!(matches!(catalog.reload(), Err(CatalogError::ReloadConflict)));
        assert_eq!(catalog.state(), CatalogState::Rebuilding);
        catalog.reloading.store(false, Ordering::Release);
        assert!(catalog.reload().is_ok());
    }

    #[test]
    fn test_get_by_id_keeps_richer_duplicate() {
        let mut poor = study("OSD-100", "rodent", "ground", "Hindlimb unloading", "");
        poor.description = None;
        let mut rich = RawRecord::new(SourceKind::Study, "rodent/ground.json");
        rich.ids.primary = Some("OSD-100".to_string());
        rich.ids.accession = Some("GLDS-100".to_string());
        rich.organism = Some("rodent".to_string());
        rich.project = Some("ground".to_string());
        rich.description = Some("Mice were suspended for 30 days.".to_string());
        rich.date = Some(RawDate::Text("2019-05-01".to_string()));
        rich.extra.insert("Mission".to_string(), serde_json::json!("HU-1"));

        let (catalog, _) = catalog_with(vec![poor, rich]);
        let detail = catalog.get_by_id("OSD-100").unwrap();
        assert_eq!(detail.title.as_deref(), Some("Hindlimb unloading"));
        assert_eq!(detail.description.as_deref(), Some("Mice were suspended for 30 days."));
        assert_eq!(detail.release_date.as_deref(), Some("2019-05-01T00:00:00Z"));
        assert_eq!(detail.extra.get("Mission"), Some(&serde_json::json!("HU-1")));
    }

    #[test]
    fn test_get_by_id_not_found() {
        let (catalog, _) = catalog_with(fixture());
        let err = catalog.get_by_id("OSD-999").unwrap_err();
        assert_eq!(err.code(), "not_found");
        assert!(catalog.get_by_id("OSD-1/").is_ok());
    }

    #[test]
    fn test_spell_check_attached_on_fuzzy() {
        let mut records = fixture();
        records.push(study("OSD-5", "plant", "ground", "Arabidopsis seedlings", "Root hairs."));
        let (catalog, _) = catalog_with(records);
        let response = catalog
            .query(&QueryFilter {
                q: "arabidopsys".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(response.debug.stage, MatchStage::Fuzzy);
        let report = response.spell_check.unwrap();
        assert_eq!(report.corrected_query, "arabidopsis");
    }

    #[test]
    fn test_facets_and_status() {
        let (catalog, source) = catalog_with(fixture());
        assert_eq!(catalog.status().skipped_inputs, 0);
        source.add_skipped("plant/broken.json", "expected value at line 1");
        catalog.reload().unwrap();
        assert_eq!(catalog.status().skipped_inputs, 1);

        let facets = catalog.facets();
        assert_eq!(facets.organism.get("Plant"), Some(&2));
        assert_eq!(facets.project_type.get("High Altitude"), Some(&1));
        let status = catalog.status();
        assert_eq!(status.state, CatalogState::Ready);
        assert_eq!(status.records, 3);
        assert!(status.organisms.contains(&"Rodent".to_string()));
    }
}

//! Literature article source.
//!
//! Reads one JSON array of article objects. When the configured file is
//! absent the legacy path is tried instead; when neither exists the read
//! fails. A file that is present but not a JSON array is reported as
//! skipped, as is any array element that is not an object.

use catalog_core::{CatalogError, RawRecord, RecordSource, SkippedItem, SourceBatch, SourceKind};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::ArticlesSourceConfig;
use crate::json_fields::{take_count, take_date, take_list, take_text};

pub struct ArticleFileSource {
    config: ArticlesSourceConfig,
}

impl ArticleFileSource {
    pub fn new(config: ArticlesSourceConfig) -> Self {
        Self { config }
    }

    /// The file a read would use right now, if any.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        if self.config.path.is_file() {
            return Some(self.config.path.clone());
        }
        self.config
            .legacy_path
            .as_ref()
            .filter(|p| p.is_file())
            .cloned()
    }
}

impl RecordSource for ArticleFileSource {
    fn name(&self) -> &str {
        "articles"
    }

    fn read(&self) -> catalog_core::Result<SourceBatch> {
        let Some(path) = self.resolved_path() else {
            return Err(CatalogError::source_read(
                self.name(),
                format!("article file does not exist: {}", self.config.path.display()),
            ));
        };
        if path != self.config.path {
            info!(path = %path.display(), "using legacy article file");
        }

        let mut batch = SourceBatch::default();
        let location = file_label(&path);
        let items = match read_array(&path) {
            Ok(items) => items,
            Err(reason) => {
                batch.skipped.push(SkippedItem { location, reason });
                return Ok(batch);
            }
        };

        for (i, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(obj) => batch.records.push(article_record(obj, &location)),
                _ => batch.skipped.push(SkippedItem {
                    location: format!("{}[{}]", location, i),
                    reason: "article entry is not an object".to_string(),
                }),
            }
        }
        debug!(file = %location, records = batch.records.len(), "article file read");
        Ok(batch)
    }
}

fn read_array(path: &Path) -> Result<Vec<Value>, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    match serde_json::from_str(&content).map_err(|e| e.to_string())? {
        Value::Array(items) => Ok(items),
        _ => Err("expected a JSON array of articles".to_string()),
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Map one article object onto a record. The PMC id doubles as the
/// primary identifier, the PMID as the accession.
pub fn article_record(mut obj: serde_json::Map<String, Value>, origin: &str) -> RawRecord {
    let mut rec = RawRecord::new(SourceKind::Article, origin);
    let pmc = take_text(&mut obj, &["pmc", "pmcid"]);
    let pmid = take_text(&mut obj, &["pmid"]);
    rec.ids.primary = pmc.clone().or_else(|| pmid.clone());
    rec.ids.accession = pmid.clone();
    rec.ids.pmc = pmc;
    rec.ids.pmid = pmid;
    rec.ids.doi = take_text(&mut obj, &["doi", "DOI"]);
    rec.title = take_text(&mut obj, &["title"]);
    rec.abstract_text = take_text(&mut obj, &["abstract"]);
    rec.conclusions = take_text(&mut obj, &["conclusions"]);
    rec.date = take_date(&mut obj, &["date", "release_date"]);
    rec.citation_count = take_count(&mut obj, &["cited_by"]);
    rec.figure_refs = take_list(&mut obj, &["fig_ids"]);
    rec.url = take_text(&mut obj, &["url"]);
    rec.extra = obj.into_iter().collect();
    rec
}

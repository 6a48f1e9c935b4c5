//! Study directory source.
//!
//! Reads `<root>/<organism>/<project>.json` files. Each file is a search
//! export whose `hits.hits[]._source` objects are study records; the
//! organism comes from the directory name and the project from the file
//! stem. A file that cannot be read or parsed is reported as skipped and
//! the rest of the tree still loads. A missing root fails the read.

use catalog_core::{CatalogError, RawRecord, RecordSource, SkippedItem, SourceBatch, SourceKind};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::StudiesSourceConfig;
use crate::json_fields::{take_count, take_date, take_list, take_text};

pub struct StudyDirectorySource {
    config: StudiesSourceConfig,
    include_set: GlobSet,
    exclude_set: GlobSet,
}

impl StudyDirectorySource {
    pub fn new(config: StudiesSourceConfig) -> anyhow::Result<Self> {
        let include_set = build_globset(&config.include_globs)?;
        let mut excludes = vec!["**/.git/**".to_string(), "**/.*".to_string()];
        excludes.extend(config.exclude_globs.clone());
        let exclude_set = build_globset(&excludes)?;
        Ok(Self {
            config,
            include_set,
            exclude_set,
        })
    }
}

impl RecordSource for StudyDirectorySource {
    fn name(&self) -> &str {
        "studies"
    }

    fn read(&self) -> catalog_core::Result<SourceBatch> {
        let root = &self.config.root;
        if !root.is_dir() {
            return Err(CatalogError::source_read(
                self.name(),
                format!("study root does not exist: {}", root.display()),
            ));
        }

        let mut batch = SourceBatch::default();
        let walker = WalkDir::new(root)
            .min_depth(2)
            .max_depth(2)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let location = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| root.display().to_string());
                    batch.skipped.push(SkippedItem {
                        location,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if self.exclude_set.is_match(&rel_str) || !self.include_set.is_match(&rel_str) {
                continue;
            }

            match read_study_file(path, &rel_str) {
                Ok(records) => {
                    debug!(file = %rel_str, records = records.len(), "study file read");
                    batch.records.extend(records);
                }
                Err(reason) => batch.skipped.push(SkippedItem {
                    location: rel_str,
                    reason,
                }),
            }
        }

        Ok(batch)
    }
}

fn read_study_file(path: &Path, rel_str: &str) -> Result<Vec<RawRecord>, String> {
    let organism = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| "file has no organism directory".to_string())?;
    let project = path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| "file has no name".to_string())?;

    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let data: Value = serde_json::from_str(&content).map_err(|e| e.to_string())?;

    let hits = data
        .get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(Value::as_array)
        .ok_or_else(|| "missing hits.hits array".to_string())?;

    Ok(hits
        .iter()
        .filter_map(|hit| hit.get("_source").and_then(Value::as_object))
        .map(|source| study_record(source.clone(), &organism, &project, rel_str))
        .collect())
}

/// Map one `_source` object onto a study record.
pub fn study_record(
    mut source: serde_json::Map<String, Value>,
    organism: &str,
    project: &str,
    origin: &str,
) -> RawRecord {
    let mut rec = RawRecord::new(SourceKind::Study, origin);
    rec.organism = Some(organism.to_string());
    rec.project = Some(project.to_string());

    rec.ids.primary = take_text(&mut source, &["Study Identifier"]);
    rec.ids.accession = take_text(&mut source, &["Accession"]);
    rec.ids.source_url = take_text(&mut source, &["Authoritative Source URL"]);
    rec.ids.doi = take_text(&mut source, &["DOI", "doi"]);
    rec.title = take_text(&mut source, &["Study Title", "Study Publication Title"]);
    rec.description = take_text(&mut source, &["Study Description"]);
    rec.project_type = take_text(&mut source, &["Project Type", "Project_Type"]);
    rec.date = take_date(&mut source, &["Study Public Release Date", "release_date"]);
    rec.citation_count = take_count(&mut source, &["cited_by", "citation_count"]);
    rec.figure_refs = take_list(&mut source, &["fig_ids"]);
    rec.url = take_text(&mut source, &["url"]);
    rec.extra = source.into_iter().collect();
    rec
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn source_for(root: &Path) -> StudyDirectorySource {
        StudyDirectorySource::new(StudiesSourceConfig {
            root: root.to_path_buf(),
            include_globs: vec!["*/*.json".to_string()],
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        })
        .unwrap()
    }

    fn hits(sources: Vec<Value>) -> String {
        let hits: Vec<Value> = sources.into_iter().map(|s| json!({ "_source": s })).collect();
        json!({ "hits": { "hits": hits } }).to_string()
    }

    #[test]
    fn test_reads_organism_and_project_from_layout() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("plant")).unwrap();
        fs::write(
            tmp.path().join("plant/space_flight.json"),
            hits(vec![json!({
                "Study Identifier": "OSD-1",
                "Study Title": "Root growth",
                "Study Public Release Date": 1556668800,
                "Mission": "SpaceX-12"
            })]),
        )
        .unwrap();

        let batch = source_for(tmp.path()).read().unwrap();
        assert_eq!(batch.records.len(), 1);
        let rec = &batch.records[0];
        assert_eq!(rec.organism.as_deref(), Some("plant"));
        assert_eq!(rec.project.as_deref(), Some("space_flight"));
        assert_eq!(rec.ids.primary.as_deref(), Some("OSD-1"));
        assert_eq!(rec.origin, "plant/space_flight.json");
        assert_eq!(rec.extra.get("Mission"), Some(&json!("SpaceX-12")));
        assert!(!rec.extra.contains_key("Study Title"));
    }

    #[test]
    fn test_malformed_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("rodent")).unwrap();
        fs::write(tmp.path().join("rodent/ground.json"), "{ not json").unwrap();
        fs::write(
            tmp.path().join("rodent/space_flight.json"),
            hits(vec![json!({"Study Identifier": "OSD-2"})]),
        )
        .unwrap();

        let batch = source_for(tmp.path()).read().unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.skipped[0].location, "rodent/ground.json");
    }

    #[test]
    fn test_missing_root_is_source_error() {
        let tmp = TempDir::new().unwrap();
        let err = source_for(&tmp.path().join("nope")).read().unwrap_err();
        assert_eq!(err.code(), "source_read");
    }

    #[test]
    fn test_publication_title_fallback() {
        let rec = study_record(
            json!({"Study Publication Title": "Bone loss", "Project Type": "Spaceflight Study"})
                .as_object()
                .unwrap()
                .clone(),
            "rodent",
            "ground",
            "rodent/ground.json",
        );
        assert_eq!(rec.title.as_deref(), Some("Bone loss"));
        assert_eq!(rec.project_type.as_deref(), Some("Spaceflight Study"));
        assert!(rec.extra.is_empty());
    }
}

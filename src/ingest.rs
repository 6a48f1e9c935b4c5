//! Catalog bootstrap.
//!
//! Builds every configured source and runs the initial load. Used by both
//! the one-shot CLI commands and `catalog serve`.

use anyhow::{Context, Result};
use catalog_core::Catalog;
use std::time::Instant;
use tracing::info;

use crate::config::Config;
use crate::sources::build_sources;

pub fn open_catalog(config: &Config) -> Result<Catalog> {
    let started = Instant::now();
    let sources = build_sources(config)?;
    let source_count = sources.len();
    let catalog = Catalog::load(sources, config.catalog_settings())
        .context("Failed to load catalog sources")?;

    let snapshot = catalog.snapshot();
    info!(
        sources = source_count,
        records = snapshot.record_count(),
        rows = snapshot.row_count(),
        skipped = snapshot.diagnostics.skipped_total(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "catalog ready"
    );
    Ok(catalog)
}

//! Catalog statistics and facet listing.
//!
//! `catalog stats` gives a quick summary of what a load produced: record and
//! row counts, per-source breakdown, skipped inputs and normalization
//! warnings. `catalog facets` lists the organism and project labels with
//! their study counts.

use anyhow::Result;

use crate::config::Config;
use crate::ingest::open_catalog;

pub fn run_stats(config: &Config, json: bool) -> Result<()> {
    let catalog = open_catalog(config)?;
    let status = catalog.status();

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let snapshot = catalog.snapshot();
    let diagnostics = &snapshot.diagnostics;

    println!("Study Catalog Stats");
    println!("===================");
    println!();
    println!("  Records:     {}", status.records);
    println!("  Rows:        {}", status.rows);
    println!("  Columns:     {}", status.columns);
    println!("  Organisms:   {}", status.organisms.len());
    println!("  Projects:    {}", status.projects.len());
    println!("  Duplicates:  {}", diagnostics.duplicates_dropped);
    println!("  Unresolved:  {}", diagnostics.unresolved_identifiers);
    println!("  Fingerprint: {}", &status.fingerprint[..12.min(status.fingerprint.len())]);

    if !diagnostics.sources.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<16} {:>8} {:>8}", "SOURCE", "RECORDS", "SKIPPED");
        println!("  {}", "-".repeat(34));
        for s in &diagnostics.sources {
            println!("  {:<16} {:>8} {:>8}", s.name, s.records, s.skipped.len());
        }
        for s in &diagnostics.sources {
            for item in &s.skipped {
                println!("    skipped {}: {}", item.location, item.reason);
            }
        }
    }

    if status.warnings.total() > 0 {
        println!();
        println!("  Normalization warnings:");
        for (kind, count) in &status.warnings.counts {
            println!("  {:<24} {:>6}", kind, count);
        }
    }

    println!();
    Ok(())
}

pub fn run_facets(config: &Config, json: bool) -> Result<()> {
    let catalog = open_catalog(config)?;
    let facets = catalog.facets();

    if json {
        println!("{}", serde_json::to_string_pretty(&facets)?);
        return Ok(());
    }

    println!("{:<28} STUDIES", "ORGANISM");
    for (label, count) in &facets.organism {
        println!("{:<28} {}", label, count);
    }
    println!();
    println!("{:<28} STUDIES", "PROJECT TYPE");
    for (label, count) in &facets.project_type {
        println!("{:<28} {}", label, count);
    }
    Ok(())
}

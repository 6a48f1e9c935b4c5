//! Study retrieval by identifier.
//!
//! Prints the merged detail view: the aggregated row with gaps filled from
//! its richest raw record, plus that record's pass-through fields.

use anyhow::Result;

use crate::config::Config;
use crate::ingest::open_catalog;

/// CLI entry point: look the study up and print it to stdout.
pub fn run_get(config: &Config, id: &str, json: bool) -> Result<()> {
    let catalog = open_catalog(config)?;
    let detail = catalog.get_by_id(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    println!("--- Study ---");
    println!("id:           {}", detail.identifier);
    println!(
        "title:        {}",
        detail.title.as_deref().unwrap_or("(untitled)")
    );
    println!("kind:         {}", detail.kind.as_str());
    println!("organism:     {}", detail.organism_label);
    println!("project:      {}", detail.project_label);
    if let Some(ref date) = detail.release_date {
        println!("released:     {}", date);
    }
    if let Some(count) = detail.citation_count {
        println!("citations:    {}", count);
    }
    if let Some(ref doi) = detail.doi {
        println!("doi:          {}", doi);
    }
    if let Some(ref url) = detail.url {
        println!("url:          {}", url);
    }
    if !detail.figure_refs.is_empty() {
        println!("figures:      {}", detail.figure_refs.join(", "));
    }
    println!("sources:      {}", detail.sources.join(", "));
    println!();

    if let Some(ref description) = detail.description {
        println!("--- Description ---");
        println!("{}", description);
        println!();
    }

    if !detail.extra.is_empty() {
        println!("--- Fields ({}) ---", detail.extra.len());
        for (key, value) in &detail.extra {
            match value {
                serde_json::Value::String(s) => println!("{}: {}", key, s),
                other => println!("{}: {}", key, other),
            }
        }
    }

    Ok(())
}

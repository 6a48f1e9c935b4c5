//! `catalog query` and `catalog spell-check`.
//!
//! Both open the catalog from the configured sources, run one operation
//! and print either a human summary or the raw JSON payload.

use anyhow::Result;
use catalog_core::payload::QueryResponse;
use catalog_core::QueryFilter;

use crate::config::Config;
use crate::ingest::open_catalog;

pub fn run_query(config: &Config, filter: QueryFilter, json: bool) -> Result<()> {
    let catalog = open_catalog(config)?;
    let response = catalog.query(&filter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    print_response(&response);
    Ok(())
}

fn print_response(response: &QueryResponse) {
    println!("{}", response.generated.title);
    println!(
        "stage: {}  total: {}  important: {}  less relevant: {}",
        response.debug.stage,
        response.counts.total_studies,
        response.counts.important,
        response.counts.less_relevant
    );

    if let Some(spell) = response.spell_check.as_ref().filter(|s| s.has_errors) {
        println!("Did you mean: {}", spell.corrected_query);
    }

    if response.counts.total_studies == 0 {
        println!("No results.");
        return;
    }

    let p = &response.pagination;
    println!(
        "page {}/{} ({} per page)",
        p.page, p.total_pages, p.page_size
    );
    println!();

    let offset = (p.page - 1) * p.page_size;
    for (i, item) in response.articles.page_items.iter().enumerate() {
        let marker = if response.articles.highlighted.contains(&item.id) {
            "*"
        } else {
            " "
        };
        println!(
            "{}{}. [{:.3}] {}  {} / {}",
            marker,
            offset + i + 1,
            item.rank_score,
            item.id,
            item.organism,
            item.project_type
        );
        let title = item
            .alt_title
            .as_deref()
            .or(item.title.as_deref())
            .unwrap_or("(untitled)");
        println!("    title: {}", title);
        if let Some(date) = &item.release_date {
            println!("    released: {}", date);
        }
        if let Some(summary) = &item.compact_summary {
            println!("    summary: {}", summary);
        }
        println!();
    }

    if !response.topics.emerging.is_empty() {
        let topics: Vec<&str> = response
            .topics
            .emerging
            .iter()
            .map(|t| t.topic.as_str())
            .collect();
        println!("emerging topics: {}", topics.join(", "));
    }
}

pub fn run_spell_check(config: &Config, query: &str, json: bool) -> Result<()> {
    let catalog = open_catalog(config)?;
    let report = catalog.spell_check(query)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if !report.has_errors {
        println!("No corrections.");
        return Ok(());
    }
    println!("corrected: {}", report.corrected_query);
    for c in &report.corrections {
        let alternatives: Vec<&str> = c.suggestions.iter().map(|s| s.word.as_str()).collect();
        println!("  {} -> {}  ({})", c.original, c.best_correction, alternatives.join(", "));
    }
    if !report.ignored_tokens.is_empty() {
        println!("ignored: {}", report.ignored_tokens.join(", "));
    }
    println!("confidence: {:.2}", report.confidence);
    Ok(())
}

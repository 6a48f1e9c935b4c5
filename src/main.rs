//! # Study Catalog CLI (`catalog`)
//!
//! The `catalog` binary loads the configured study and article sources into
//! an in-memory catalog, then either serves it over HTTP or answers a single
//! command and exits.
//!
//! ## Usage
//!
//! ```bash
//! catalog --config ./config/catalog.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `catalog serve` | Start the HTTP server |
//! | `catalog query` | Run one filtered, ranked query |
//! | `catalog get <id>` | Print the merged detail of one study |
//! | `catalog facets` | List organism and project labels with counts |
//! | `catalog sources` | Show configured sources and whether they exist |
//! | `catalog stats` | Counts, skipped inputs and normalization warnings |
//! | `catalog spell-check "<query>"` | Spelling suggestions from the catalog vocabulary |
//!
//! ## Examples
//!
//! ```bash
//! catalog query --organism Plant --q "root growth" --config ./config/catalog.toml
//! catalog query --project-type Spaceflight --json --config ./config/catalog.toml
//! catalog get OSD-100 --config ./config/catalog.toml
//! catalog serve --config ./config/catalog.toml
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

mod config;
mod connector_articles;
mod connector_studies;
mod get;
mod ingest;
mod json_fields;
mod search;
mod server;
mod sources;
mod stats;

use catalog_core::QueryFilter;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

/// Study Catalog CLI.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/catalog.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "catalog",
    about = "Study Catalog: faceted, typo-tolerant search over study and literature records",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/catalog.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` and serves the catalog until terminated.
    Serve,

    /// Run one query and print the result page.
    Query {
        /// Organism label; repeat for several.
        #[arg(long)]
        organism: Vec<String>,

        /// Project type label; repeat for several.
        #[arg(long = "project-type")]
        project_type: Vec<String>,

        /// Keyword every result must contain; repeat for several.
        #[arg(long = "keyword")]
        keywords: Vec<String>,

        /// Free-text query.
        #[arg(long, default_value = "")]
        q: String,

        #[arg(long, default_value_t = 1)]
        page: i64,

        #[arg(long = "page-size", default_value_t = 20)]
        page_size: i64,

        /// Omit the full data block from the payload.
        #[arg(long)]
        compact: bool,

        /// Print the raw JSON payload.
        #[arg(long)]
        json: bool,
    },

    /// Print one study, merged with its richest raw record.
    Get {
        /// Study identifier (e.g. `OSD-100`, `PMC1234567`).
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// List facet labels and counts.
    Facets {
        #[arg(long)]
        json: bool,
    },

    /// List configured sources and their status.
    Sources,

    /// Show load statistics.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Suggest spelling corrections for a query.
    SpellCheck {
        query: String,

        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Query {
            organism,
            project_type,
            keywords,
            q,
            page,
            page_size,
            compact,
            json,
        } => {
            let filter = QueryFilter {
                organism,
                project_type,
                keywords,
                q,
                page,
                page_size,
                compact,
            };
            search::run_query(&cfg, filter, json)?;
        }
        Commands::Get { id, json } => {
            get::run_get(&cfg, &id, json)?;
        }
        Commands::Facets { json } => {
            stats::run_facets(&cfg, json)?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json)?;
        }
        Commands::SpellCheck { query, json } => {
            search::run_spell_check(&cfg, &query, json)?;
        }
    }

    Ok(())
}

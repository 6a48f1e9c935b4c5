//! # Study Catalog
//!
//! Unifies per-organism study exports and a literature article file into
//! one in-memory catalog with faceted filtering, staged text search,
//! heuristic ranking and hot reload. The engine lives in `catalog-core`;
//! this crate adds configuration, file-backed sources, the CLI and the HTTP
//! server.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │   Sources    │──▶│   Snapshot    │──▶│   Catalog    │
//! │ studies/arts │   │ rows+indexes  │   │ query/reload │
//! └──────────────┘   └───────────────┘   └──────┬───────┘
//!                                               │
//!                        ┌──────────────────────┤
//!                        ▼                      ▼
//!                   ┌──────────┐          ┌──────────┐
//!                   │   CLI    │          │   HTTP   │
//!                   │(catalog) │          │  (axum)  │
//!                   └──────────┘          └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`connector_studies`] | Study directory source |
//! | [`connector_articles`] | Article file source |
//! | [`json_fields`] | JSON-to-record field helpers |
//! | [`sources`] | Source construction and health listing |
//! | [`ingest`] | Catalog bootstrap |
//! | [`search`] | Query and spell-check commands |
//! | [`get`] | Study detail command |
//! | [`stats`] | Stats and facets commands |
//! | [`server`] | HTTP server |

pub mod config;
pub mod connector_articles;
pub mod connector_studies;
pub mod get;
pub mod ingest;
pub mod json_fields;
pub mod search;
pub mod server;
pub mod sources;
pub mod stats;

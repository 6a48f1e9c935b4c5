//! # Catalog Core
//!
//! In-memory engine behind Study Catalog: it ingests heterogeneous study and
//! article records, consolidates them into one row per study, and answers
//! faceted, ranked, typo-tolerant queries over an immutable snapshot.
//!
//! | Module | Role |
//! |--------|------|
//! | [`models`] | Raw records, canonical keys, aggregated rows |
//! | [`error`] | Typed errors with stable codes |
//! | [`normalize`] | Identifier chain, label aliases, dates, descriptions |
//! | [`tokenize`] | Text folding, stopwords, tokens |
//! | [`consolidate`] | Dedup into the raw store, grouping into rows |
//! | [`index`] | Token postings and facet counts |
//! | [`search`] | Filters and staged text matching |
//! | [`rank`] | Weighted scoring and the important split |
//! | [`generate`] | Titles, summaries, keyword and topic heuristics |
//! | [`spell`] | Vocabulary-based query correction |
//! | [`source`] | The record source trait and an in-memory source |
//! | [`snapshot`] | The immutable bundle queries read |
//! | [`payload`] | Serialized response shapes |
//! | [`catalog`] | Load, reload, cache and the query facade |
//!
//! This crate does no filesystem or network I/O of its own; file-backed
//! sources live in the application crate.

pub mod catalog;
pub mod consolidate;
pub mod error;
pub mod generate;
pub mod index;
pub mod models;
pub mod normalize;
pub mod payload;
pub mod rank;
pub mod search;
pub mod snapshot;
pub mod source;
pub mod spell;
pub mod tokenize;

pub use catalog::{CacheSettings, Catalog, CatalogSettings};
pub use error::{CatalogError, Result};
pub use models::{AggregateRow, RawDate, RawRecord, SourceKind};
pub use search::{MatchStage, QueryFilter};
pub use source::{RecordSource, SkippedItem, SourceBatch};

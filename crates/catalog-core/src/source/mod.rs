//! Record source abstraction for Study Catalog.
//!
//! A [`RecordSource`] turns some external collection (a directory tree of
//! study files, an article dump, a test fixture) into [`RawRecord`] values
//! without interpreting them. The catalog calls every configured source on
//! each load and reload, so reading must be repeatable.
//!
//! Implementations must be `Send + Sync`: reloads run on a worker thread
//! while the sources stay shared with the serving side.

pub mod memory;

use serde::Serialize;

use crate::error::Result;
use crate::models::RawRecord;

/// An input item that could not be parsed and was left out of the load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedItem {
    /// File path or other locator.
    pub location: String,
    pub reason: String,
}

/// Everything one source produced in a single read.
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    pub records: Vec<RawRecord>,
    pub skipped: Vec<SkippedItem>,
}

impl SourceBatch {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            skipped: Vec::new(),
        }
    }
}

/// A repeatable reader of raw records.
///
/// `read` fails with [`CatalogError::SourceRead`](crate::error::CatalogError)
/// only when the source as a whole is unavailable; individual unreadable
/// items go into [`SourceBatch::skipped`].
pub trait RecordSource: Send + Sync {
    /// Short label used in logs and diagnostics.
    fn name(&self) -> &str;

    fn read(&self) -> Result<SourceBatch>;
}

//! In-memory [`RecordSource`] for tests and embedding.
//!
//! Records live behind a `parking_lot::RwLock`, so a test can swap the
//! contents (or make the source fail) between loads to exercise reload.

use parking_lot::RwLock;

use crate::error::{CatalogError, Result};
use crate::models::RawRecord;

use super::{RecordSource, SkippedItem, SourceBatch};

pub struct MemorySource {
    name: String,
    records: RwLock<Vec<RawRecord>>,
    skipped: RwLock<Vec<SkippedItem>>,
    failure: RwLock<Option<String>>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, records: Vec<RawRecord>) -> Self {
        Self {
            name: name.into(),
            records: RwLock::new(records),
            skipped: RwLock::new(Vec::new()),
            failure: RwLock::new(None),
        }
    }

    /// Replace the records returned by the next read.
    pub fn set_records(&self, records: Vec<RawRecord>) {
        *self.records.write() = records;
    }

    pub fn push(&self, record: RawRecord) {
        self.records.write().push(record);
    }

    /// Report an item as skipped on every subsequent read.
    pub fn add_skipped(&self, location: impl Into<String>, reason: impl Into<String>) {
        self.skipped.write().push(SkippedItem {
            location: location.into(),
            reason: reason.into(),
        });
    }

    /// Make subsequent reads fail (`Some`) or succeed again (`None`).
    pub fn set_failure(&self, message: Option<String>) {
        *self.failure.write() = message;
    }
}

impl RecordSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> Result<SourceBatch> {
        if let Some(message) = self.failure.read().clone() {
            return Err(CatalogError::source_read(&self.name, message));
        }
        Ok(SourceBatch {
            records: self.records.read().clone(),
            skipped: self.skipped.read().clone(),
        })
    }
}

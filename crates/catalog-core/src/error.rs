//! Error types for the catalog engine.
//!
//! Normalization problems are never errors (see
//! [`NormalizationWarning`](crate::normalize::NormalizationWarning)); only
//! the conditions below reach a caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// A configured source is missing or unreadable.
    #[error("failed to read source '{source_name}': {message}")]
    SourceRead {
        source_name: String,
        message: String,
    },

    /// A query was rejected before touching the snapshot.
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("study not found: {id}")]
    NotFound { id: String },

    #[error("a reload is already in progress")]
    ReloadConflict,
}

impl CatalogError {
    pub fn source_read(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        CatalogError::SourceRead {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        CatalogError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Stable machine-readable code, used by the HTTP error contract.
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::SourceRead { .. } => "source_read",
            CatalogError::Validation { .. } => "bad_request",
            CatalogError::NotFound { .. } => "not_found",
            CatalogError::ReloadConflict => "reload_conflict",
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

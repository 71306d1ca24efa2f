//! Search index error types.

use thiserror::Error;

/// Errors from search index operations.
#[derive(Debug, Clone, Error)]
pub enum SearchIndexError {
    /// Failed to establish connection to the search index backend.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Failed to serialize data for the search index backend.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The bulk request itself failed; no per-document detail is available.
    #[error("Bulk index error: {0}")]
    BulkIndexError(String),

    /// The bulk request completed but some documents were rejected.
    #[error("Bulk index rejected {} document(s)", failed_document_ids.len())]
    ItemsFailed { failed_document_ids: Vec<String> },

    /// Failed to parse response from search index backend.
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl SearchIndexError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create a bulk index error.
    pub fn bulk_index(msg: impl Into<String>) -> Self {
        Self::BulkIndexError(msg.into())
    }

    pub fn items_failed(failed_document_ids: Vec<String>) -> Self {
        Self::ItemsFailed {
            failed_document_ids,
        }
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Documents the backend reported as failed, empty when it gave no detail.
    pub fn failed_document_ids(&self) -> &[String] {
        match self {
            Self::ItemsFailed {
                failed_document_ids,
            } => failed_document_ids,
            _ => &[],
        }
    }
}

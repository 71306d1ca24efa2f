//! Search index provider trait definition.
//!
//! This module defines the abstract interface for bulk writes to the search
//! index, allowing different backend implementations and in-memory mocks.

use async_trait::async_trait;

use crate::errors::SearchIndexError;
use crate::types::BulkIndexItem;

/// Abstracts the underlying search index implementation.
///
/// The provider is shared by every ingestion task of the process; each task
/// asks it for its own [`BulkIndexer`] queue.
pub trait SearchIndexProvider: Send + Sync {
    /// Create an empty bulk write queue.
    ///
    /// # Arguments
    ///
    /// * `max_bytes` - Upper bound on the body size of a single bulk request.
    ///   Larger queues are split into several requests on flush.
    fn new_bulk_indexer(&self, max_bytes: usize) -> Box<dyn BulkIndexer>;
}

/// A queue of index writes sent to the backend as bulk requests.
///
/// Items stay queued until a flush succeeds or [`BulkIndexer::reset`] is
/// called, so a failed flush can be retried as is.
#[async_trait]
pub trait BulkIndexer: Send + Sync {
    /// Queue one item.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the item was queued
    /// * `Err(SearchIndexError)` - If the item could not be encoded
    fn add(&self, item: BulkIndexItem) -> Result<(), SearchIndexError>;

    /// Send every queued item.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If every document was indexed; the queue is emptied
    /// * `Err(SearchIndexError::ItemsFailed)` - If the backend rejected some
    ///   documents; the error carries their IDs
    /// * `Err(SearchIndexError)` - If a request failed without per-document detail
    async fn flush(&self) -> Result<(), SearchIndexError>;

    /// Drop every queued item.
    fn reset(&self);

    /// Number of queued items.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

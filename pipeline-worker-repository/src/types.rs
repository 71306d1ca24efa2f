//! Request types for search index writes.

use bytes::Bytes;

/// One document queued for a bulk `index` action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkIndexItem {
    /// Target index or alias.
    pub index: String,
    pub document_id: String,
    /// Shard routing key.
    pub routing: Option<String>,
    /// Serialized JSON document.
    pub body: Bytes,
}

impl BulkIndexItem {
    pub fn new(index: impl Into<String>, document_id: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            index: index.into(),
            document_id: document_id.into(),
            routing: None,
            body: body.into(),
        }
    }

    pub fn with_routing(mut self, routing: Option<String>) -> Self {
        self.routing = routing;
        self
    }
}

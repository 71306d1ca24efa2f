//! Bulk write queue backed by the OpenSearch `_bulk` API.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use opensearch::{BulkParts, OpenSearch};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::errors::SearchIndexError;
use crate::interfaces::BulkIndexer;
use crate::types::BulkIndexItem;

/// A queued item with its action line already encoded.
#[derive(Debug, Clone)]
struct QueuedItem {
    document_id: String,
    action: Bytes,
    body: Bytes,
}

impl QueuedItem {
    fn encode(item: BulkIndexItem) -> Result<Self, SearchIndexError> {
        let mut meta = json!({
            "_index": item.index,
            "_id": item.document_id,
            "require_alias": true,
        });
        if let Some(routing) = &item.routing {
            meta["routing"] = json!(routing);
        }
        let action = serde_json::to_vec(&json!({ "index": meta }))
            .map_err(|e| SearchIndexError::serialization(e.to_string()))?;

        Ok(Self {
            document_id: item.document_id,
            action: Bytes::from(action),
            body: item.body,
        })
    }

    /// Bytes taken in the NDJSON body, newlines included.
    fn encoded_len(&self) -> usize {
        self.action.len() + self.body.len() + 2
    }
}

/// Split `items` into consecutive chunks whose encoded size stays within
/// `max_bytes`. An item larger than `max_bytes` gets a chunk of its own.
fn chunk_by_size(items: &[QueuedItem], max_bytes: usize) -> Vec<&[QueuedItem]> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut size = 0;
    for (i, item) in items.iter().enumerate() {
        let len = item.encoded_len();
        if i > start && size + len > max_bytes {
            chunks.push(&items[start..i]);
            start = i;
            size = 0;
        }
        size += len;
    }
    if start < items.len() {
        chunks.push(&items[start..]);
    }
    chunks
}

/// Collect the IDs of documents a `_bulk` response reports as failed.
///
/// An item failed when it carries an `error` or a status of 300 or above.
pub fn failed_ids_from_response(response: &Value) -> Result<Vec<String>, SearchIndexError> {
    if !response["errors"].as_bool().unwrap_or(false) {
        return Ok(Vec::new());
    }

    let items = response["items"]
        .as_array()
        .ok_or_else(|| SearchIndexError::parse("bulk response reports errors without items"))?;

    let mut failed = Vec::new();
    for item in items {
        // Each item is keyed by its action name
        let Some(result) = item.as_object().and_then(|obj| obj.values().next()) else {
            continue;
        };
        let status = result["status"].as_u64().unwrap_or(0);
        if result.get("error").is_some() || status >= 300 {
            let id = result["_id"].as_str().unwrap_or_default().to_string();
            warn!(
                document_id = %id,
                status = status,
                error = %result["error"],
                "Document rejected by bulk request"
            );
            failed.push(id);
        }
    }

    Ok(failed)
}

/// Bulk indexer sending NDJSON `index` actions.
pub struct OpenSearchBulkIndexer {
    client: OpenSearch,
    max_bytes: usize,
    queue: Mutex<Vec<QueuedItem>>,
}

impl OpenSearchBulkIndexer {
    pub fn new(client: OpenSearch, max_bytes: usize) -> Self {
        Self {
            client,
            max_bytes,
            queue: Mutex::new(Vec::new()),
        }
    }

    async fn send_chunk(&self, chunk: &[QueuedItem]) -> Result<Vec<String>, SearchIndexError> {
        let mut body: Vec<Bytes> = Vec::with_capacity(chunk.len() * 2);
        for item in chunk {
            body.push(item.action.clone());
            body.push(item.body.clone());
        }

        let response = self
            .client
            .bulk(BulkParts::None)
            .body(body)
            .send()
            .await
            .map_err(|e| SearchIndexError::bulk_index(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Bulk request failed");
            return Err(SearchIndexError::bulk_index(format!(
                "Bulk request failed with status {}: {}",
                status, error_body
            )));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;
        failed_ids_from_response(&value)
    }
}

#[async_trait]
impl BulkIndexer for OpenSearchBulkIndexer {
    fn add(&self, item: BulkIndexItem) -> Result<(), SearchIndexError> {
        let queued = QueuedItem::encode(item)?;
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(queued);
        Ok(())
    }

    async fn flush(&self) -> Result<(), SearchIndexError> {
        let snapshot = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if snapshot.is_empty() {
            return Ok(());
        }

        let mut failed = Vec::new();
        for chunk in chunk_by_size(&snapshot, self.max_bytes) {
            failed.extend(self.send_chunk(chunk).await?);
        }

        if !failed.is_empty() {
            return Err(SearchIndexError::items_failed(failed));
        }

        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let sent = snapshot.len().min(queue.len());
        queue.drain(..sent);
        debug!(document_count = snapshot.len(), "Bulk flush succeeded");
        Ok(())
    }

    fn reset(&self) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn len(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

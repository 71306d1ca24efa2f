//! Record enrichment.
//!
//! Turns one consumed record into the document written to the search index
//! and the record forwarded to the output topic. Enrichment never fails: a
//! payload that is not a JSON object is wrapped as `{"message": ...}` and every
//! best-effort step logs and moves on.

mod category;
mod timestamp;

use chrono::Utc;
use pipeline_kafka::{InboundRecord, OutboundRecord};
use pipeline_worker_repository::BulkIndexItem;
use pipeline_worker_shared::naming::{index_alias, output_topic_name};
use pipeline_worker_shared::{Category, IndexBaseInfo, PipelineDefinition};
use serde_json::{json, Map, Value};
use tracing::warn;

/// Header carrying the owning pipeline on every produced record.
pub const PIPELINE_ID_HEADER: &str = "__pipeline_id";

pub(crate) const FIELD_PIPELINE_ID: &str = "__pipeline_id";
pub(crate) const FIELD_INDEX_BASE: &str = "__index_base";
pub(crate) const FIELD_DATA_TYPE: &str = "__data_type";
pub(crate) const FIELD_WRITE_TIME: &str = "__write_time";
pub(crate) const FIELD_TIMESTAMP: &str = "@timestamp";
pub(crate) const FIELD_CATEGORY: &str = "__category";
pub(crate) const FIELD_ID: &str = "__id";

/// Result of enriching one record.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub document_id: String,
    pub index_item: BulkIndexItem,
    /// Record forwarded once the document is indexed.
    pub outbound: OutboundRecord,
}

/// Stamps pipeline and index base metadata onto records.
#[derive(Debug, Clone)]
pub struct DocumentEnricher {
    pipeline_id: String,
    use_index_base_in_dataset: bool,
    output_topic: String,
    tenant: String,
    index_base: IndexBaseInfo,
}

impl DocumentEnricher {
    pub fn new(pipeline: &PipelineDefinition, index_base: IndexBaseInfo, tenant: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline.pipeline_id.clone(),
            use_index_base_in_dataset: pipeline.use_index_base_in_dataset,
            output_topic: pipeline.output_topic.clone(),
            tenant: tenant.into(),
            index_base,
        }
    }

    /// Enrich one record.
    ///
    /// The write time is the broker timestamp of the record, or the current
    /// time when the broker supplied none.
    pub fn enrich(&self, record: &InboundRecord) -> EnrichedRecord {
        let write_time = record
            .timestamp_ms
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        let (payload, mut doc) = parse_or_salvage(&record.payload);

        doc.insert(FIELD_PIPELINE_ID.to_string(), json!(self.pipeline_id));

        let base_type = match non_empty_str(&doc, FIELD_INDEX_BASE) {
            Some(base_type) => base_type,
            None => {
                doc.insert(FIELD_INDEX_BASE.to_string(), json!(self.index_base.base_type));
                self.index_base.base_type.clone()
            }
        };

        let (alias, output_topic) = if self.use_index_base_in_dataset {
            (
                index_alias(&base_type),
                output_topic_name(&self.tenant, &base_type),
            )
        } else {
            (index_alias(&self.index_base.base_type), self.output_topic.clone())
        };

        if non_empty_str(&doc, FIELD_DATA_TYPE).is_none() {
            doc.insert(FIELD_DATA_TYPE.to_string(), json!(self.index_base.data_type));
        }

        doc.insert(FIELD_WRITE_TIME.to_string(), json!(write_time));
        timestamp::normalize(&mut doc, write_time);

        let category = self.resolve_category(&mut doc);
        let routing = category::enrich(Category::parse(&category), &mut doc);

        let document_id = match non_empty_str(&doc, FIELD_ID) {
            Some(id) => id,
            None => {
                let id = format!(
                    "{}[{}]@{}-{}",
                    base_type, record.partition, record.offset, write_time
                );
                doc.insert(FIELD_ID.to_string(), json!(id));
                id
            }
        };

        let body = Value::Object(doc).to_string();
        let index_item = BulkIndexItem::new(alias, document_id.clone(), body).with_routing(routing);
        let outbound = OutboundRecord::new(output_topic, record.key.clone(), payload)
            .with_header(PIPELINE_ID_HEADER, self.pipeline_id.as_bytes());

        EnrichedRecord {
            document_id,
            index_item,
            outbound,
        }
    }

    /// `__category` from the record, then `category`, then the index base.
    fn resolve_category(&self, doc: &mut Map<String, Value>) -> String {
        if let Some(category) = non_empty_str(doc, FIELD_CATEGORY) {
            return category;
        }

        let category = match non_empty_str(doc, "category") {
            Some(category) => {
                if !self.index_base.category.is_empty() && category != self.index_base.category {
                    warn!(
                        category = %category,
                        index_base = %self.index_base.name,
                        index_base_category = %self.index_base.category,
                        "Record category does not match index base"
                    );
                }
                category
            }
            None => self.index_base.category.clone(),
        };

        doc.insert(FIELD_CATEGORY.to_string(), json!(category));
        category
    }
}

/// Parse a payload as a JSON object, wrapping anything else as `{"message": ...}`.
///
/// Returns the bytes to forward together with the parsed document.
fn parse_or_salvage(payload: &[u8]) -> (Vec<u8>, Map<String, Value>) {
    if let Ok(Value::Object(doc)) = serde_json::from_slice::<Value>(payload) {
        return (payload.to_vec(), doc);
    }

    let mut doc = Map::new();
    doc.insert(
        "message".to_string(),
        json!(String::from_utf8_lossy(payload)),
    );
    let salvaged = Value::Object(doc.clone()).to_string().into_bytes();
    (salvaged, doc)
}

fn non_empty_str(doc: &Map<String, Value>, field: &str) -> Option<String> {
    doc.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

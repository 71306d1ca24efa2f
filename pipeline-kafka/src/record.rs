//! Broker-independent record types.

use std::collections::BTreeMap;

/// A record consumed from an input topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Broker timestamp in epoch milliseconds, if the broker supplied one.
    pub timestamp_ms: Option<i64>,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

impl InboundRecord {
    /// Size counted against the flush byte threshold.
    pub fn byte_size(&self) -> usize {
        self.payload.len()
    }
}

/// A record to be written inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub headers: Vec<(String, Vec<u8>)>,
}

impl OutboundRecord {
    pub fn new(topic: impl Into<String>, key: Option<Vec<u8>>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            key,
            payload,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Same record sent to another topic.
    pub fn redirect(&self, topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..self.clone()
        }
    }

    pub fn header(&self, key: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }
}

/// Offset to commit for one topic partition: the next offset to consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOffset {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Commit offsets covering every record in `records`.
///
/// One entry per topic partition holding the highest consumed offset plus one.
pub fn next_offsets(records: &[InboundRecord]) -> Vec<SourceOffset> {
    let mut highest: BTreeMap<(&str, i32), i64> = BTreeMap::new();
    for record in records {
        let entry = highest
            .entry((record.topic.as_str(), record.partition))
            .or_insert(record.offset);
        if record.offset > *entry {
            *entry = record.offset;
        }
    }

    highest
        .into_iter()
        .map(|((topic, partition), offset)| SourceOffset {
            topic: topic.to_string(),
            partition,
            offset: offset + 1,
        })
        .collect()
}

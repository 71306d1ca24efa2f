//! Records buffered between two flushes.

use pipeline_kafka::InboundRecord;

/// Records consumed since the last flush.
#[derive(Debug, Default)]
pub struct Batch {
    records: Vec<InboundRecord>,
    byte_size: usize,
}

impl Batch {
    pub fn push(&mut self, record: InboundRecord) {
        self.byte_size += record.byte_size();
        self.records.push(record);
    }

    /// True once either threshold is met.
    pub fn is_full(&self, flush_bytes: usize, flush_items: usize) -> bool {
        self.byte_size >= flush_bytes || self.records.len() >= flush_items
    }

    /// Hand over the buffered records and start an empty batch.
    pub fn take(&mut self) -> Vec<InboundRecord> {
        self.byte_size = 0;
        std::mem::take(&mut self.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size
    }
}

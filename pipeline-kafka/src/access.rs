//! Broker access traits.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::ConsumerGroupMetadata;

use crate::error::KafkaAccessError;
use crate::record::{InboundRecord, OutboundRecord, SourceOffset};

/// Factory for consumers and transactional producers.
pub trait MqAccess: Send + Sync {
    /// Create a consumer in the given consumer group. Offsets are never
    /// committed automatically.
    fn new_consumer(&self, group_id: &str) -> Result<Box<dyn RecordConsumer>, KafkaAccessError>;

    /// Create a producer bound to `transactional_id`. Call
    /// [`TransactionalProducer::init_transactions`] before the first transaction.
    fn new_transactional_producer(
        &self,
        transactional_id: &str,
    ) -> Result<Box<dyn TransactionalProducer>, KafkaAccessError>;
}

/// A consumer reading records one at a time.
#[async_trait]
pub trait RecordConsumer: Send + Sync {
    fn subscribe(&self, topics: &[String]) -> Result<(), KafkaAccessError>;

    /// Wait up to `timeout` for the next record.
    ///
    /// Returns `Ok(None)` when no record arrived in time.
    async fn poll(&self, timeout: Duration) -> Result<Option<InboundRecord>, KafkaAccessError>;

    /// Group metadata needed to commit offsets inside a producer transaction.
    fn group_metadata(&self) -> Option<ConsumerGroupMetadata>;

    /// Leave the group and release the client without blocking the caller.
    fn close(self: Box<Self>);
}

/// A producer whose writes and consumer offset commits land atomically.
#[async_trait]
pub trait TransactionalProducer: Send + Sync {
    async fn init_transactions(&self) -> Result<(), KafkaAccessError>;

    /// Produce `records` and commit `offsets` for `consumer`'s group in one
    /// transaction. On any failure the transaction is aborted and nothing is
    /// visible to read-committed consumers.
    async fn produce_and_commit(
        &self,
        consumer: &dyn RecordConsumer,
        records: &[OutboundRecord],
        offsets: &[SourceOffset],
    ) -> Result<(), KafkaAccessError>;

    /// Flush outstanding messages with a bounded wait and release the client.
    async fn close(self: Box<Self>);
}

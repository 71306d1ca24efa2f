//! rdkafka implementation of the broker access traits.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::{
    consumer::{Consumer, ConsumerGroupMetadata, StreamConsumer},
    error::{KafkaError, RDKafkaErrorCode},
    message::{BorrowedMessage, Header, Message, OwnedHeaders},
    producer::{BaseProducer, BaseRecord, Producer},
    Offset, TopicPartitionList,
};
use tracing::{debug, info, warn};

use crate::access::{MqAccess, RecordConsumer, TransactionalProducer};
use crate::config::KafkaConfig;
use crate::error::KafkaAccessError;
use crate::record::{InboundRecord, OutboundRecord, SourceOffset};

/// Bound on the final flush when a producer is closed.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(3);

/// Wait between send attempts while the local producer queue is full.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(100);

/// Broker access backed by librdkafka.
#[derive(Debug, Clone)]
pub struct KafkaAccess {
    config: KafkaConfig,
}

impl KafkaAccess {
    pub fn new(config: KafkaConfig) -> Self {
        Self { config }
    }
}

impl MqAccess for KafkaAccess {
    fn new_consumer(&self, group_id: &str) -> Result<Box<dyn RecordConsumer>, KafkaAccessError> {
        let consumer = KafkaRecordConsumer::new(&self.config, group_id)?;
        Ok(Box::new(consumer))
    }

    fn new_transactional_producer(
        &self,
        transactional_id: &str,
    ) -> Result<Box<dyn TransactionalProducer>, KafkaAccessError> {
        let producer = KafkaTransactionalProducer::new(&self.config, transactional_id)?;
        Ok(Box::new(producer))
    }
}

/// Consumer reading committed records only, with manual offset management.
pub struct KafkaRecordConsumer {
    consumer: StreamConsumer,
    group_id: String,
}

impl KafkaRecordConsumer {
    pub fn new(config: &KafkaConfig, group_id: &str) -> Result<Self, KafkaAccessError> {
        let consumer: StreamConsumer = config
            .client_config()
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("isolation.level", "read_committed")
            .set("session.timeout.ms", "6000")
            .create()
            .map_err(|e| KafkaAccessError::client(e.to_string()))?;

        info!(
            brokers = %config.broker,
            group_id = %group_id,
            "Created Kafka consumer"
        );

        Ok(Self {
            consumer,
            group_id: group_id.to_string(),
        })
    }
}

fn inbound_from(msg: &BorrowedMessage<'_>) -> InboundRecord {
    InboundRecord {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        timestamp_ms: msg.timestamp().to_millis(),
        key: msg.key().map(<[u8]>::to_vec),
        payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
    }
}

#[async_trait]
impl RecordConsumer for KafkaRecordConsumer {
    fn subscribe(&self, topics: &[String]) -> Result<(), KafkaAccessError> {
        let topics: Vec<&str> = topics.iter().map(|s| s.as_str()).collect();
        self.consumer
            .subscribe(&topics)
            .map_err(|e| KafkaAccessError::subscribe(e.to_string()))?;

        info!(topics = ?topics, group_id = %self.group_id, "Subscribed to Kafka topics");
        Ok(())
    }

    async fn poll(&self, timeout: Duration) -> Result<Option<InboundRecord>, KafkaAccessError> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(Ok(msg)) => {
                debug!(
                    topic = %msg.topic(),
                    partition = msg.partition(),
                    offset = msg.offset(),
                    "Received message from Kafka"
                );
                Ok(Some(inbound_from(&msg)))
            }
            Ok(Err(e)) => Err(KafkaAccessError::poll(e.to_string())),
        }
    }

    fn group_metadata(&self) -> Option<ConsumerGroupMetadata> {
        self.consumer.group_metadata()
    }

    fn close(self: Box<Self>) {
        let Self { consumer, group_id } = *self;
        // Leaving the group can block on a rebalance
        tokio::task::spawn_blocking(move || {
            consumer.unsubscribe();
            drop(consumer);
            debug!(group_id = %group_id, "Kafka consumer closed");
        });
    }
}

/// Transactional producer committing consumer offsets with its writes.
pub struct KafkaTransactionalProducer {
    producer: BaseProducer,
    transactional_id: String,
    timeout: Duration,
}

impl KafkaTransactionalProducer {
    pub fn new(config: &KafkaConfig, transactional_id: &str) -> Result<Self, KafkaAccessError> {
        let producer: BaseProducer = config
            .client_config()
            .set("transactional.id", transactional_id)
            .set("enable.idempotence", "true")
            .set(
                "transaction.timeout.ms",
                config.transaction_timeout.as_millis().to_string(),
            )
            .set("compression.type", "zstd")
            .create()
            .map_err(|e| KafkaAccessError::client(e.to_string()))?;

        info!(
            brokers = %config.broker,
            transactional_id = %transactional_id,
            "Created transactional Kafka producer"
        );

        Ok(Self {
            producer,
            transactional_id: transactional_id.to_string(),
            timeout: config.transaction_timeout,
        })
    }

    fn run_transaction(
        &self,
        metadata: &ConsumerGroupMetadata,
        records: &[OutboundRecord],
        offsets: &[SourceOffset],
    ) -> Result<(), KafkaAccessError> {
        self.producer
            .begin_transaction()
            .map_err(|e| KafkaAccessError::transaction(e.to_string()))?;

        match self.send_and_commit(metadata, records, offsets) {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Err(abort_err) = self.producer.abort_transaction(self.timeout) {
                    warn!(
                        transactional_id = %self.transactional_id,
                        error = %abort_err,
                        "Failed to abort transaction"
                    );
                }
                Err(e)
            }
        }
    }

    fn send_and_commit(
        &self,
        metadata: &ConsumerGroupMetadata,
        records: &[OutboundRecord],
        offsets: &[SourceOffset],
    ) -> Result<(), KafkaAccessError> {
        for record in records {
            self.send(record)?;
        }

        let mut tpl = TopicPartitionList::new();
        for offset in offsets {
            tpl.add_partition_offset(&offset.topic, offset.partition, Offset::Offset(offset.offset))
                .map_err(|e| KafkaAccessError::commit(e.to_string()))?;
        }

        self.producer
            .send_offsets_to_transaction(&tpl, metadata, self.timeout)
            .map_err(|e| KafkaAccessError::commit(e.to_string()))?;

        self.producer
            .commit_transaction(self.timeout)
            .map_err(|e| KafkaAccessError::transaction(e.to_string()))
    }

    fn send(&self, record: &OutboundRecord) -> Result<(), KafkaAccessError> {
        loop {
            let mut headers = OwnedHeaders::new();
            for (key, value) in &record.headers {
                headers = headers.insert(Header {
                    key,
                    value: Some(value.as_slice()),
                });
            }

            let mut base = BaseRecord::<[u8], [u8]>::to(&record.topic)
                .payload(record.payload.as_slice())
                .headers(headers);
            if let Some(key) = &record.key {
                base = base.key(key.as_slice());
            }

            match self.producer.send(base) {
                Ok(()) => return Ok(()),
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), _)) => {
                    self.producer.poll(QUEUE_FULL_BACKOFF);
                }
                Err((e, _)) => return Err(KafkaAccessError::produce(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl TransactionalProducer for KafkaTransactionalProducer {
    async fn init_transactions(&self) -> Result<(), KafkaAccessError> {
        tokio::task::block_in_place(|| self.producer.init_transactions(self.timeout))
            .map_err(|e| KafkaAccessError::transaction(e.to_string()))?;

        info!(transactional_id = %self.transactional_id, "Initialized Kafka transactions");
        Ok(())
    }

    async fn produce_and_commit(
        &self,
        consumer: &dyn RecordConsumer,
        records: &[OutboundRecord],
        offsets: &[SourceOffset],
    ) -> Result<(), KafkaAccessError> {
        let metadata = consumer
            .group_metadata()
            .ok_or_else(|| KafkaAccessError::commit("consumer has no group metadata"))?;

        tokio::task::block_in_place(|| self.run_transaction(&metadata, records, offsets))?;

        debug!(
            transactional_id = %self.transactional_id,
            record_count = records.len(),
            partition_count = offsets.len(),
            "Committed transaction"
        );
        Ok(())
    }

    async fn close(self: Box<Self>) {
        let result = tokio::task::block_in_place(|| self.producer.flush(CLOSE_FLUSH_TIMEOUT));
        if let Err(e) = result {
            warn!(
                transactional_id = %self.transactional_id,
                unflushed = self.producer.in_flight_count(),
                error = %e,
                "Kafka producer closed with unflushed events"
            );
        } else {
            info!(transactional_id = %self.transactional_id, "Kafka producer closed");
        }
    }
}

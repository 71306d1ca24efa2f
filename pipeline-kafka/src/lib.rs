//! Kafka access for the pipeline worker.
//!
//! Wraps rdkafka behind the [`MqAccess`], [`RecordConsumer`] and
//! [`TransactionalProducer`] traits so the ingestion loop can be driven by
//! in-memory implementations in tests.
//!
//! ## Usage
//!
//! ```ignore
//! use pipeline_kafka::{KafkaAccess, KafkaConfig, MqAccess};
//!
//! let access = KafkaAccess::new(KafkaConfig::from_env());
//! let consumer = access.new_consumer("default.sdp.p1")?;
//! consumer.subscribe(&["default.sdp.p1.input".to_string()])?;
//! let producer = access.new_transactional_producer("p1_default.sdp.p1.input")?;
//! producer.init_transactions().await?;
//! ```

mod access;
mod config;
mod error;
mod kafka;
mod record;

pub use access::{MqAccess, RecordConsumer, TransactionalProducer};
pub use config::KafkaConfig;
pub use error::KafkaAccessError;
pub use kafka::{KafkaAccess, KafkaRecordConsumer, KafkaTransactionalProducer};
pub use rdkafka::consumer::ConsumerGroupMetadata;
pub use record::{next_offsets, InboundRecord, OutboundRecord, SourceOffset};

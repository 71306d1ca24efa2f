//! # Pipeline Worker
//!
//! Runs the ingestion task of one stream data pipeline: records are consumed
//! from the pipeline's input topic, enriched, written to OpenSearch in bulk and
//! forwarded to the output topic (or the error topic when indexing fails),
//! with consumer offsets committed in the same Kafka transaction.
//!
//! ## Architecture
//!
//! 1. **Enricher**: Turns a raw record into an index write and an outbound record
//! 2. **Task**: The consume / batch / flush loop of one pipeline
//! 3. **Worker**: Binds a pipeline definition to its running tasks
//! 4. **Service**: Lifecycle controller reacting to configuration changes,
//!    recovering after restarts and handling task failures
//!
//! ## Modules
//!
//! - [`config`]: Settings and dependency wiring
//! - [`enricher`]: Record enrichment
//! - [`task`]: Ingestion task
//! - [`worker`]: Task aggregate
//! - [`service`]: Lifecycle controller
//! - [`retry`]: Bounded retry policy
//! - [`errors`]: Error types

pub mod config;
pub mod enricher;
pub mod errors;
pub mod retry;
pub mod service;
pub mod task;
pub mod worker;

pub use config::{Dependencies, TaskSettings, WorkerSettings};
pub use enricher::{DocumentEnricher, EnrichedRecord};
pub use errors::{ControllerError, IngestError};
pub use retry::RetryPolicy;
pub use service::{ServiceDependencies, WorkerService};
pub use task::{IngestionTask, TaskControl, TaskStatus};
pub use worker::{Worker, WorkerError};

use pipeline_worker_repository::SearchIndexError;
use thiserror::Error;

/// Errors that can occur during worker startup.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Search index setup error.
    #[error("Search index error: {0}")]
    SearchIndexError(#[from] SearchIndexError),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

//! Error types for the pipeline worker.

use pipeline_kafka::KafkaAccessError;
use pipeline_worker_repository::AccessError;
use pipeline_worker_shared::PipelineStatus;
use thiserror::Error;

/// Errors that end an ingestion task.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Consumer or producer setup failed.
    #[error("Kafka error: {0}")]
    KafkaError(String),

    /// Polling kept failing until the failure threshold was reached.
    #[error("Poll failed after {attempts} attempt(s): {message}")]
    PollExhausted { attempts: usize, message: String },

    /// An enrichment job could not be joined.
    #[error("Enrich error: {0}")]
    EnrichError(String),

    /// Producing to the output or error topic failed.
    #[error("Output error: {0}")]
    OutputError(String),
}

impl IngestError {
    /// Create a Kafka error.
    pub fn kafka(msg: impl Into<String>) -> Self {
        Self::KafkaError(msg.into())
    }

    pub fn poll_exhausted(attempts: usize, msg: impl Into<String>) -> Self {
        Self::PollExhausted {
            attempts,
            message: msg.into(),
        }
    }

    pub fn enrich(msg: impl Into<String>) -> Self {
        Self::EnrichError(msg.into())
    }

    pub fn output(msg: impl Into<String>) -> Self {
        Self::OutputError(msg.into())
    }
}

impl From<KafkaAccessError> for IngestError {
    fn from(err: KafkaAccessError) -> Self {
        Self::KafkaError(err.to_string())
    }
}

/// Errors from lifecycle transitions.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Failed to resolve index base '{base_type}': {message}")]
    IndexBaseUnresolved { base_type: String, message: String },

    /// Only a running pipeline can be paused.
    #[error("Pipeline '{pipeline_id}' is {status}, cannot pause")]
    PauseNotRunning {
        pipeline_id: String,
        status: PipelineStatus,
    },

    #[error("Failed to persist status of pipeline '{pipeline_id}': {message}")]
    StatusPersist {
        pipeline_id: String,
        message: String,
    },

    #[error("Configuration store error: {0}")]
    Access(#[from] AccessError),
}

impl ControllerError {
    pub fn index_base_unresolved(base_type: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::IndexBaseUnresolved {
            base_type: base_type.into(),
            message: msg.into(),
        }
    }

    pub fn pause_not_running(pipeline_id: impl Into<String>, status: PipelineStatus) -> Self {
        Self::PauseNotRunning {
            pipeline_id: pipeline_id.into(),
            status,
        }
    }

    pub fn status_persist(pipeline_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::StatusPersist {
            pipeline_id: pipeline_id.into(),
            message: msg.into(),
        }
    }
}

//! Pipeline definition as stored by the pipeline management service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Run-state of a pipeline.
///
/// `Closing` only exists in memory while a pause is in progress; the store
/// never reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Running,
    Closing,
    Close,
    Error,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Closing => "closing",
            Self::Close => "close",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline configuration owned by the external configuration store.
///
/// The worker holds a cached copy and only mutates it through explicit
/// status updates that are written back to the store first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub pipeline_id: String,
    pub pipeline_name: String,
    /// Base type of the target index family. Empty for pipelines that do not
    /// write to a fixed index base.
    #[serde(default)]
    pub index_base: String,
    /// When set, each record's own `__index_base` selects its index alias and
    /// output topic.
    #[serde(default, rename = "use_index_base_in_data")]
    pub use_index_base_in_dataset: bool,
    pub input_topic: String,
    pub output_topic: String,
    pub error_topic: String,
    #[serde(rename = "pipeline_status")]
    pub status: PipelineStatus,
    #[serde(default, rename = "pipeline_status_details")]
    pub status_details: String,
}

impl fmt::Display for PipelineDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{pipeline_id = {}, pipeline_name = {}, index_base = {}, input_topic = {}, \
             output_topic = {}, error_topic = {}, status = {}}}",
            self.pipeline_id,
            self.pipeline_name,
            self.index_base,
            self.input_topic,
            self.output_topic,
            self.error_topic,
            self.status
        )
    }
}

/// Body of a status update sent to the configuration store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStatusInfo {
    pub status: PipelineStatus,
    #[serde(default)]
    pub details: String,
}

impl PipelineStatusInfo {
    /// Details are only kept for the `Error` status.
    pub fn new(status: PipelineStatus, details: impl Into<String>) -> Self {
        let details = match status {
            PipelineStatus::Error => details.into(),
            _ => String::new(),
        };
        Self { status, details }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&PipelineStatus::Running).unwrap(),
            "\"running\""
        );
        let status: PipelineStatus = serde_json::from_str("\"close\"").unwrap();
        assert_eq!(status, PipelineStatus::Close);
    }

    #[test]
    fn test_definition_deserialize_defaults() {
        let json = r#"{
            "pipeline_id": "p1",
            "pipeline_name": "first",
            "input_topic": "default.sdp.p1.input",
            "output_topic": "default.mdl.process.svc",
            "error_topic": "default.sdp.p1.error",
            "pipeline_status": "running"
        }"#;
        let def: PipelineDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.pipeline_id, "p1");
        assert!(def.index_base.is_empty());
        assert!(!def.use_index_base_in_dataset);
        assert_eq!(def.status, PipelineStatus::Running);
        assert!(def.status_details.is_empty());
    }

    #[test]
    fn test_status_info_drops_details_unless_error() {
        let info = PipelineStatusInfo::new(PipelineStatus::Running, "ignored");
        assert!(info.details.is_empty());

        let info = PipelineStatusInfo::new(PipelineStatus::Error, "poll failed");
        assert_eq!(info.details, "poll failed");
    }
}

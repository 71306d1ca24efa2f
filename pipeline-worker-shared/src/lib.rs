//! # Pipeline Worker Shared
//!
//! Data structures shared by the pipeline worker crates: the pipeline
//! definition owned by the configuration store, the index base metadata
//! resolved for a worker, and the naming rules for topics and consumer groups.

pub mod naming;
pub mod types;

pub use types::index_base::{Category, IndexBaseInfo};
pub use types::pipeline::{PipelineDefinition, PipelineStatus, PipelineStatusInfo};

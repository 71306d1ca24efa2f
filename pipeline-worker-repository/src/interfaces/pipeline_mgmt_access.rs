use async_trait::async_trait;
use pipeline_worker_shared::{PipelineDefinition, PipelineStatusInfo};

use crate::errors::AccessError;

/// Access to the pipeline configuration store.
#[async_trait]
pub trait PipelineMgmtAccess: Send + Sync {
    /// Fetch a pipeline definition.
    ///
    /// With `listen` set the store may hold the request until the definition
    /// changes; reconciliation reads pass false to get an immediate answer.
    ///
    /// Returns `Ok(None)` when the pipeline does not exist.
    async fn get_config(
        &self,
        pipeline_id: &str,
        listen: bool,
    ) -> Result<Option<PipelineDefinition>, AccessError>;

    /// Persist a pipeline's run-state.
    async fn update_status(
        &self,
        pipeline_id: &str,
        status: &PipelineStatusInfo,
    ) -> Result<(), AccessError>;
}

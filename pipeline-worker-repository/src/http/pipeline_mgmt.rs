use async_trait::async_trait;
use pipeline_worker_shared::{PipelineDefinition, PipelineStatusInfo};
use reqwest::{Client as ReqwestClient, StatusCode};
use tracing::debug;

use crate::errors::AccessError;
use crate::http::{ensure_success, join_url};
use crate::interfaces::PipelineMgmtAccess;

const PIPELINES_PATH: &str = "/api/flow-stream-data-pipeline/in/v1/pipelines";

/// Client for the pipeline management service.
///
/// # Example
///
/// ```ignore
/// let client = PipelineMgmtClient::new("http://localhost:13011");
/// if let Some(pipeline) = client.get_config("p1", false).await? {
///     println!("{}", pipeline);
/// }
/// ```
pub struct PipelineMgmtClient {
    url: String,
    client: ReqwestClient,
}

impl PipelineMgmtClient {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: ReqwestClient::new(),
        }
    }

    fn pipeline_url(&self, pipeline_id: &str) -> String {
        join_url(&self.url, &format!("{}/{}", PIPELINES_PATH, pipeline_id))
    }
}

#[async_trait]
impl PipelineMgmtAccess for PipelineMgmtClient {
    async fn get_config(
        &self,
        pipeline_id: &str,
        listen: bool,
    ) -> Result<Option<PipelineDefinition>, AccessError> {
        let response = self
            .client
            .get(self.pipeline_url(pipeline_id))
            .query(&[("is_listen", listen.to_string())])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(pipeline_id = %pipeline_id, "Pipeline not found");
            return Ok(None);
        }

        let response = ensure_success(response).await?;
        let pipeline = response
            .json::<PipelineDefinition>()
            .await
            .map_err(|e| AccessError::decode(e.to_string()))?;
        Ok(Some(pipeline))
    }

    async fn update_status(
        &self,
        pipeline_id: &str,
        status: &PipelineStatusInfo,
    ) -> Result<(), AccessError> {
        let url = format!("{}/status", self.pipeline_url(pipeline_id));
        let response = self
            .client
            .put(url)
            .query(&[("is_inner_request", "true")])
            .json(status)
            .send()
            .await?;

        ensure_success(response).await?;
        debug!(pipeline_id = %pipeline_id, status = %status.status, "Persisted pipeline status");
        Ok(())
    }
}

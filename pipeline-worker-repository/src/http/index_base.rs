use async_trait::async_trait;
use pipeline_worker_shared::IndexBaseInfo;
use reqwest::Client as ReqwestClient;

use crate::errors::AccessError;
use crate::http::{ensure_success, join_url};
use crate::interfaces::IndexBaseService;

const INDEX_BASES_PATH: &str = "/api/mdl-index-base/in/v1/index_bases";

/// Client for the index base metadata service.
pub struct IndexBaseClient {
    url: String,
    client: ReqwestClient,
}

impl IndexBaseClient {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: ReqwestClient::new(),
        }
    }
}

#[async_trait]
impl IndexBaseService for IndexBaseClient {
    async fn get_by_base_type(&self, base_type: &str) -> Result<IndexBaseInfo, AccessError> {
        let url = join_url(&self.url, &format!("{}/{}", INDEX_BASES_PATH, base_type));
        let response = ensure_success(self.client.get(url).send().await?).await?;

        response
            .json::<IndexBaseInfo>()
            .await
            .map_err(|e| AccessError::decode(e.to_string()))
    }
}

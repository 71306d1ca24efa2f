use async_trait::async_trait;
use pipeline_worker_shared::IndexBaseInfo;

use crate::errors::AccessError;

/// Lookup of index base metadata by base type.
#[async_trait]
pub trait IndexBaseService: Send + Sync {
    async fn get_by_base_type(&self, base_type: &str) -> Result<IndexBaseInfo, AccessError>;
}

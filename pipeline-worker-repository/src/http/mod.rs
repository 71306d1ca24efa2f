//! reqwest clients for the configuration store and index base service.

mod index_base;
mod pipeline_mgmt;

pub use index_base::IndexBaseClient;
pub use pipeline_mgmt::PipelineMgmtClient;

use reqwest::Response;

use crate::errors::AccessError;

/// Turn a non-success response into [`AccessError::Status`].
async fn ensure_success(response: Response) -> Result<Response, AccessError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AccessError::status(status.as_u16(), body))
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

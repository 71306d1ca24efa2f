//! OpenSearch provider implementation.

use opensearch::{
    auth::Credentials,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    OpenSearch,
};
use tracing::info;
use url::Url;

use crate::config::SearchIndexConfig;
use crate::errors::SearchIndexError;
use crate::interfaces::{BulkIndexer, SearchIndexProvider};
use crate::opensearch::bulk::OpenSearchBulkIndexer;

/// OpenSearch provider implementation.
///
/// Holds one client shared by every bulk indexer it creates.
///
/// # Example
///
/// ```ignore
/// let provider = OpenSearchProvider::new(&SearchIndexConfig::new("http://localhost:9200"))?;
/// let indexer = provider.new_bulk_indexer(5 * 1024 * 1024);
/// indexer.add(BulkIndexItem::new("mdl-svc-a", "doc-1", r#"{"a":1}"#))?;
/// indexer.flush().await?;
/// ```
pub struct OpenSearchProvider {
    client: OpenSearch,
}

impl OpenSearchProvider {
    /// Create a new OpenSearch provider connected to the configured URL.
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchProvider)` - A new provider instance
    /// * `Err(SearchIndexError)` - If connection setup fails
    pub fn new(config: &SearchIndexConfig) -> Result<Self, SearchIndexError> {
        let parsed_url =
            Url::parse(&config.url).map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let mut builder = TransportBuilder::new(conn_pool).disable_proxy();
        if let Some((username, password)) = config.credentials() {
            builder = builder.auth(Credentials::Basic(username.to_string(), password.to_string()));
        }
        let transport = builder
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        info!(url = %config.url, "Created OpenSearch provider");

        Ok(Self {
            client: OpenSearch::new(transport),
        })
    }
}

impl SearchIndexProvider for OpenSearchProvider {
    fn new_bulk_indexer(&self, max_bytes: usize) -> Box<dyn BulkIndexer> {
        Box::new(OpenSearchBulkIndexer::new(self.client.clone(), max_bytes))
    }
}

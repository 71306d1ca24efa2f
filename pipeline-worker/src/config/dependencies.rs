//! Dependency initialization and wiring for the pipeline worker.

use std::sync::Arc;

use pipeline_kafka::{KafkaAccess, KafkaConfig};
use pipeline_worker_repository::{
    IndexBaseClient, OpenSearchProvider, PipelineMgmtClient, SearchIndexConfig,
};
use tracing::info;

use crate::config::WorkerSettings;
use crate::service::{ServiceDependencies, WorkerService};
use crate::IndexingError;

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The lifecycle controller, ready to start.
    pub service: WorkerService,
}

impl Dependencies {
    /// Initialize all dependencies from environment variables.
    ///
    /// See [`WorkerSettings::from_env`], [`KafkaConfig::from_env`] and
    /// [`SearchIndexConfig::from_env`] for the variables read.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If a setting is missing or a client cannot be built
    pub fn new() -> Result<Self, IndexingError> {
        let settings = WorkerSettings::from_env()?;
        let kafka_config = KafkaConfig::from_env();
        let search_config = SearchIndexConfig::from_env();

        info!(
            pipeline_id = %settings.pipeline_id,
            tenant = %settings.task.tenant,
            kafka_broker = %kafka_config.broker,
            opensearch_url = %search_config.url,
            pipeline_mgmt_url = %settings.pipeline_mgmt_url,
            index_base_url = %settings.index_base_url,
            "Initializing dependencies"
        );

        let search = OpenSearchProvider::new(&search_config)?;
        info!("OpenSearch provider created");

        let deps = ServiceDependencies {
            pipeline_mgmt: Arc::new(PipelineMgmtClient::new(&settings.pipeline_mgmt_url)),
            index_bases: Arc::new(IndexBaseClient::new(&settings.index_base_url)),
            mq: Arc::new(KafkaAccess::new(kafka_config)),
            search: Arc::new(search),
        };

        Ok(Self {
            service: WorkerService::new(settings, deps),
        })
    }
}

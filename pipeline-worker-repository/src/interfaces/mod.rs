//! Interfaces for the external systems used by the pipeline worker.

mod index_base_service;
mod pipeline_mgmt_access;
mod search_index_provider;

pub use index_base_service::IndexBaseService;
pub use pipeline_mgmt_access::PipelineMgmtAccess;
pub use search_index_provider::{BulkIndexer, SearchIndexProvider};

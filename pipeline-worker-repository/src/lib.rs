//! # Pipeline Worker Repository
//!
//! Access to the external systems the pipeline worker depends on: the search
//! index (bulk writes through OpenSearch), the pipeline configuration store,
//! and the index base metadata service. Each is exposed as a trait so the
//! worker can be exercised against in-memory implementations.

pub mod config;
pub mod errors;
pub mod http;
pub mod interfaces;
pub mod opensearch;
pub mod types;

pub use config::SearchIndexConfig;
pub use errors::{AccessError, SearchIndexError};
pub use http::{IndexBaseClient, PipelineMgmtClient};
pub use interfaces::{BulkIndexer, IndexBaseService, PipelineMgmtAccess, SearchIndexProvider};
pub use opensearch::OpenSearchProvider;
pub use types::BulkIndexItem;

//! OpenSearch implementation of the search index interfaces.

mod bulk;
mod provider;

pub use bulk::{failed_ids_from_response, OpenSearchBulkIndexer};
pub use provider::OpenSearchProvider;

//! Error types for the pipeline worker repository.

mod access_error;
mod search_index_error;

pub use access_error::AccessError;
pub use search_index_error::SearchIndexError;

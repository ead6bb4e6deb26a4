//! Error types for the book indexer repository.

mod search_index_error;
mod storage_error;

pub use search_index_error::SearchIndexError;
pub use storage_error::StorageError;

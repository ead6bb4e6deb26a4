//! Interface definitions for the external collaborators.
//!
//! This module defines the abstract `SearchIndexProvider` and `ObjectStore`
//! traits that allow for dependency injection and swappable backends.

mod object_store;
mod search_index_provider;

pub use object_store::ObjectStore;
pub use search_index_provider::SearchIndexProvider;

//! Configuration and dependency wiring.

mod dependencies;
mod settings;

pub use dependencies::Dependencies;
pub use settings::{EmbeddingSettings, IndexerConfig, StorageSettings};

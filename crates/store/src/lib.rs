//! Conversation persistence backends for toolweave.

pub mod file;
pub mod in_memory;

pub use file::FileStore;
pub use in_memory::InMemoryStore;

use std::sync::Arc;
use toolweave_config::StorageConfig;
use toolweave_core::store::ConversationStore;
use tracing::info;

/// Build the configured backend.
pub fn build_from_config(config: &StorageConfig) -> Arc<dyn ConversationStore> {
    match config.backend.as_str() {
        "memory" => {
            info!("Using in-memory conversation store");
            Arc::new(InMemoryStore::new())
        }
        _ => {
            let dir = config.resolved_dir();
            info!(dir = %dir.display(), "Using file conversation store");
            Arc::new(FileStore::new(dir))
        }
    }
}

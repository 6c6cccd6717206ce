// Test Helpers Module - in-memory collaborators for unit and integration tests
//
// Available to this crate's unit tests and, through the `test-helpers`
// feature, to the integration tests under tests/.

pub mod dispatcher;
pub mod storage;

pub use dispatcher::RecordingDispatcher;
pub use storage::{CopyBehavior, InMemoryStorage};

use crate::config::PromoteConfig;
use crate::constants::actions;
use crate::dispatch::Dispatcher;
use crate::orchestration::PromotionContext;
use crate::status::InMemoryStatusStore;
use crate::storage::StorageApi;
use std::sync::Arc;

/// Configuration with small batches, no pauses and the post-copy stage chained
pub fn test_config() -> PromoteConfig {
    let mut config = PromoteConfig::default();
    config.promotion.batch_size = 2;
    config.promotion.bulk_request_size = 2;
    config.promotion.chunk_pause_ms = 0;
    config.promotion.settle_delay_ms = 0;
    config.promotion.primary_root = "/main".to_string();
    config.copy_poll.max_attempts = 3;
    config.copy_poll.initial_interval_ms = 0;
    config.copy_poll.max_interval_ms = 0;
    config.copy_poll.multiplier = 1.0;
    config.dispatch.actions.post_copy = Some(actions::POST_COPY.to_string());
    config
}

/// Context over `test_config()` and a fresh in-memory store, returned alongside
pub fn test_context(
    storage: Arc<dyn StorageApi>,
    dispatcher: Arc<dyn Dispatcher>,
) -> (PromotionContext, Arc<InMemoryStatusStore>) {
    let store = Arc::new(InMemoryStatusStore::new());
    let context = PromotionContext::new(
        Arc::new(test_config()),
        storage,
        dispatcher,
        store.clone(),
        store.clone(),
    );
    (context, store)
}

use crate::config::PromoteConfig;
use crate::dispatch::Dispatcher;
use crate::status::{BatchStore, StatusStore, StatusTracker};
use crate::storage::StorageApi;
use std::sync::Arc;

/// Collaborators and configuration for one stage invocation.
///
/// Built once by bootstrap and cloned into every stage; nothing in the
/// pipeline reads configuration or collaborators from anywhere else.
#[derive(Clone)]
pub struct PromotionContext {
    pub config: Arc<PromoteConfig>,
    pub storage: Arc<dyn StorageApi>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub status_store: Arc<dyn StatusStore>,
    pub batch_store: Arc<dyn BatchStore>,
}

impl PromotionContext {
    pub fn new(
        config: Arc<PromoteConfig>,
        storage: Arc<dyn StorageApi>,
        dispatcher: Arc<dyn Dispatcher>,
        status_store: Arc<dyn StatusStore>,
        batch_store: Arc<dyn BatchStore>,
    ) -> Self {
        Self {
            config,
            storage,
            dispatcher,
            status_store,
            batch_store,
        }
    }

    pub fn job_tracker(&self, root_folder: &str) -> StatusTracker {
        StatusTracker::for_job(Arc::clone(&self.status_store), root_folder)
    }

    pub fn batch_tracker(&self, root_folder: &str, batch_number: u32) -> StatusTracker {
        StatusTracker::for_batch(Arc::clone(&self.status_store), root_folder, batch_number)
    }
}

impl std::fmt::Debug for PromotionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromotionContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

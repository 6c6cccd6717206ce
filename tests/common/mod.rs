#![allow(dead_code)] // Each test binary uses a different subset

pub mod strategies;

use async_trait::async_trait;
use floodgate_core::config::{ConfigManager, PromoteConfig};
use floodgate_core::dispatch::ActionHandler;
use floodgate_core::orchestration::{ActionResponse, JobParams, PromotionSystem};
use floodgate_core::status::InMemoryStatusStore;
use floodgate_core::test_helpers::{test_config, InMemoryStorage};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

pub const ROOT: &str = "/fg-site";

/// Stand-in for the downstream stage chained after each batch's copy phase
#[derive(Default)]
pub struct PostCopyRecorder {
    calls: Mutex<Vec<Value>>,
}

impl PostCopyRecorder {
    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ActionHandler for PostCopyRecorder {
    async fn handle(&self, params: Value) -> ActionResponse {
        self.calls.lock().push(params);
        ActionResponse::ok(json!("post copy accepted"))
    }
}

/// A whole pipeline running in-process over in-memory collaborators
pub struct PipelineHarness {
    pub system: PromotionSystem,
    pub storage: Arc<InMemoryStorage>,
    pub store: Arc<InMemoryStatusStore>,
    pub post_copy: Arc<PostCopyRecorder>,
}

impl PipelineHarness {
    pub fn new(storage: InMemoryStorage) -> Self {
        Self::build(storage, test_config(), true)
    }

    /// No handler for the post-copy action, as when the downstream stage is not deployed
    pub fn without_post_copy(storage: InMemoryStorage) -> Self {
        Self::build(storage, test_config(), false)
    }

    /// No post-copy stage configured at all
    pub fn without_next_stage(storage: InMemoryStorage) -> Self {
        let mut config = test_config();
        config.dispatch.actions.post_copy = None;
        Self::build(storage, config, false)
    }

    fn build(storage: InMemoryStorage, config: PromoteConfig, register_post_copy: bool) -> Self {
        let manager = ConfigManager::from_config(config, "test").expect("test config is valid");
        let storage = Arc::new(storage);
        let store = Arc::new(InMemoryStatusStore::new());
        let system = PromotionSystem::with_local_dispatch(
            manager,
            storage.clone(),
            store.clone(),
            store.clone(),
        );

        let post_copy = Arc::new(PostCopyRecorder::default());
        if register_post_copy {
            let post_copy_action = system
                .context()
                .config
                .dispatch
                .actions
                .post_copy
                .clone()
                .expect("post-copy stage configured");
            system
                .local_dispatcher()
                .expect("local dispatch")
                .registry()
                .register(post_copy_action, post_copy.clone());
        }

        Self {
            system,
            storage,
            store,
            post_copy,
        }
    }

    /// Start a job under `ROOT` and wait for every stage it fans out to
    pub async fn run_job(&self) -> ActionResponse {
        let response = self.system.start_job(job_params()).await;
        self.system.wait_for_idle().await;
        response
    }
}

pub fn job_params() -> JobParams {
    JobParams::new(ROOT, "https://example.com/tools/floodgate", "/projects/site.xlsx")
}

/// Storage holding `relative_paths` under `ROOT`
pub fn staging_tree(relative_paths: &[&str]) -> InMemoryStorage {
    relative_paths
        .iter()
        .fold(InMemoryStorage::new(), |storage, path| {
            storage.with_file(&staged(path))
        })
}

/// Full staging path of a path relative to `ROOT`
pub fn staged(relative_path: &str) -> String {
    format!("{ROOT}{relative_path}")
}

//! Action handlers binding each pipeline stage to its configured action name.

use super::context::PromotionContext;
use super::orchestrator::PromotionOrchestrator;
use super::promotion_executor::BatchPromotionExecutor;
use super::types::{ActionResponse, BatchParams, JobParams};
use crate::dispatch::{ActionHandler, ActionRegistry};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::error;

fn parse_params<T: DeserializeOwned>(action: &str, params: Value) -> Result<T, ActionResponse> {
    serde_json::from_value(params).map_err(|e| {
        error!(action = action, error = %e, "Invalid action parameters");
        ActionResponse::error(400, format!("Invalid parameters for {action}: {e}"))
    })
}

/// `promote`: job start
pub struct PromoteJobAction {
    orchestrator: PromotionOrchestrator,
}

impl PromoteJobAction {
    pub fn new(context: PromotionContext) -> Self {
        Self {
            orchestrator: PromotionOrchestrator::new(context),
        }
    }
}

#[async_trait]
impl ActionHandler for PromoteJobAction {
    async fn handle(&self, params: Value) -> ActionResponse {
        match parse_params::<JobParams>("promote", params) {
            Ok(params) => self.orchestrator.start_job(params).await,
            Err(response) => response,
        }
    }
}

/// `promote-create-batch`: enumeration, partitioning and worker dispatch
pub struct CreateBatchAction {
    orchestrator: PromotionOrchestrator,
}

impl CreateBatchAction {
    pub fn new(context: PromotionContext) -> Self {
        Self {
            orchestrator: PromotionOrchestrator::new(context),
        }
    }
}

#[async_trait]
impl ActionHandler for CreateBatchAction {
    async fn handle(&self, params: Value) -> ActionResponse {
        match parse_params::<JobParams>("promote-create-batch", params) {
            Ok(params) => self.orchestrator.create_batches(params).await,
            Err(response) => response,
        }
    }
}

/// `promote-worker`: one batch
pub struct PromoteWorkerAction {
    executor: BatchPromotionExecutor,
}

impl PromoteWorkerAction {
    pub fn new(context: PromotionContext) -> Self {
        Self {
            executor: BatchPromotionExecutor::new(context),
        }
    }
}

#[async_trait]
impl ActionHandler for PromoteWorkerAction {
    async fn handle(&self, params: Value) -> ActionResponse {
        match parse_params::<BatchParams>("promote-worker", params) {
            Ok(params) => self.executor.execute(params).await,
            Err(response) => response,
        }
    }
}

/// Register the promotion stages under the names in `context.config.dispatch.actions`.
///
/// The post-copy stage belongs to a downstream pipeline and is registered by
/// whoever hosts it.
pub fn register_pipeline_actions(registry: &ActionRegistry, context: &PromotionContext) {
    let names = &context.config.dispatch.actions;
    registry.register(
        names.promote.clone(),
        Arc::new(PromoteJobAction::new(context.clone())),
    );
    registry.register(
        names.create_batch.clone(),
        Arc::new(CreateBatchAction::new(context.clone())),
    );
    registry.register(
        names.promote_worker.clone(),
        Arc::new(PromoteWorkerAction::new(context.clone())),
    );
}

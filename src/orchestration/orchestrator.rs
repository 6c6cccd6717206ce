//! # Promotion Orchestrator
//!
//! The two job-level stages that precede the batch workers:
//!
//! 1. **start** (`promote`): resets the job record, writes `STARTED`, and
//!    dispatches batch creation
//! 2. **create batches** (`promote-create-batch`): enumerates the staging tree,
//!    partitions the files and dispatches one worker per batch
//!
//! Both return as soon as their dispatches are acknowledged. Everything after
//! that is visible only through the status store.

use super::context::PromotionContext;
use super::enumerator::FileTreeEnumerator;
use super::partitioner::{BatchDispatch, BatchDispatcher};
use super::types::{ActionResponse, JobParams};
use crate::constants::messages;
use crate::dispatch::dispatch_with_status;
use crate::error::{PromoteError, Result};
use crate::state_machine::{JobStatus, PipelineStage};
use crate::status::{StatusTracker, StatusUpdate};
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

pub struct PromotionOrchestrator {
    context: PromotionContext,
}

impl PromotionOrchestrator {
    pub fn new(context: PromotionContext) -> Self {
        Self { context }
    }

    /// Job entry point: `{code: 200|500, payload}`, or 400 on missing parameters
    #[instrument(skip(self, params), fields(root_folder = %params.root_folder))]
    pub async fn start_job(&self, params: JobParams) -> ActionResponse {
        let params = params.normalized();
        if let Err(e) = params.validate() {
            warn!(error = %e, "Rejected promote request");
            return ActionResponse::error(400, e.to_string());
        }
        let tracker = self.context.job_tracker(&params.root_folder);

        match self.trigger_batch_creation(&params, &tracker).await {
            Ok((code, record)) => ActionResponse::Status {
                code,
                payload: record,
            },
            Err(e) => {
                error!(error = %e, "Failed to start promotion job");
                ActionResponse::error(500, e.to_string())
            }
        }
    }

    async fn trigger_batch_creation(
        &self,
        params: &JobParams,
        tracker: &StatusTracker,
    ) -> Result<(u16, Value)> {
        tracker.clear().await?;
        tracker
            .update(StatusUpdate::status_message(
                JobStatus::Started,
                messages::TRIGGERING_PROMOTE,
            ))
            .await?;

        let outcome = dispatch_with_status(
            self.context.dispatcher.as_ref(),
            &self.context.config.dispatch.actions.create_batch,
            serde_json::to_value(params)?,
            tracker,
            "batch creation",
            |handle| StatusUpdate::with_status(JobStatus::InProgress).dispatch_handle(handle.clone()),
        )
        .await;

        let code = if outcome.is_dispatched() { 200 } else { 500 };
        let record = match outcome.record {
            Some(record) => serde_json::to_value(record)?,
            None => json!({ "error": outcome.error }),
        };
        Ok((code, record))
    }

    /// Batch-creation stage; always answers with a body payload
    #[instrument(skip(self, params), fields(root_folder = %params.root_folder))]
    pub async fn create_batches(&self, params: JobParams) -> ActionResponse {
        let params = params.normalized();
        if !params.has_root_folder() {
            let message = PromoteError::missing_parameters(["root_folder"]).to_string();
            error!(message = %message, "Batch creation has no status key");
            return ActionResponse::body(json!(message));
        }
        let tracker = self.context.job_tracker(&params.root_folder);

        if let Err(e) = params.validate() {
            let message = e.to_string();
            error!(message = %message, "Batch creation parameters are incomplete");
            self.record(&tracker, StatusUpdate::status_message(JobStatus::Failed, &message))
                .await;
            return ActionResponse::body(json!(message));
        }

        match self.enumerate_and_dispatch(&params, &tracker).await {
            Ok(payload) => ActionResponse::body(payload),
            Err(e @ PromoteError::Enumeration { .. }) => {
                let message = e.to_string();
                error!(error = %message, "Enumeration failed, nothing was dispatched");
                self.record(
                    &tracker,
                    StatusUpdate::status_message(JobStatus::Failed, &message)
                        .detail(PipelineStage::CreateBatch, JobStatus::Failed),
                )
                .await;
                ActionResponse::body(json!(message))
            }
            Err(e) => {
                let message = e.to_string();
                error!(error = %message, "Batch creation aborted");
                self.record(
                    &tracker,
                    StatusUpdate::status_message(JobStatus::CompletedWithError, &message),
                )
                .await;
                ActionResponse::body(json!(message))
            }
        }
    }

    async fn enumerate_and_dispatch(
        &self,
        params: &JobParams,
        tracker: &StatusTracker,
    ) -> Result<Value> {
        let config = &self.context.config;
        tracker
            .update(
                StatusUpdate::status_message(JobStatus::InProgress, messages::GETTING_FILES)
                    .detail(PipelineStage::CreateBatch, JobStatus::InProgress),
            )
            .await?;

        let files = FileTreeEnumerator::new(
            std::sync::Arc::clone(&self.context.storage),
            config.enumeration.page_size,
        )
        .enumerate(&params.root_folder)
        .await?;
        let file_count = files.len();

        if file_count == 0 {
            tracker
                .update(
                    StatusUpdate::status_message(JobStatus::Completed, "No files to promote")
                        .detail(PipelineStage::CreateBatch, JobStatus::Completed)
                        .total_batches(0),
                )
                .await?;
            return Ok(json!({ "code": 200, "payload": [] }));
        }

        let dispatches = BatchDispatcher::new(self.context.clone())
            .dispatch(params, files, config.promotion.batch_size)
            .await;
        let dispatched = dispatches.iter().filter(|d| d.is_dispatched()).count();
        let total = dispatches.len();

        info!(
            files = file_count,
            total_batches = total,
            dispatched = dispatched,
            "Created promotion batches"
        );
        let update = if dispatched == total {
            StatusUpdate::new()
                .message(format!(
                    "Dispatched {dispatched} of {total} batches for {file_count} files"
                ))
                .detail(PipelineStage::CreateBatch, JobStatus::Completed)
        } else {
            // The failed batch's message stays on the record
            StatusUpdate::new().detail(PipelineStage::CreateBatch, JobStatus::Failed)
        };
        tracker.update(update.total_batches(total as u32)).await?;

        Ok(json!({
            "code": 200,
            "payload": dispatches.iter().map(dispatch_payload).collect::<Vec<_>>(),
        }))
    }

    /// Status write whose failure is logged; used on paths already reporting an error
    async fn record(&self, tracker: &StatusTracker, update: StatusUpdate) {
        if let Err(e) = tracker.update(update).await {
            error!(status_key = %tracker.key(), error = %e, "Failed to record job status");
        }
    }
}

fn dispatch_payload(dispatch: &BatchDispatch) -> Value {
    let outcome = &dispatch.outcome;
    json!({
        "batchNumber": dispatch.batch_number,
        "files": dispatch.file_count,
        "code": if outcome.is_dispatched() { 200 } else { 500 },
        "activationId": outcome.handle,
        "error": outcome.error,
    })
}

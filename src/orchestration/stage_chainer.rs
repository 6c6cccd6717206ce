//! # Pipeline Stage Chainer
//!
//! Hands a finished batch over to the next pipeline stage. The next stage may
//! already be writing status by the time the handle is merged, so the merge
//! carries only the handle and never a status. Without a configured next stage
//! the batch's copy phase is its last, and nothing is dispatched or written.

use super::context::PromotionContext;
use super::types::NextStageParams;
use crate::constants::batch_label;
use crate::dispatch::{dispatch_with_status, DispatchOutcome};
use crate::error::Result;
use crate::status::{StatusTracker, StatusUpdate};
use tracing::{debug, instrument};

#[derive(Clone)]
pub struct PipelineStageChainer {
    context: PromotionContext,
}

impl PipelineStageChainer {
    pub fn new(context: PromotionContext) -> Self {
        Self { context }
    }

    /// Action name of the stage that follows the copy phase, if any
    pub fn next_action(&self) -> Option<&str> {
        self.context.config.dispatch.actions.post_copy.as_deref()
    }

    /// Dispatch the next stage and record the hand-off on `tracker`; `None`
    /// when no next stage is configured
    #[instrument(skip(self, tracker), fields(root_folder = %params.job.root_folder, batch_number = params.batch_number))]
    pub async fn advance(
        &self,
        params: NextStageParams,
        tracker: &StatusTracker,
    ) -> Result<Option<DispatchOutcome>> {
        let Some(action) = self.next_action() else {
            debug!("No stage configured after the copy phase");
            return Ok(None);
        };
        let unit = batch_label(params.batch_number);
        let payload = serde_json::to_value(&params)?;
        let outcome = dispatch_with_status(
            self.context.dispatcher.as_ref(),
            action,
            payload,
            tracker,
            &unit,
            |handle| StatusUpdate::new().next_stage_handle(handle.clone()),
        )
        .await;
        Ok(Some(outcome))
    }
}

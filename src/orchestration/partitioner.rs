//! # Batch Partitioner & Dispatcher
//!
//! Splits the enumerated file list into contiguous, densely numbered batches and
//! starts one worker per batch. Dispatch is fire-and-forget: each worker is
//! only awaited until its dispatch handle comes back. A failed dispatch marks
//! the job `FAILED` but never stops the remaining batches from being dispatched.

use super::context::PromotionContext;
use super::types::{Batch, BatchParams, FileRecord, JobParams};
use crate::constants::{batch_label, messages};
use crate::dispatch::{dispatch_with_status, DispatchOutcome};
use crate::error::{PromoteError, Result};
use crate::state_machine::JobStatus;
use crate::status::StatusUpdate;
use serde_json::Value;
use tracing::{error, info, instrument};

/// Contiguous batches of at most `batch_size` files, numbered from 0, in input order
pub fn partition(files: Vec<FileRecord>, batch_size: usize) -> Vec<Batch> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(files.len().div_ceil(batch_size));
    let mut files = files.into_iter().peekable();
    let mut batch_number = 0u32;
    while files.peek().is_some() {
        let chunk: Vec<FileRecord> = files.by_ref().take(batch_size).collect();
        batches.push(Batch::new(batch_number, chunk));
        batch_number += 1;
    }
    batches
}

/// Dispatch result for one batch
#[derive(Debug, Clone)]
pub struct BatchDispatch {
    pub batch_number: u32,
    pub file_count: usize,
    pub outcome: DispatchOutcome,
}

impl BatchDispatch {
    pub fn is_dispatched(&self) -> bool {
        self.outcome.is_dispatched()
    }
}

pub struct BatchDispatcher {
    context: PromotionContext,
}

impl BatchDispatcher {
    pub fn new(context: PromotionContext) -> Self {
        Self { context }
    }

    /// Partition `files` and dispatch one worker per batch. A batch that
    /// cannot be persisted or dispatched gets a failed outcome; the rest still go out.
    #[instrument(skip(self, files), fields(root_folder = %params.root_folder, files = files.len()))]
    pub async fn dispatch(
        &self,
        params: &JobParams,
        files: Vec<FileRecord>,
        batch_size: usize,
    ) -> Vec<BatchDispatch> {
        let batches = partition(files, batch_size);
        let mut results = Vec::with_capacity(batches.len());
        for batch in &batches {
            results.push(self.dispatch_batch(params, batch).await);
        }

        let dispatched = results.iter().filter(|r| r.is_dispatched()).count();
        info!(
            total_batches = batches.len(),
            dispatched = dispatched,
            failed = batches.len() - dispatched,
            "Batch dispatch finished"
        );
        results
    }

    async fn dispatch_batch(&self, params: &JobParams, batch: &Batch) -> BatchDispatch {
        let outcome = match self.prepare(params, batch).await {
            Ok(worker_params) => self.dispatch_worker(params, batch, worker_params).await,
            Err(e) => self.record_unprepared(params, batch, e).await,
        };
        if !outcome.is_dispatched() {
            error!(
                batch_number = batch.batch_number,
                files = batch.len(),
                error = ?outcome.error,
                "Batch worker was not started"
            );
        }

        BatchDispatch {
            batch_number: batch.batch_number,
            file_count: batch.len(),
            outcome,
        }
    }

    /// Persist the batch and build the worker parameters
    async fn prepare(&self, params: &JobParams, batch: &Batch) -> Result<Value> {
        // The worker reads the store when its parameters carry no files
        self.context
            .batch_store
            .save_batch(&params.root_folder, batch)
            .await?;
        Ok(serde_json::to_value(BatchParams::new(params.clone(), batch))?)
    }

    /// Failed outcome for a batch that never reached the dispatcher
    async fn record_unprepared(
        &self,
        params: &JobParams,
        batch: &Batch,
        error: PromoteError,
    ) -> DispatchOutcome {
        let label = batch_label(batch.batch_number);
        let message = format!("{} for {label}: {error}", messages::FAILED_TO_INVOKE);
        let tracker = self.context.job_tracker(&params.root_folder);
        let record = tracker
            .update(StatusUpdate::status_message(JobStatus::Failed, message))
            .await
            .map_err(|write_err| {
                error!(status_key = %tracker.key(), error = %write_err, "Failed to record batch failure");
            })
            .ok();
        DispatchOutcome {
            action: self.context.config.dispatch.actions.promote_worker.clone(),
            handle: None,
            error: Some(error.to_string()),
            record,
        }
    }

    async fn dispatch_worker(
        &self,
        params: &JobParams,
        batch: &Batch,
        worker_params: Value,
    ) -> DispatchOutcome {
        let batch_number = batch.batch_number;
        dispatch_with_status(
            self.context.dispatcher.as_ref(),
            &self.context.config.dispatch.actions.promote_worker,
            worker_params,
            &self.context.job_tracker(&params.root_folder),
            &batch_label(batch_number),
            |handle| {
                StatusUpdate::with_status(JobStatus::InProgress)
                    .batch_handle(batch_number, handle.clone())
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::context::PromotionContext;
    use crate::orchestration::types::FailureManifest;
    use crate::status::{BatchStore, InMemoryStatusStore};
    use crate::test_helpers::{test_config, test_context, InMemoryStorage, RecordingDispatcher};
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Batch store that rejects one batch number
    struct RejectingBatchStore {
        inner: Arc<InMemoryStatusStore>,
        rejected: u32,
    }

    #[async_trait]
    impl BatchStore for RejectingBatchStore {
        async fn save_batch(&self, root_folder: &str, batch: &Batch) -> Result<()> {
            if batch.batch_number == self.rejected {
                return Err(PromoteError::status_store("save_batch", "connection refused"));
            }
            self.inner.save_batch(root_folder, batch).await
        }

        async fn load_batch(&self, root_folder: &str, batch_number: u32) -> Result<Option<Batch>> {
            self.inner.load_batch(root_folder, batch_number).await
        }

        async fn write_manifest(&self, root_folder: &str, manifest: &FailureManifest) -> Result<()> {
            self.inner.write_manifest(root_folder, manifest).await
        }

        async fn read_manifest(
            &self,
            root_folder: &str,
            batch_number: u32,
        ) -> Result<Option<FailureManifest>> {
            self.inner.read_manifest(root_folder, batch_number).await
        }
    }

    fn files(n: usize) -> Vec<FileRecord> {
        (0..n)
            .map(|i| FileRecord::new(format!("https://dl/{i}"), format!("/{i}.html")))
            .collect()
    }

    #[test]
    fn test_partition_sizes() {
        let batches = partition(files(3), 2);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 1);
        assert_eq!(batches[1].batch_number, 1);
        assert!(partition(Vec::new(), 50).is_empty());
        assert_eq!(partition(files(100), 50).len(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_records_handles() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let (context, store) = test_context(Arc::new(InMemoryStorage::new()), dispatcher.clone());
        let params = JobParams::new("/fg", "https://x/page", "/p.xlsx");

        let results = BatchDispatcher::new(context.clone())
            .dispatch(&params, files(5), 2)
            .await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(BatchDispatch::is_dispatched));
        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].1["batchNumber"], 2);
        assert_eq!(calls[2].1["files"].as_array().unwrap().len(), 1);

        let record = context.job_tracker("/fg").read().await.unwrap();
        assert_eq!(record.status, Some(JobStatus::InProgress));
        assert_eq!(record.batch_handles.len(), 3);
        assert!(store.load_batch("/fg", 2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_dispatch_does_not_stop_siblings() {
        let dispatcher = Arc::new(RecordingDispatcher::new().failing_call(0));
        let (context, _store) = test_context(Arc::new(InMemoryStorage::new()), dispatcher.clone());
        let params = JobParams::new("/fg", "https://x/page", "/p.xlsx");

        let results = BatchDispatcher::new(context.clone())
            .dispatch(&params, files(4), 2)
            .await;

        assert!(!results[0].is_dispatched());
        assert!(results[1].is_dispatched());
        let record = context.job_tracker("/fg").read().await.unwrap();
        assert_eq!(record.status, Some(JobStatus::Failed));
        assert!(record
            .status_message
            .unwrap()
            .starts_with(messages::FAILED_TO_INVOKE));
        assert!(record.batch_handles.contains_key(&1));
    }

    #[tokio::test]
    async fn test_store_failure_does_not_stop_siblings() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let store = Arc::new(InMemoryStatusStore::new());
        let context = PromotionContext::new(
            Arc::new(test_config()),
            Arc::new(InMemoryStorage::new()),
            dispatcher.clone(),
            store.clone(),
            Arc::new(RejectingBatchStore {
                inner: store.clone(),
                rejected: 0,
            }),
        );
        let params = JobParams::new("/fg", "https://x/page", "/p.xlsx");

        let results = BatchDispatcher::new(context.clone())
            .dispatch(&params, files(6), 2)
            .await;

        assert_eq!(results.len(), 3);
        assert!(!results[0].is_dispatched());
        assert!(results[0].outcome.error.as_deref().unwrap().contains("connection refused"));
        assert!(results[1].is_dispatched() && results[2].is_dispatched());
        let dispatched: Vec<_> = dispatcher
            .calls()
            .iter()
            .map(|(_, params)| params["batchNumber"].as_u64().unwrap())
            .collect();
        assert_eq!(dispatched, vec![1, 2]);

        let record = context.job_tracker("/fg").read().await.unwrap();
        assert_eq!(record.status, Some(JobStatus::Failed));
        assert!(record.status_message.unwrap().contains("Batch-0"));
        assert_eq!(record.batch_handles.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    }
}

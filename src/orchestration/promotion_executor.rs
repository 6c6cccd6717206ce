//! # Batch Promotion Executor
//!
//! Runs once per dispatched batch. Files are promoted in bounded-concurrency
//! chunks; each file is copied server-side and, when the copy does not report
//! completion, downloaded from staging and uploaded to the primary tree.
//!
//! ## Failure model
//!
//! - missing parameters: `FAILED` on the batch record, no work done
//! - per-file failures: collected into the batch's failure manifest; the batch
//!   still completes its copy stage
//! - anything else: `COMPLETED_WITH_ERROR` on the batch record
//!
//! ## Lifecycle of the batch record
//!
//! `STARTED (promote_copy: IN_PROGRESS)` then `IN_PROGRESS (promote_copy: COMPLETED)`,
//! then, after the settle delay, the next stage's handle is merged in when a
//! next stage is configured.

use super::chunk_schedule::ChunkSchedule;
use super::context::PromotionContext;
use super::stage_chainer::PipelineStageChainer;
use super::types::{
    ActionResponse, BatchParams, BatchReport, FailureManifest, FileOutcome, FileRecord,
    NextStageParams, PromotionMethod,
};
use crate::constants::{batch_label, messages};
use crate::error::{PromoteError, Result};
use crate::resilience::BackoffPolicy;
use crate::state_machine::{JobStatus, PipelineStage};
use crate::status::{StatusTracker, StatusUpdate};
use crate::storage::{CopyStatus, StorageApi};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// How a server-side copy attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Completed,
    Failed,
    /// Monitor never reported a final state within the poll budget
    TimedOut { attempts: u32 },
    /// Service accepted the copy without a monitor URL
    NoMonitor,
}

/// Promotes single files from the staging root into the primary root
pub struct FilePromoter {
    storage: Arc<dyn StorageApi>,
    poll: BackoffPolicy,
    staging_root: String,
    primary_root: String,
}

impl FilePromoter {
    pub fn new(
        storage: Arc<dyn StorageApi>,
        poll: BackoffPolicy,
        staging_root: impl Into<String>,
        primary_root: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            poll,
            staging_root: staging_root.into(),
            primary_root: primary_root.into(),
        }
    }

    /// Copy, falling back to download+upload. Never returns an error: every
    /// failure becomes a failed outcome for this file.
    pub async fn promote(&self, file: &FileRecord) -> FileOutcome {
        let source_path = join_path(&self.staging_root, &file.relative_path);
        let destination_folder = join_path(&self.primary_root, file.destination_folder());
        let destination_path = join_path(&self.primary_root, &file.relative_path);

        let copy = match self.copy(&source_path, &destination_folder).await {
            Ok(CopyOutcome::Completed) => {
                debug!(relative_path = %file.relative_path, "Copied file");
                return FileOutcome::promoted(&file.relative_path, PromotionMethod::Copied);
            }
            Ok(outcome) => outcome,
            Err(e) => {
                error!(relative_path = %file.relative_path, error = %e, "Copy request failed");
                return FileOutcome::failed(&file.relative_path, e.to_string());
            }
        };

        let reason = match copy {
            CopyOutcome::TimedOut { attempts } => {
                PromoteError::copy_timed_out(&source_path, attempts).to_string()
            }
            other => format!("copy ended as {other:?}"),
        };
        warn!(relative_path = %file.relative_path, reason = %reason, "Copy did not complete, uploading instead");

        match self.download_and_upload(file, &destination_path).await {
            Ok(()) => FileOutcome::promoted(&file.relative_path, PromotionMethod::Uploaded),
            Err(e) => {
                error!(relative_path = %file.relative_path, error = %e, "Fallback upload failed");
                FileOutcome::failed(&file.relative_path, format!("{reason}; fallback failed: {e}"))
            }
        }
    }

    /// Request the copy and poll its monitor within the poll budget. Only the
    /// copy request itself can error; poll failures end as `TimedOut`.
    pub async fn copy(&self, source_path: &str, destination_folder: &str) -> Result<CopyOutcome> {
        let Some(monitor) = self
            .storage
            .start_copy(source_path, destination_folder)
            .await?
        else {
            return Ok(CopyOutcome::NoMonitor);
        };

        for attempt in 0..self.poll.max_attempts {
            // A failed poll counts against the budget like an unfinished one
            match self.storage.copy_status(&monitor).await {
                Ok(status) if status.is_finished() => {
                    return Ok(if status == CopyStatus::Completed {
                        CopyOutcome::Completed
                    } else {
                        CopyOutcome::Failed
                    });
                }
                Ok(status) => {
                    debug!(source_path = source_path, attempt = attempt + 1, status = ?status, "Copy still running");
                }
                Err(e) => {
                    warn!(source_path = source_path, attempt = attempt + 1, error = %e, "Copy monitor poll failed");
                }
            }
            if self.poll.allows_retry(attempt + 1) {
                tokio::time::sleep(self.poll.delay_for(attempt)).await;
            }
        }

        Ok(CopyOutcome::TimedOut {
            attempts: self.poll.max_attempts,
        })
    }

    async fn download_and_upload(&self, file: &FileRecord, destination_path: &str) -> Result<()> {
        let content = self.storage.download(&file.download_url).await?;
        self.storage.upload(destination_path, content).await
    }
}

/// `root` + `path`, with exactly one `/` between them
fn join_path(root: &str, path: &str) -> String {
    let root = root.trim_end_matches('/');
    if path.is_empty() {
        root.to_string()
    } else if path.starts_with('/') {
        format!("{root}{path}")
    } else {
        format!("{root}/{path}")
    }
}

pub struct BatchPromotionExecutor {
    context: PromotionContext,
    chainer: PipelineStageChainer,
}

impl BatchPromotionExecutor {
    pub fn new(context: PromotionContext) -> Self {
        let chainer = PipelineStageChainer::new(context.clone());
        Self { context, chainer }
    }

    /// Worker entry point; every outcome is reported through the batch record
    #[instrument(skip(self, params), fields(root_folder = %params.job.root_folder, batch_number = params.batch_number))]
    pub async fn execute(&self, params: BatchParams) -> ActionResponse {
        let params = BatchParams {
            job: params.job.normalized(),
            ..params
        };
        if !params.job.has_root_folder() {
            let message = PromoteError::missing_parameters(["root_folder"]).to_string();
            error!(message = %message, "Batch worker has no status key");
            return ActionResponse::body(json!({ "status": JobStatus::Failed, "message": message }));
        }

        let tracker = self
            .context
            .batch_tracker(&params.job.root_folder, params.batch_number);

        if let Err(e) = params.job.validate() {
            let message = e.to_string();
            error!(message = %message, "Batch worker parameters are incomplete");
            if let Err(write_err) = tracker
                .update(StatusUpdate::status_message(JobStatus::Failed, &message))
                .await
            {
                error!(error = %write_err, "Failed to record validation failure");
            }
            return ActionResponse::body(json!({ "status": JobStatus::Failed, "message": message }));
        }

        match self.run(params, &tracker).await {
            Ok(payload) => ActionResponse::body(payload),
            Err(e) => {
                let message = e.to_string();
                error!(error = %message, "Batch promotion aborted");
                if let Err(write_err) = tracker
                    .update(StatusUpdate::status_message(
                        JobStatus::CompletedWithError,
                        &message,
                    ))
                    .await
                {
                    error!(error = %write_err, "Failed to record batch error");
                }
                ActionResponse::body(
                    json!({ "status": JobStatus::CompletedWithError, "message": message }),
                )
            }
        }
    }

    async fn run(&self, params: BatchParams, tracker: &StatusTracker) -> Result<serde_json::Value> {
        let config = &self.context.config;
        let label = batch_label(params.batch_number);

        tracker.clear().await?;
        tracker
            .update(
                StatusUpdate::status_message(JobStatus::Started, format!("Promoting files of {label}"))
                    .detail(PipelineStage::PromoteCopy, JobStatus::InProgress),
            )
            .await?;

        let files = self.resolve_files(&params).await?;
        info!(files = files.len(), "Promoting batch");

        let promoter = FilePromoter::new(
            Arc::clone(&self.context.storage),
            BackoffPolicy::from(&config.copy_poll),
            params.job.root_folder.as_str(),
            config.promotion.primary_root.as_str(),
        );
        let promoter = &promoter;
        let schedule = ChunkSchedule::new(
            config.promotion.bulk_request_size,
            config.promotion.chunk_pause(),
        );
        let outcomes: Vec<FileOutcome> = schedule
            .run(files, |file| async move { promoter.promote(&file).await })
            .await;

        let report = BatchReport::from_outcomes(params.batch_number, &outcomes);
        let message = if report.has_failures() {
            self.context
                .batch_store
                .write_manifest(
                    &params.job.root_folder,
                    &FailureManifest::new(params.batch_number, report.failed_paths.clone()),
                )
                .await?;
            warn!(failed = report.failed(), total = report.total, "Batch finished with failed files");
            messages::PARTIAL_FAILURE.to_string()
        } else {
            format!("Floodgate promote (copy) of {label} is completed")
        };
        info!(
            copied = report.copied,
            uploaded = report.uploaded,
            failed = report.failed(),
            "Batch copy stage completed"
        );

        tracker
            .update(
                StatusUpdate::status_message(JobStatus::InProgress, message)
                    .detail(PipelineStage::PromoteCopy, JobStatus::Completed),
            )
            .await?;

        let settle = config.promotion.settle_delay();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        let next = NextStageParams {
            job: params.job.clone(),
            batch_number: params.batch_number,
        };
        let outcome = self.chainer.advance(next, tracker).await?;

        Ok(json!({
            "batchNumber": params.batch_number,
            "report": report,
            "nextStageHandle": outcome.and_then(|o| o.handle),
        }))
    }

    /// Files carried in the parameters, otherwise the batch persisted at partition time
    async fn resolve_files(&self, params: &BatchParams) -> Result<Vec<FileRecord>> {
        if !params.files.is_empty() {
            return Ok(params.files.clone());
        }
        self.context
            .batch_store
            .load_batch(&params.job.root_folder, params.batch_number)
            .await?
            .map(|batch| batch.files)
            .ok_or_else(|| PromoteError::BatchNotFound {
                root_folder: params.job.root_folder.clone(),
                batch_number: params.batch_number,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::types::{Batch, JobParams};
    use crate::status::BatchStore;
    use crate::test_helpers::{test_context, CopyBehavior, InMemoryStorage, RecordingDispatcher};

    fn job() -> JobParams {
        JobParams::new("/fg", "https://x/page", "/p.xlsx")
    }

    fn record(path: &str) -> FileRecord {
        FileRecord::new(format!("https://staging.test/fg{path}"), path)
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/main/", "/a/1.html"), "/main/a/1.html");
        assert_eq!(join_path("/main", ""), "/main");
        assert_eq!(join_path("", "/a"), "/a");
        assert_eq!(join_path("/main", "a"), "/main/a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_copy_poll_is_bounded() {
        let storage = Arc::new(
            InMemoryStorage::new()
                .with_file("/fg/a/1.html")
                .with_copy_behavior("/fg/a/1.html", CopyBehavior::NeverComplete),
        );
        let promoter = FilePromoter::new(storage.clone(), BackoffPolicy::immediate(5), "/fg", "/main");

        let outcome = promoter.copy("/fg/a/1.html", "/main/a").await.unwrap();
        assert_eq!(outcome, CopyOutcome::TimedOut { attempts: 5 });
        assert_eq!(storage.status_polls(), 5);
    }

    #[tokio::test]
    async fn test_timed_out_copy_falls_back_to_upload() {
        let storage = Arc::new(
            InMemoryStorage::new()
                .with_file("/fg/a/1.html")
                .with_copy_behavior("/fg/a/1.html", CopyBehavior::NeverComplete),
        );
        let promoter = FilePromoter::new(storage.clone(), BackoffPolicy::immediate(3), "/fg", "/main");

        let outcome = promoter.promote(&record("/a/1.html")).await;
        assert_eq!(outcome.method, PromotionMethod::Uploaded);
        assert_eq!(storage.uploaded_paths(), vec!["/main/a/1.html".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_error_is_retried_within_budget() {
        let storage = Arc::new(
            InMemoryStorage::new()
                .with_file("/fg/a/1.html")
                .with_flaky_monitor(1),
        );
        let promoter = FilePromoter::new(storage.clone(), BackoffPolicy::immediate(3), "/fg", "/main");

        let outcome = promoter.promote(&record("/a/1.html")).await;
        assert_eq!(outcome.method, PromotionMethod::Copied);
        assert_eq!(storage.status_polls(), 2);
        assert_eq!(storage.copied_paths(), vec!["/main/a/1.html".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_monitor_falls_back_to_upload() {
        let storage = Arc::new(
            InMemoryStorage::new()
                .with_file("/fg/a/1.html")
                .with_flaky_monitor(usize::MAX),
        );
        let promoter = FilePromoter::new(storage.clone(), BackoffPolicy::immediate(3), "/fg", "/main");

        let copy = promoter.copy("/fg/a/1.html", "/main/a").await.unwrap();
        assert_eq!(copy, CopyOutcome::TimedOut { attempts: 3 });

        let outcome = promoter.promote(&record("/a/1.html")).await;
        assert_eq!(outcome.method, PromotionMethod::Uploaded);
        assert_eq!(storage.uploaded_paths(), vec!["/main/a/1.html".to_string()]);
    }

    #[tokio::test]
    async fn test_copy_request_error_fails_file() {
        let storage = Arc::new(
            InMemoryStorage::new()
                .with_file("/fg/a/1.html")
                .with_copy_behavior("/fg/a/1.html", CopyBehavior::Error),
        );
        let promoter = FilePromoter::new(storage.clone(), BackoffPolicy::immediate(3), "/fg", "/main");

        let outcome = promoter.promote(&record("/a/1.html")).await;
        assert!(!outcome.is_success());
        assert!(storage.uploaded_paths().is_empty());
    }

    #[tokio::test]
    async fn test_batch_records_lifecycle_and_chains() {
        let storage = Arc::new(
            InMemoryStorage::new()
                .with_file("/fg/a/1.html")
                .with_file("/fg/a/2.html"),
        );
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let (context, store) = test_context(storage.clone(), dispatcher.clone());
        let batch = Batch::new(0, vec![record("/a/1.html"), record("/a/2.html")]);

        let response = BatchPromotionExecutor::new(context.clone())
            .execute(BatchParams::new(job(), &batch))
            .await;

        assert!(response.is_success());
        let record = context.batch_tracker("/fg", 0).read().await.unwrap();
        assert_eq!(record.status, Some(JobStatus::InProgress));
        assert_eq!(record.stage(PipelineStage::PromoteCopy), Some(JobStatus::Completed));
        assert!(record.next_stage_handle.is_some());
        assert!(store.read_manifest("/fg", 0).await.unwrap().is_none());
        assert_eq!(storage.copied_paths().len(), 2);
        assert_eq!(dispatcher.calls()[0].1["batchNumber"], 0);
        // Job record untouched by the worker
        assert!(context.job_tracker("/fg").read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_root_without_leading_slash_promotes_files() {
        let storage = Arc::new(InMemoryStorage::new().with_file("/fg/a/1.html"));
        let (context, _) = test_context(storage.clone(), Arc::new(RecordingDispatcher::new()));
        let batch = Batch::new(0, vec![record("/a/1.html")]);
        let mut params = BatchParams::new(job(), &batch);
        params.job.root_folder = "fg".to_string();

        BatchPromotionExecutor::new(context.clone()).execute(params).await;

        assert_eq!(storage.copied_paths(), vec!["/main/a/1.html".to_string()]);
        let record = context.batch_tracker("/fg", 0).read().await.unwrap();
        assert_eq!(record.stage(PipelineStage::PromoteCopy), Some(JobStatus::Completed));
    }

    #[tokio::test]
    async fn test_batch_without_inline_files_loads_from_store() {
        let storage = Arc::new(InMemoryStorage::new().with_file("/fg/b/3.html"));
        let (context, store) = test_context(storage.clone(), Arc::new(RecordingDispatcher::new()));
        let batch = Batch::new(1, vec![record("/b/3.html")]);
        store.save_batch("/fg", &batch).await.unwrap();

        let mut params = BatchParams::new(job(), &batch);
        params.files.clear();
        BatchPromotionExecutor::new(context).execute(params).await;

        assert_eq!(storage.copied_paths(), vec!["/main/b/3.html".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_batch_is_completed_with_error() {
        let (context, _) = test_context(
            Arc::new(InMemoryStorage::new()),
            Arc::new(RecordingDispatcher::new()),
        );
        let params = BatchParams {
            job: job(),
            batch_number: 9,
            files: Vec::new(),
        };

        BatchPromotionExecutor::new(context.clone()).execute(params).await;

        let record = context.batch_tracker("/fg", 9).read().await.unwrap();
        assert_eq!(record.status, Some(JobStatus::CompletedWithError));
        assert!(record.status_message.unwrap().contains("Batch 9 not found"));
    }

    #[tokio::test]
    async fn test_invalid_params_fail_fast() {
        let storage = Arc::new(InMemoryStorage::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let (context, _) = test_context(storage.clone(), dispatcher.clone());
        let params = BatchParams {
            job: JobParams::new("/fg", "", "/p.xlsx"),
            batch_number: 0,
            files: vec![record("/a/1.html")],
        };

        BatchPromotionExecutor::new(context.clone()).execute(params).await;

        let record = context.batch_tracker("/fg", 0).read().await.unwrap();
        assert_eq!(record.status, Some(JobStatus::Failed));
        assert!(storage.copied_paths().is_empty());
        assert!(dispatcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_folder_writes_nothing() {
        let (context, store) = test_context(
            Arc::new(InMemoryStorage::new()),
            Arc::new(RecordingDispatcher::new()),
        );
        let params = BatchParams {
            job: JobParams::default(),
            batch_number: 0,
            files: Vec::new(),
        };

        let response = BatchPromotionExecutor::new(context).execute(params).await;
        assert!(matches!(response, ActionResponse::Body { .. }));
        assert!(store.is_empty());
    }
}

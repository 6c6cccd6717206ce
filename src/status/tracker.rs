use super::record::{StatusKey, StatusRecord, StatusUpdate};
use super::store::{BatchStore, StatusStore};
use crate::error::Result;
use crate::state_machine::JobStatus;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Status access bound to one key.
///
/// Stages hold one tracker for the record they own (the job key, or their
/// batch key) and never address other keys through it.
#[derive(Clone)]
pub struct StatusTracker {
    store: Arc<dyn StatusStore>,
    key: StatusKey,
}

impl StatusTracker {
    pub fn new(store: Arc<dyn StatusStore>, key: StatusKey) -> Self {
        Self { store, key }
    }

    pub fn for_job(store: Arc<dyn StatusStore>, root_folder: &str) -> Self {
        Self::new(store, StatusKey::job(root_folder))
    }

    pub fn for_batch(store: Arc<dyn StatusStore>, root_folder: &str, batch_number: u32) -> Self {
        Self::new(store, StatusKey::batch(root_folder, batch_number))
    }

    pub fn key(&self) -> &StatusKey {
        &self.key
    }

    pub async fn clear(&self) -> Result<()> {
        debug!(status_key = %self.key, "Clearing status record");
        self.store.clear(&self.key).await
    }

    /// Merge-write; returns the full record after the merge
    pub async fn update(&self, update: StatusUpdate) -> Result<StatusRecord> {
        debug!(
            status_key = %self.key,
            status = ?update.status,
            message = ?update.status_message,
            "Updating status record"
        );
        self.store.merge_update(&self.key, &update).await
    }

    /// Current record, or an empty record if the key was never written
    pub async fn read(&self) -> Result<StatusRecord> {
        Ok(self.store.get(&self.key).await?.unwrap_or_default())
    }

    /// Job record, every batch record and every failure manifest for `root_folder`
    pub async fn summarize(
        store: &dyn StatusStore,
        batches: &dyn BatchStore,
        root_folder: &str,
    ) -> Result<JobSummary> {
        let job = store
            .get(&StatusKey::job(root_folder))
            .await?
            .unwrap_or_default();

        let from_handles = job
            .batch_handles
            .keys()
            .next_back()
            .map_or(0, |last| last + 1);
        let total_batches = job.total_batches.unwrap_or(0).max(from_handles);

        let mut batch_summaries = Vec::with_capacity(total_batches as usize);
        for batch_number in 0..total_batches {
            let record = store
                .get(&StatusKey::batch(root_folder, batch_number))
                .await?
                .unwrap_or_default();
            let failed_paths = batches
                .read_manifest(root_folder, batch_number)
                .await?
                .map(|manifest| manifest.failed_paths)
                .unwrap_or_default();
            batch_summaries.push(BatchSummary {
                batch_number,
                record,
                failed_paths,
            });
        }

        Ok(JobSummary {
            root_folder: root_folder.to_string(),
            job,
            batches: batch_summaries,
        })
    }
}

impl std::fmt::Debug for StatusTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusTracker").field("key", &self.key).finish()
    }
}

/// Operator view of one batch
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub batch_number: u32,
    pub record: StatusRecord,
    pub failed_paths: Vec<String>,
}

/// Operator view of a whole job, the input for a manual re-trigger
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub root_folder: String,
    pub job: StatusRecord,
    pub batches: Vec<BatchSummary>,
}

impl JobSummary {
    /// Failed relative paths across every batch, in batch order
    pub fn failed_paths(&self) -> Vec<String> {
        self.batches
            .iter()
            .flat_map(|batch| batch.failed_paths.iter().cloned())
            .collect()
    }

    /// Number of batches whose record carries the given status
    pub fn count_with_status(&self, status: JobStatus) -> usize {
        self.batches
            .iter()
            .filter(|batch| batch.record.status == Some(status))
            .count()
    }

    /// Batches that have not written any status yet
    pub fn unstarted_batches(&self) -> Vec<u32> {
        self.batches
            .iter()
            .filter(|batch| batch.record.status.is_none())
            .map(|batch| batch.batch_number)
            .collect()
    }
}

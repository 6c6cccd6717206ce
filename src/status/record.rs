use crate::dispatch::DispatchHandle;
use crate::state_machine::{JobStatus, MonotonicLifecycleGuard, PipelineStage, TransitionDecision};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Address of a status record: the job root folder, optionally narrowed to a batch
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatusKey {
    root_folder: String,
    batch_number: Option<u32>,
}

impl StatusKey {
    /// Job-level record
    pub fn job(root_folder: impl Into<String>) -> Self {
        Self {
            root_folder: root_folder.into(),
            batch_number: None,
        }
    }

    /// Per-batch record, independent from the job-level record
    pub fn batch(root_folder: impl Into<String>, batch_number: u32) -> Self {
        Self {
            root_folder: root_folder.into(),
            batch_number: Some(batch_number),
        }
    }

    pub fn root_folder(&self) -> &str {
        &self.root_folder
    }

    pub fn batch_number(&self) -> Option<u32> {
        self.batch_number
    }

    pub fn is_batch(&self) -> bool {
        self.batch_number.is_some()
    }

    /// The job-level key this key belongs to
    pub fn job_key(&self) -> StatusKey {
        Self::job(self.root_folder.clone())
    }

    /// Flat string form used by persistent stores
    pub fn storage_key(&self) -> String {
        match self.batch_number {
            None => format!("promote:{}", self.root_folder),
            Some(n) => format!("promote:{}:batch_{n}", self.root_folder),
        }
    }
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// Persisted projection of a job or batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusRecord {
    pub status: Option<JobStatus>,
    pub status_message: Option<String>,
    /// Per-stage status, e.g. `promote_copy -> IN_PROGRESS`
    pub details: BTreeMap<PipelineStage, JobStatus>,
    /// Handle of the dispatch that started the work this record describes
    pub dispatch_handle: Option<DispatchHandle>,
    /// Job-level only: batch number to worker dispatch handle
    pub batch_handles: BTreeMap<u32, DispatchHandle>,
    /// Handle of the stage chained after this one
    pub next_stage_handle: Option<DispatchHandle>,
    pub total_batches: Option<u32>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatusRecord {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_some_and(|s| s.is_terminal())
    }

    pub fn stage(&self, stage: PipelineStage) -> Option<JobStatus> {
        self.details.get(&stage).copied()
    }

    /// Merge an update into this record.
    ///
    /// Only supplied fields change; map fields merge entry by entry. A
    /// non-terminal status never replaces a terminal one.
    pub fn apply(&mut self, key: &StatusKey, update: &StatusUpdate) -> TransitionDecision {
        let mut decision = TransitionDecision::Apply;

        if let Some(requested) = update.status {
            decision = MonotonicLifecycleGuard::check(self.status, requested);
            match decision {
                TransitionDecision::Apply => self.status = Some(requested),
                TransitionDecision::KeepCurrent => warn!(
                    key = %key,
                    current = ?self.status,
                    requested = %requested,
                    "Ignoring status regression on terminal record"
                ),
            }
        }
        if let Some(message) = &update.status_message {
            self.status_message = Some(message.clone());
        }
        for (stage, status) in &update.details {
            self.details.insert(*stage, *status);
        }
        if let Some(handle) = &update.dispatch_handle {
            self.dispatch_handle = Some(handle.clone());
        }
        for (batch_number, handle) in &update.batch_handles {
            self.batch_handles.insert(*batch_number, handle.clone());
        }
        if let Some(handle) = &update.next_stage_handle {
            self.next_stage_handle = Some(handle.clone());
        }
        if let Some(total) = update.total_batches {
            self.total_batches = Some(total);
        }
        self.updated_at = Some(Utc::now());

        decision
    }
}

/// Merge-write request; unset fields leave the stored values untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusUpdate {
    pub status: Option<JobStatus>,
    pub status_message: Option<String>,
    pub details: BTreeMap<PipelineStage, JobStatus>,
    pub dispatch_handle: Option<DispatchHandle>,
    pub batch_handles: BTreeMap<u32, DispatchHandle>,
    pub next_stage_handle: Option<DispatchHandle>,
    pub total_batches: Option<u32>,
}

impl StatusUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Status plus message, the most common write
    pub fn status_message(status: JobStatus, message: impl Into<String>) -> Self {
        Self::with_status(status).message(message)
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }

    pub fn detail(mut self, stage: PipelineStage, status: JobStatus) -> Self {
        self.details.insert(stage, status);
        self
    }

    pub fn dispatch_handle(mut self, handle: DispatchHandle) -> Self {
        self.dispatch_handle = Some(handle);
        self
    }

    pub fn batch_handle(mut self, batch_number: u32, handle: DispatchHandle) -> Self {
        self.batch_handles.insert(batch_number, handle);
        self
    }

    pub fn next_stage_handle(mut self, handle: DispatchHandle) -> Self {
        self.next_stage_handle = Some(handle);
        self
    }

    pub fn total_batches(mut self, total: u32) -> Self {
        self.total_batches = Some(total);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

use super::record::{StatusKey, StatusRecord, StatusUpdate};
use crate::error::Result;
use crate::orchestration::types::{Batch, FailureManifest};
use async_trait::async_trait;

/// Durable keyed status records shared by every pipeline stage.
///
/// Writes are field-level merges applied atomically per key. There is no
/// multi-key atomicity; concurrent writers on the job key rely on the merge
/// touching only the fields they supply.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Current record, `None` if the key was never written
    async fn get(&self, key: &StatusKey) -> Result<Option<StatusRecord>>;

    /// Reset the record for `key` to an empty initial state
    async fn clear(&self, key: &StatusKey) -> Result<()>;

    /// Merge `update` into the record and return the resulting full record
    async fn merge_update(&self, key: &StatusKey, update: &StatusUpdate) -> Result<StatusRecord>;
}

/// Per-batch file lists and failure manifests
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Persist a batch's files; drops any manifest left by an earlier run
    async fn save_batch(&self, root_folder: &str, batch: &Batch) -> Result<()>;

    async fn load_batch(&self, root_folder: &str, batch_number: u32) -> Result<Option<Batch>>;

    async fn write_manifest(&self, root_folder: &str, manifest: &FailureManifest) -> Result<()>;

    async fn read_manifest(
        &self,
        root_folder: &str,
        batch_number: u32,
    ) -> Result<Option<FailureManifest>>;
}

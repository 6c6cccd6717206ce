//! In-memory status and batch store for local runs and tests.

use super::record::{StatusKey, StatusRecord, StatusUpdate};
use super::store::{BatchStore, StatusStore};
use crate::error::Result;
use crate::orchestration::types::{Batch, FailureManifest};
use async_trait::async_trait;
use dashmap::DashMap;

type BatchKey = (String, u32);

/// Status records held in a concurrent map; each merge holds the key's shard
/// lock for the whole read-modify-write
#[derive(Debug, Default)]
pub struct InMemoryStatusStore {
    records: DashMap<StatusKey, StatusRecord>,
    batches: DashMap<BatchKey, Batch>,
    manifests: DashMap<BatchKey, FailureManifest>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn get(&self, key: &StatusKey) -> Result<Option<StatusRecord>> {
        Ok(self.records.get(key).map(|record| record.value().clone()))
    }

    async fn clear(&self, key: &StatusKey) -> Result<()> {
        self.records.insert(key.clone(), StatusRecord::default());
        Ok(())
    }

    async fn merge_update(&self, key: &StatusKey, update: &StatusUpdate) -> Result<StatusRecord> {
        let mut record = self.records.entry(key.clone()).or_default();
        record.apply(key, update);
        Ok(record.value().clone())
    }
}

#[async_trait]
impl BatchStore for InMemoryStatusStore {
    async fn save_batch(&self, root_folder: &str, batch: &Batch) -> Result<()> {
        let key = (root_folder.to_string(), batch.batch_number);
        self.manifests.remove(&key);
        self.batches.insert(key, batch.clone());
        Ok(())
    }

    async fn load_batch(&self, root_folder: &str, batch_number: u32) -> Result<Option<Batch>> {
        Ok(self
            .batches
            .get(&(root_folder.to_string(), batch_number))
            .map(|batch| batch.value().clone()))
    }

    async fn write_manifest(&self, root_folder: &str, manifest: &FailureManifest) -> Result<()> {
        self.manifests.insert(
            (root_folder.to_string(), manifest.batch_number),
            manifest.clone(),
        );
        Ok(())
    }

    async fn read_manifest(
        &self,
        root_folder: &str,
        batch_number: u32,
    ) -> Result<Option<FailureManifest>> {
        Ok(self
            .manifests
            .get(&(root_folder.to_string(), batch_number))
            .map(|manifest| manifest.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchHandle;
    use crate::orchestration::types::FileRecord;
    use crate::state_machine::JobStatus;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_clear_resets_terminal_record() {
        let store = InMemoryStatusStore::new();
        let key = StatusKey::job("/fg");
        store
            .merge_update(&key, &StatusUpdate::status_message(JobStatus::Failed, "x"))
            .await
            .unwrap();
        store.clear(&key).await.unwrap();

        let record = store
            .merge_update(&key, &StatusUpdate::with_status(JobStatus::Started))
            .await
            .unwrap();
        assert_eq!(record.status, Some(JobStatus::Started));
        assert!(record.status_message.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_merges_keep_distinct_fields() {
        let store = Arc::new(InMemoryStatusStore::new());
        let key = StatusKey::job("/fg");

        let writers: Vec<_> = (0..32u32)
            .map(|n| {
                let store = Arc::clone(&store);
                let key = key.clone();
                tokio::spawn(async move {
                    let update = StatusUpdate::with_status(JobStatus::InProgress)
                        .batch_handle(n, DispatchHandle::new(format!("h{n}")));
                    store.merge_update(&key, &update).await.unwrap();
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let record = store.get(&key).await.unwrap().unwrap();
        assert_eq!(record.batch_handles.len(), 32);
    }

    #[tokio::test]
    async fn test_save_batch_drops_stale_manifest() {
        let store = InMemoryStatusStore::new();
        let batch = Batch::new(0, vec![FileRecord::new("u", "/a/1.html")]);
        store.save_batch("/fg", &batch).await.unwrap();
        store
            .write_manifest("/fg", &FailureManifest::new(0, vec!["/a/1.html".into()]))
            .await
            .unwrap();
        assert!(store.read_manifest("/fg", 0).await.unwrap().is_some());

        store.save_batch("/fg", &batch).await.unwrap();
        assert!(store.read_manifest("/fg", 0).await.unwrap().is_none());
        assert_eq!(store.load_batch("/fg", 0).await.unwrap(), Some(batch));
        assert!(store.load_batch("/other", 0).await.unwrap().is_none());
    }
}

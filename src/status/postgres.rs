//! # PostgreSQL Status Store
//!
//! Status records and batch data in two tables. Records are stored as JSONB so
//! a merge is a locked read-modify-write inside one transaction:
//! `INSERT .. ON CONFLICT DO NOTHING`, `SELECT .. FOR UPDATE`, apply, `UPDATE`.
//! Writers on the same key serialize on the row lock; writers on different
//! keys never contend.

use super::record::{StatusKey, StatusRecord, StatusUpdate};
use super::store::{BatchStore, StatusStore};
use crate::error::Result;
use crate::orchestration::types::{Batch, FailureManifest, FileRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

const CREATE_STATUS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS floodgate_status_records (
    status_key TEXT PRIMARY KEY,
    record JSONB NOT NULL DEFAULT '{}'::jsonb,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)"#;

const CREATE_BATCH_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS floodgate_batches (
    root_folder TEXT NOT NULL,
    batch_number INTEGER NOT NULL,
    files JSONB NOT NULL,
    failed_paths JSONB,
    manifest_written_at TIMESTAMPTZ,
    PRIMARY KEY (root_folder, batch_number)
)"#;

#[derive(Debug, Clone)]
pub struct PgStatusStore {
    pool: PgPool,
}

impl PgStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        info!(
            max_connections = max_connections,
            pool_size = pool.size(),
            "Status store database pool initialized"
        );
        Ok(Self { pool })
    }

    /// Create the status and batch tables if they do not exist
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(CREATE_STATUS_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_BATCH_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StatusStore for PgStatusStore {
    async fn get(&self, key: &StatusKey) -> Result<Option<StatusRecord>> {
        let row: Option<(Json<StatusRecord>,)> =
            sqlx::query_as("SELECT record FROM floodgate_status_records WHERE status_key = $1")
                .bind(key.storage_key())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(Json(record),)| record))
    }

    async fn clear(&self, key: &StatusKey) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO floodgate_status_records (status_key, record, updated_at)
            VALUES ($1, '{}'::jsonb, now())
            ON CONFLICT (status_key) DO UPDATE SET record = '{}'::jsonb, updated_at = now()
            "#,
        )
        .bind(key.storage_key())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn merge_update(&self, key: &StatusKey, update: &StatusUpdate) -> Result<StatusRecord> {
        let storage_key = key.storage_key();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO floodgate_status_records (status_key) VALUES ($1) ON CONFLICT (status_key) DO NOTHING",
        )
        .bind(&storage_key)
        .execute(&mut *tx)
        .await?;

        let (Json(mut record),): (Json<StatusRecord>,) = sqlx::query_as(
            "SELECT record FROM floodgate_status_records WHERE status_key = $1 FOR UPDATE",
        )
        .bind(&storage_key)
        .fetch_one(&mut *tx)
        .await?;

        record.apply(key, update);

        sqlx::query(
            "UPDATE floodgate_status_records SET record = $2, updated_at = now() WHERE status_key = $1",
        )
        .bind(&storage_key)
        .bind(Json(&record))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }
}

#[async_trait]
impl BatchStore for PgStatusStore {
    async fn save_batch(&self, root_folder: &str, batch: &Batch) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO floodgate_batches (root_folder, batch_number, files)
            VALUES ($1, $2, $3)
            ON CONFLICT (root_folder, batch_number)
            DO UPDATE SET files = EXCLUDED.files, failed_paths = NULL, manifest_written_at = NULL
            "#,
        )
        .bind(root_folder)
        .bind(batch.batch_number as i32)
        .bind(Json(&batch.files))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_batch(&self, root_folder: &str, batch_number: u32) -> Result<Option<Batch>> {
        let row: Option<(Json<Vec<FileRecord>>,)> = sqlx::query_as(
            "SELECT files FROM floodgate_batches WHERE root_folder = $1 AND batch_number = $2",
        )
        .bind(root_folder)
        .bind(batch_number as i32)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(Json(files),)| Batch::new(batch_number, files)))
    }

    async fn write_manifest(&self, root_folder: &str, manifest: &FailureManifest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO floodgate_batches (root_folder, batch_number, files, failed_paths, manifest_written_at)
            VALUES ($1, $2, '[]'::jsonb, $3, $4)
            ON CONFLICT (root_folder, batch_number)
            DO UPDATE SET failed_paths = EXCLUDED.failed_paths, manifest_written_at = EXCLUDED.manifest_written_at
            "#,
        )
        .bind(root_folder)
        .bind(manifest.batch_number as i32)
        .bind(Json(&manifest.failed_paths))
        .bind(manifest.written_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read_manifest(
        &self,
        root_folder: &str,
        batch_number: u32,
    ) -> Result<Option<FailureManifest>> {
        let row: Option<(Option<Json<Vec<String>>>, Option<DateTime<Utc>>)> = sqlx::query_as(
            r#"
            SELECT failed_paths, manifest_written_at FROM floodgate_batches
            WHERE root_folder = $1 AND batch_number = $2
            "#,
        )
        .bind(root_folder)
        .bind(batch_number as i32)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((Some(Json(failed_paths)), Some(written_at))) => Some(FailureManifest {
                batch_number,
                failed_paths,
                written_at,
            }),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchHandle;
    use crate::state_machine::{JobStatus, PipelineStage};
    use std::sync::Arc;

    async fn migrated(pool: PgPool) -> PgStatusStore {
        let store = PgStatusStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    #[sqlx::test(migrations = false)]
    async fn test_clear_resets_terminal_record(pool: PgPool) {
        let store = migrated(pool).await;
        let key = StatusKey::job("/fg");
        store
            .merge_update(&key, &StatusUpdate::status_message(JobStatus::Failed, "previous run"))
            .await
            .unwrap();

        store.clear(&key).await.unwrap();
        assert!(store.get(&key).await.unwrap().unwrap().is_empty());

        let record = store
            .merge_update(&key, &StatusUpdate::with_status(JobStatus::Started))
            .await
            .unwrap();
        assert_eq!(record.status, Some(JobStatus::Started));
        assert!(record.status_message.is_none());
    }

    #[sqlx::test(migrations = false)]
    async fn test_merge_preserves_unmentioned_fields(pool: PgPool) {
        let store = migrated(pool).await;
        let key = StatusKey::batch("/fg", 2);
        store
            .merge_update(
                &key,
                &StatusUpdate::status_message(JobStatus::InProgress, "copying")
                    .detail(PipelineStage::PromoteCopy, JobStatus::Completed),
            )
            .await
            .unwrap();

        store
            .merge_update(
                &key,
                &StatusUpdate::new().next_stage_handle(DispatchHandle::new("activation-7")),
            )
            .await
            .unwrap();

        let record = store.get(&key).await.unwrap().unwrap();
        assert_eq!(record.status, Some(JobStatus::InProgress));
        assert_eq!(record.status_message.as_deref(), Some("copying"));
        assert_eq!(record.stage(PipelineStage::PromoteCopy), Some(JobStatus::Completed));
        assert_eq!(record.next_stage_handle, Some(DispatchHandle::new("activation-7")));
        assert!(store.get(&StatusKey::job("/fg")).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = false)]
    async fn test_concurrent_batch_handle_merges(pool: PgPool) {
        let store = Arc::new(migrated(pool).await);
        let key = StatusKey::job("/fg");
        store
            .merge_update(&key, &StatusUpdate::with_status(JobStatus::Started))
            .await
            .unwrap();

        let writers: Vec<_> = (0..16u32)
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
        assert_eq!(record.batch_handles.len(), 16);
        assert_eq!(record.batch_handles.get(&11), Some(&DispatchHandle::new("h11")));
        assert_eq!(record.status, Some(JobStatus::InProgress));
    }

    #[sqlx::test(migrations = false)]
    async fn test_manifest_round_trip(pool: PgPool) {
        let store = migrated(pool).await;
        let batch = Batch::new(0, vec![FileRecord::new("https://dl/1", "/a/1.html")]);
        store.save_batch("/fg", &batch).await.unwrap();
        assert!(store.read_manifest("/fg", 0).await.unwrap().is_none());

        let manifest = FailureManifest::new(
            0,
            vec!["/a/1.html".to_string(), "/b/3.html".to_string()],
        );
        store.write_manifest("/fg", &manifest).await.unwrap();

        let stored = store.read_manifest("/fg", 0).await.unwrap().unwrap();
        assert_eq!(stored.batch_number, 0);
        assert_eq!(stored.failed_paths, manifest.failed_paths);
        assert_eq!(store.load_batch("/fg", 0).await.unwrap(), Some(batch));
        assert!(store.read_manifest("/fg", 1).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = false)]
    async fn test_save_batch_drops_stale_manifest(pool: PgPool) {
        let store = migrated(pool).await;
        let batch = Batch::new(1, vec![FileRecord::new("https://dl/3", "/b/3.html")]);
        store.save_batch("/fg", &batch).await.unwrap();
        store
            .write_manifest("/fg", &FailureManifest::new(1, vec!["/b/3.html".to_string()]))
            .await
            .unwrap();

        store.save_batch("/fg", &batch).await.unwrap();

        assert!(store.read_manifest("/fg", 1).await.unwrap().is_none());
        assert_eq!(store.load_batch("/fg", 1).await.unwrap(), Some(batch));
        assert!(store.load_batch("/other", 1).await.unwrap().is_none());
    }
}

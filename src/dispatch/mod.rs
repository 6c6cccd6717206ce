//! # Stage Dispatch
//!
//! Fire-and-forget invocation of pipeline stages. A dispatcher only waits long
//! enough to obtain a [`DispatchHandle`] (the request-accepted acknowledgment)
//! or a failure; the dispatched stage's own progress is observable only through
//! the status store.
//!
//! ## Backends
//!
//! - [`LocalDispatcher`]: runs registered [`ActionHandler`]s as tokio tasks in
//!   this process
//! - [`OpenWhiskDispatcher`]: non-blocking action invocation over HTTP
//!
//! Every call site that dispatches and then records the outcome goes through
//! [`dispatch_with_status`], so batch dispatch and stage chaining share one
//! success/failure bookkeeping path.

pub mod local;
pub mod openwhisk;
pub mod registry;

use crate::constants::messages;
use crate::error::Result;
use crate::state_machine::JobStatus;
use crate::status::{StatusRecord, StatusTracker, StatusUpdate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{error, info};
use uuid::Uuid;

pub use local::LocalDispatcher;
pub use openwhisk::OpenWhiskDispatcher;
pub use registry::{ActionHandler, ActionRegistry};

/// Opaque acknowledgment returned by a dispatcher (an activation id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DispatchHandle(String);

impl DispatchHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh handle for in-process dispatch
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DispatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Starts a named stage asynchronously without waiting for it to finish
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn invoke(&self, action: &str, params: Value) -> Result<DispatchHandle>;
}

/// What one dispatch attempt produced, after its status write
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub action: String,
    pub handle: Option<DispatchHandle>,
    pub error: Option<String>,
    /// Record returned by the status write, when it succeeded
    pub record: Option<StatusRecord>,
}

impl DispatchOutcome {
    pub fn is_dispatched(&self) -> bool {
        self.handle.is_some()
    }
}

/// Dispatch `action` and record the outcome on `tracker`.
///
/// On success `on_success` builds the merge update from the new handle. On
/// failure the record gets `FAILED` with a "Failed to invoke actions" message
/// naming `unit`. A failed status write is logged and leaves `record` empty;
/// it never turns a successful dispatch into a failed one.
pub async fn dispatch_with_status<F>(
    dispatcher: &dyn Dispatcher,
    action: &str,
    params: Value,
    tracker: &StatusTracker,
    unit: &str,
    on_success: F,
) -> DispatchOutcome
where
    F: FnOnce(&DispatchHandle) -> StatusUpdate,
{
    match dispatcher.invoke(action, params).await {
        Ok(handle) => {
            info!(
                action = action,
                unit = unit,
                dispatch_handle = %handle,
                status_key = %tracker.key(),
                "Dispatched stage"
            );
            let record = tracker
                .update(on_success(&handle))
                .await
                .map_err(|e| {
                    error!(status_key = %tracker.key(), error = %e, "Failed to record dispatch handle");
                })
                .ok();
            DispatchOutcome {
                action: action.to_string(),
                handle: Some(handle),
                error: None,
                record,
            }
        }
        Err(e) => {
            error!(action = action, unit = unit, error = %e, "Stage dispatch failed");
            let message = format!("{} for {unit}: {e}", messages::FAILED_TO_INVOKE);
            let record = tracker
                .update(StatusUpdate::status_message(JobStatus::Failed, message))
                .await
                .map_err(|write_err| {
                    error!(status_key = %tracker.key(), error = %write_err, "Failed to record dispatch failure");
                })
                .ok();
            DispatchOutcome {
                action: action.to_string(),
                handle: None,
                error: Some(e.to_string()),
                record,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{InMemoryStatusStore, StatusKey};
    use crate::test_helpers::RecordingDispatcher;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_handle_serializes_as_plain_string() {
        let handle = DispatchHandle::new("abc123");
        assert_eq!(serde_json::to_value(&handle).unwrap(), json!("abc123"));
        assert_eq!(DispatchHandle::generate().as_str().len(), 32);
    }

    #[tokio::test]
    async fn test_success_applies_caller_update() {
        let store = Arc::new(InMemoryStatusStore::new());
        let tracker = StatusTracker::new(store, StatusKey::job("/fg"));
        let dispatcher = RecordingDispatcher::new();

        let outcome = dispatch_with_status(&dispatcher, "stage", json!({}), &tracker, "Batch-0", |h| {
            StatusUpdate::with_status(JobStatus::InProgress).batch_handle(0, h.clone())
        })
        .await;

        assert!(outcome.is_dispatched());
        let record = tracker.read().await.unwrap();
        assert_eq!(record.status, Some(JobStatus::InProgress));
        assert_eq!(record.batch_handles.get(&0), outcome.handle.as_ref());
    }

    #[tokio::test]
    async fn test_failure_writes_failed_status() {
        let store = Arc::new(InMemoryStatusStore::new());
        let tracker = StatusTracker::new(store, StatusKey::job("/fg"));
        let dispatcher = RecordingDispatcher::new().failing_action("stage");

        let outcome = dispatch_with_status(&dispatcher, "stage", json!({}), &tracker, "Batch-3", |_| {
            StatusUpdate::new()
        })
        .await;

        assert!(!outcome.is_dispatched());
        let record = tracker.read().await.unwrap();
        assert_eq!(record.status, Some(JobStatus::Failed));
        let message = record.status_message.unwrap();
        assert!(message.starts_with(messages::FAILED_TO_INVOKE));
        assert!(message.contains("Batch-3"));
    }
}

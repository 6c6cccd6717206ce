//! # Local Dispatcher
//!
//! In-process dispatch: each invocation spawns the registered handler on the
//! tokio runtime and returns a generated handle immediately. Join handles are
//! kept so a caller (the CLI's local mode, integration tests) can wait for the
//! whole fan-out to drain.

use super::registry::ActionRegistry;
use super::{DispatchHandle, Dispatcher};
use crate::error::{PromoteError, Result};
use crate::orchestration::types::ActionResponse;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

pub struct LocalDispatcher {
    registry: Arc<ActionRegistry>,
    in_flight: DashMap<DispatchHandle, (String, JoinHandle<ActionResponse>)>,
}

impl LocalDispatcher {
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self {
            registry,
            in_flight: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Wait for one dispatched stage; `None` if the handle is unknown or already awaited
    pub async fn wait_for(&self, handle: &DispatchHandle) -> Option<ActionResponse> {
        let (_, (action, join)) = self.in_flight.remove(handle)?;
        Some(Self::join(handle, &action, join).await)
    }

    /// Wait until no dispatched stage is running, including stages dispatched
    /// by stages that were already running
    pub async fn wait_for_all(&self) -> Vec<(DispatchHandle, ActionResponse)> {
        let mut responses = Vec::new();
        loop {
            let handles: Vec<DispatchHandle> =
                self.in_flight.iter().map(|entry| entry.key().clone()).collect();
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Some(response) = self.wait_for(&handle).await {
                    responses.push((handle, response));
                }
            }
        }
        responses
    }

    /// Drop registered handlers so dispatcher and handlers can be freed
    pub fn shutdown(&self) {
        self.registry.clear();
    }

    async fn join(
        handle: &DispatchHandle,
        action: &str,
        join: JoinHandle<ActionResponse>,
    ) -> ActionResponse {
        match join.await {
            Ok(response) => response,
            Err(e) => {
                error!(action = action, dispatch_handle = %handle, error = %e, "Dispatched stage aborted");
                ActionResponse::error(500, format!("{action} aborted: {e}"))
            }
        }
    }
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
    async fn invoke(&self, action: &str, params: Value) -> Result<DispatchHandle> {
        let handler = self
            .registry
            .get(action)
            .ok_or_else(|| PromoteError::dispatch(action, "no handler registered"))?;

        let handle = DispatchHandle::generate();
        debug!(action = action, dispatch_handle = %handle, "Spawning local stage");
        let join = tokio::spawn(async move { handler.handle(params).await });
        self.in_flight
            .insert(handle.clone(), (action.to_string(), join));
        Ok(handle)
    }
}

impl std::fmt::Debug for LocalDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDispatcher")
            .field("registry", &self.registry)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

use crate::dispatch::{DispatchHandle, Dispatcher};
use crate::error::{PromoteError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;

/// Dispatcher that records every invocation and starts nothing
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    failing_actions: HashSet<String>,
    failing_calls: HashSet<usize>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every invocation of `action`
    pub fn failing_action(mut self, action: &str) -> Self {
        self.failing_actions.insert(action.to_string());
        self
    }

    /// Reject the invocation with this zero-based call index
    pub fn failing_call(mut self, index: usize) -> Self {
        self.failing_calls.insert(index);
        self
    }

    /// Every invocation attempt, accepted or rejected, in call order
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn invoke(&self, action: &str, params: Value) -> Result<DispatchHandle> {
        let index = {
            let mut calls = self.calls.lock();
            calls.push((action.to_string(), params));
            calls.len() - 1
        };
        if self.failing_actions.contains(action) || self.failing_calls.contains(&index) {
            return Err(PromoteError::dispatch(action, "503 Service Unavailable"));
        }
        Ok(DispatchHandle::new(format!("activation-{index}")))
    }
}

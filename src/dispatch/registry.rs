//! # Action Registry
//!
//! Name-to-handler table used by in-process dispatch. Each pipeline stage is
//! registered under its configured action name; the registry is shared by the
//! dispatcher and the handlers it runs.

use crate::orchestration::types::ActionResponse;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// One pipeline stage entry point, invoked with the stage's raw parameters
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, params: Value) -> ActionResponse;
}

/// Thread-safe registry of stage handlers keyed by action name
#[derive(Default)]
pub struct ActionRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ActionHandler>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any handler already under that name
    pub fn register(&self, action: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        let action = action.into();
        let replaced = self
            .handlers
            .write()
            .insert(action.clone(), handler)
            .is_some();
        info!(action = %action, replaced = replaced, "Registered action handler");
    }

    pub fn get(&self, action: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.read().get(action).cloned()
    }

    pub fn contains(&self, action: &str) -> bool {
        self.handlers.read().contains_key(action)
    }

    pub fn actions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every handler; handlers holding a dispatcher keep the registry alive otherwise
    pub fn clear(&self) {
        let mut handlers = self.handlers.write();
        debug!(count = handlers.len(), "Clearing action handlers");
        handlers.clear();
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.actions())
            .finish()
    }
}

//! # Promotion Configuration System
//!
//! One explicit configuration object per job or batch invocation. Nothing in the
//! pipeline reads ambient or process-wide mutable settings: the loaded
//! [`PromoteConfig`] is wrapped in a `PromotionContext` and passed to every
//! component.
//!
//! ## Layering
//!
//! 1. Built-in defaults (see [`crate::constants::defaults`])
//! 2. `<config_dir>/floodgate.toml`
//! 3. `<config_dir>/floodgate.<environment>.toml`
//! 4. Environment variables, e.g. `FLOODGATE__PROMOTION__BATCH_SIZE=25`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use floodgate_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let batch_size = manager.config().promotion.batch_size;
//! let pause = manager.config().promotion.chunk_pause();
//! # Ok(())
//! # }
//! ```

pub mod loader;

use crate::constants::{actions, defaults};
use crate::error::{PromoteError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use loader::ConfigManager;

/// Root configuration structure mirroring floodgate.toml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PromoteConfig {
    /// Batch sizing, chunking and pacing
    pub promotion: PromotionConfig,

    /// Copy-status polling bounds
    pub copy_poll: CopyPollConfig,

    /// Folder listing settings
    pub enumeration: EnumerationConfig,

    /// Remote drive API settings
    pub storage: StorageConfig,

    /// Worker invocation settings
    pub dispatch: DispatchConfig,

    /// Status and batch persistence backend
    pub status_store: StatusStoreConfig,

    /// Structured logging settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PromotionConfig {
    pub batch_size: usize,
    pub bulk_request_size: usize,
    pub chunk_pause_ms: u64,
    pub settle_delay_ms: u64,
    /// Drive path of the primary content tree that files are promoted into
    pub primary_root: String,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            bulk_request_size: defaults::BULK_REQUEST_SIZE,
            chunk_pause_ms: defaults::CHUNK_PAUSE_MS,
            settle_delay_ms: defaults::SETTLE_DELAY_MS,
            primary_root: String::new(),
        }
    }
}

impl PromotionConfig {
    pub fn chunk_pause(&self) -> Duration {
        Duration::from_millis(self.chunk_pause_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CopyPollConfig {
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub multiplier: f64,
}

impl Default for CopyPollConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::COPY_POLL_MAX_ATTEMPTS,
            initial_interval_ms: defaults::COPY_POLL_INITIAL_INTERVAL_MS,
            max_interval_ms: defaults::COPY_POLL_MAX_INTERVAL_MS,
            multiplier: defaults::COPY_POLL_MULTIPLIER,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnumerationConfig {
    pub page_size: usize,
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            page_size: defaults::LIST_PAGE_SIZE,
        }
    }
}

/// Stand-in for a secret value in `Debug` output and sanitized dumps
pub(crate) fn mask_secret(value: &str) -> &'static str {
    if value.is_empty() {
        "[EMPTY]"
    } else {
        "[MASKED]"
    }
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Drive API base for the staging tree, e.g. `https://graph.microsoft.com/v1.0/drives/{id}`
    pub staging_drive_url: String,
    /// Drive API base for the primary tree
    pub primary_drive_url: String,
    /// Drive id placed in copy requests' parent reference
    pub primary_drive_id: Option<String>,
    /// Bearer token; acquiring it is the caller's job
    pub access_token: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            staging_drive_url: String::new(),
            primary_drive_url: String::new(),
            primary_drive_id: None,
            access_token: String::new(),
            timeout_ms: defaults::HTTP_TIMEOUT_MS,
            max_retries: defaults::HTTP_MAX_RETRIES,
            retry_base_delay_ms: defaults::HTTP_RETRY_BASE_DELAY_MS,
        }
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("staging_drive_url", &self.staging_drive_url)
            .field("primary_drive_url", &self.primary_drive_url)
            .field("primary_drive_id", &self.primary_drive_id)
            .field("access_token", &mask_secret(&self.access_token))
            .field("timeout_ms", &self.timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchBackend {
    /// Run stages as tokio tasks inside this process
    #[default]
    Local,
    /// Invoke stages as non-blocking OpenWhisk actions
    Openwhisk,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ActionNames {
    pub promote: String,
    pub create_batch: String,
    pub promote_worker: String,
    /// Stage chained after each batch's copy phase; batches end after copying when unset
    pub post_copy: Option<String>,
}

impl Default for ActionNames {
    fn default() -> Self {
        Self {
            promote: actions::PROMOTE.to_string(),
            create_batch: actions::CREATE_BATCH.to_string(),
            promote_worker: actions::PROMOTE_WORKER.to_string(),
            post_copy: None,
        }
    }
}

#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub backend: DispatchBackend,
    pub api_host: String,
    pub namespace: String,
    /// `user:password` pair for the OpenWhisk API
    pub auth_key: String,
    pub actions: ActionNames,
}

impl fmt::Debug for DispatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchConfig")
            .field("backend", &self.backend)
            .field("api_host", &self.api_host)
            .field("namespace", &self.namespace)
            .field("auth_key", &mask_secret(&self.auth_key))
            .field("actions", &self.actions)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusStoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatusStoreConfig {
    pub backend: StatusStoreBackend,
    /// May carry the database password
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl fmt::Debug for StatusStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusStoreConfig")
            .field("backend", &self.backend)
            .field(
                "database_url",
                &self.database_url.as_deref().map(mask_secret),
            )
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl Default for StatusStoreConfig {
    fn default() -> Self {
        Self {
            backend: StatusStoreBackend::Memory,
            database_url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive; falls back to an environment-based level
    pub level: Option<String>,
    /// Directory for JSON log files; console only when unset
    pub directory: Option<String>,
    /// Emit JSON on the console layer as well
    pub json: bool,
}

impl PromoteConfig {
    /// Validate configuration consistency and required fields
    pub fn validate(&self) -> Result<()> {
        let promotion = &self.promotion;
        if promotion.batch_size == 0 {
            return Err(PromoteError::configuration(
                "promotion.batch_size must be greater than 0",
            ));
        }
        if promotion.bulk_request_size == 0 {
            return Err(PromoteError::configuration(
                "promotion.bulk_request_size must be greater than 0",
            ));
        }
        if promotion.bulk_request_size > promotion.batch_size {
            return Err(PromoteError::configuration(format!(
                "promotion.bulk_request_size ({}) must not exceed promotion.batch_size ({})",
                promotion.bulk_request_size, promotion.batch_size
            )));
        }
        if self.copy_poll.max_attempts == 0 {
            return Err(PromoteError::configuration(
                "copy_poll.max_attempts must be greater than 0",
            ));
        }
        if self.copy_poll.multiplier < 1.0 {
            return Err(PromoteError::configuration(
                "copy_poll.multiplier must be at least 1.0",
            ));
        }
        if self.enumeration.page_size == 0 {
            return Err(PromoteError::configuration(
                "enumeration.page_size must be greater than 0",
            ));
        }

        if self.dispatch.backend == DispatchBackend::Openwhisk {
            let mut missing = Vec::new();
            if self.dispatch.api_host.is_empty() {
                missing.push("dispatch.api_host");
            }
            if self.dispatch.namespace.is_empty() {
                missing.push("dispatch.namespace");
            }
            if self.dispatch.auth_key.is_empty() {
                missing.push("dispatch.auth_key");
            }
            if !missing.is_empty() {
                return Err(PromoteError::configuration(format!(
                    "openwhisk dispatch requires {}",
                    missing.join(", ")
                )));
            }
        }

        if self.status_store.backend == StatusStoreBackend::Postgres
            && self
                .status_store
                .database_url
                .as_deref()
                .map_or(true, str::is_empty)
        {
            return Err(PromoteError::configuration(
                "postgres status store requires status_store.database_url",
            ));
        }

        Ok(())
    }
}

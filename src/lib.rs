#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, OpenWhisk in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Floodgate Core
//!
//! Asynchronous batch promotion of files from a staging ("floodgated") content
//! tree to the primary content tree.
//!
//! ## Overview
//!
//! A promotion job is too large for one request, so it runs as a pipeline of
//! independently dispatched stages. The job stage enumerates the staging tree
//! and fans out one worker per fixed-size batch; each worker promotes its files
//! in bounded-concurrency chunks (server-side copy, falling back to download
//! and upload), records failures in a manifest, and chains the next stage.
//! No process supervises the whole job: stages coordinate only through the
//! keyed status store.
//!
//! ## Module Organization
//!
//! - [`orchestration`] - Pipeline stages: enumeration, batching, promotion, chaining
//! - [`status`] - Job and batch status records and their stores
//! - [`state_machine`] - Job lifecycle states and the monotonic transition guard
//! - [`dispatch`] - Fire-and-forget stage invocation (in-process or OpenWhisk)
//! - [`storage`] - Remote drive API and its HTTP client
//! - [`resilience`] - Bounded backoff for retries and copy polling
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging bootstrap
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use floodgate_core::config::ConfigManager;
//! use floodgate_core::orchestration::{JobParams, PromotionSystem};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! floodgate_core::logging::init_structured_logging(&manager.config().logging);
//!
//! let system = PromotionSystem::bootstrap(manager).await?;
//! let response = system
//!     .start_job(JobParams::new("/fg-site", "https://example.com/tools/floodgate", "/projects/p.xlsx"))
//!     .await;
//! println!("{response:?}");
//!
//! system.wait_for_idle().await;
//! let summary = system.summarize("/fg-site").await?;
//! println!("failed files: {:?}", summary.failed_paths());
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod orchestration;
pub mod resilience;
pub mod state_machine;
pub mod status;
pub mod storage;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::{ConfigManager, PromoteConfig};
pub use dispatch::{DispatchHandle, Dispatcher};
pub use error::{PromoteError, Result};
pub use orchestration::{
    ActionResponse, Batch, BatchParams, FileRecord, JobParams, PromotionContext, PromotionSystem,
};
pub use state_machine::{JobStatus, PipelineStage};
pub use status::{JobSummary, StatusKey, StatusRecord, StatusTracker, StatusUpdate};
pub use storage::StorageApi;

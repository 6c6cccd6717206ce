//! # Pipeline Constants
//!
//! Action names, default sizes and the status messages written by each stage.
//! Defaults here are the values `PromoteConfig` falls back to when a setting
//! is not supplied.

/// Default action names for each pipeline stage
pub mod actions {
    pub const PROMOTE: &str = "floodgate/promote";
    pub const CREATE_BATCH: &str = "floodgate/promote-create-batch";
    pub const PROMOTE_WORKER: &str = "floodgate/promote-worker";
    pub const POST_COPY: &str = "floodgate/post-copy-worker";
}

/// Default sizing and pacing
pub mod defaults {
    /// Maximum files per dispatched batch
    pub const BATCH_SIZE: usize = 50;
    /// Files promoted concurrently inside one batch
    pub const BULK_REQUEST_SIZE: usize = 20;
    /// Pause between chunks inside one batch
    pub const CHUNK_PAUSE_MS: u64 = 3000;
    /// Pause after the copy phase before chaining the next stage
    pub const SETTLE_DELAY_MS: u64 = 3000;
    /// Children requested per folder listing page
    pub const LIST_PAGE_SIZE: usize = 1000;

    pub const COPY_POLL_MAX_ATTEMPTS: u32 = 60;
    pub const COPY_POLL_INITIAL_INTERVAL_MS: u64 = 500;
    pub const COPY_POLL_MAX_INTERVAL_MS: u64 = 5000;
    pub const COPY_POLL_MULTIPLIER: f64 = 2.0;

    pub const HTTP_TIMEOUT_MS: u64 = 30_000;
    pub const HTTP_MAX_RETRIES: u32 = 3;
    pub const HTTP_RETRY_BASE_DELAY_MS: u64 = 1000;
}

/// Status messages shared between stages and tests
pub mod messages {
    pub const TRIGGERING_PROMOTE: &str = "Triggering promote action";
    pub const GETTING_FILES: &str = "Getting all files to be promoted.";
    pub const PARTIAL_FAILURE: &str = "Error occurred when promoting floodgated content. Check the batch failure manifest for additional information.";
    pub const FAILED_TO_INVOKE: &str = "Failed to invoke actions";
}

/// Label used in logs and status messages for a batch
pub fn batch_label(batch_number: u32) -> String {
    format!("Batch-{batch_number}")
}

//! # Resilience Module
//!
//! Bounded retry and polling policies for calls against the remote storage API.
//!
//! ## Usage
//!
//! ```rust
//! use floodgate_core::resilience::BackoffPolicy;
//! use std::time::Duration;
//!
//! let policy = BackoffPolicy::new(Duration::from_millis(500), Duration::from_secs(5), 2.0, 60);
//! assert_eq!(policy.delay_for(1), Duration::from_secs(1));
//! assert!(!policy.allows_retry(60));
//! ```

pub mod backoff;

pub use backoff::BackoffPolicy;

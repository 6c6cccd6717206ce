//! # Status Tracker
//!
//! Durable keyed progress records for jobs and batches. The status store is the
//! only state shared between pipeline stages: a stage finishes by writing its
//! outcome here, and any later reader (another stage, another process, the
//! operator CLI) sees that write.
//!
//! ## Keys
//!
//! - `StatusKey::job(root)`: job-level transitions only
//! - `StatusKey::batch(root, n)`: one batch's progress, independent from
//!   sibling batches and from the job record
//!
//! ## Write semantics
//!
//! Every write is a field-level merge ([`StatusRecord::apply`]). Map fields
//! (`details`, `batch_handles`) merge entry by entry, so concurrent writers on
//! the job key never overwrite each other's distinct entries. A terminal status
//! is never replaced by a non-terminal one; only [`StatusStore::clear`] resets.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod record;
pub mod store;
pub mod tracker;

pub use memory::InMemoryStatusStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStatusStore;
pub use record::{StatusKey, StatusRecord, StatusUpdate};
pub use store::{BatchStore, StatusStore};
pub use tracker::{BatchSummary, JobSummary, StatusTracker};

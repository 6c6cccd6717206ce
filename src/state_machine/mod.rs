// State machine module for promotion jobs and batches
//
// STARTED -> IN_PROGRESS -> {COMPLETED, COMPLETED_WITH_ERROR, FAILED}

pub mod guards;
pub mod states;

pub use guards::{MonotonicLifecycleGuard, TransitionDecision};
pub use states::{JobStatus, PipelineStage};

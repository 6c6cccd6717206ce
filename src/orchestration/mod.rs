//! # Promotion Orchestration
//!
//! The asynchronous batch promotion pipeline, stage by stage:
//!
//! ```text
//! start_job ──▶ create_batches ──▶ (N) BatchPromotionExecutor ──▶ next stage
//!                 │                        │
//!                 ├ FileTreeEnumerator     ├ ChunkSchedule + FilePromoter
//!                 └ BatchDispatcher        └ PipelineStageChainer
//! ```
//!
//! Every arrow is a fire-and-forget dispatch. Stages share no memory; the only
//! coordination between them is the status store.
//!
//! ## Core Components
//!
//! - **FileTreeEnumerator**: breadth-first listing of the staging tree
//! - **BatchDispatcher**: partitions files into batches and starts one worker each
//! - **BatchPromotionExecutor**: chunked copy-or-upload of one batch
//! - **PipelineStageChainer**: hands a finished batch to the next stage
//! - **PromotionOrchestrator**: job start and batch creation stages
//! - **PromotionSystem**: wires configuration into collaborators

pub mod actions;
pub mod bootstrap;
pub mod chunk_schedule;
pub mod context;
pub mod enumerator;
pub mod orchestrator;
pub mod partitioner;
pub mod promotion_executor;
pub mod stage_chainer;
pub mod types;

pub use actions::{
    register_pipeline_actions, CreateBatchAction, PromoteJobAction, PromoteWorkerAction,
};
pub use bootstrap::{PromotionSystem, SystemStatus};
pub use chunk_schedule::ChunkSchedule;
pub use context::PromotionContext;
pub use enumerator::FileTreeEnumerator;
pub use orchestrator::PromotionOrchestrator;
pub use partitioner::{partition, BatchDispatch, BatchDispatcher};
pub use promotion_executor::{BatchPromotionExecutor, CopyOutcome, FilePromoter};
pub use stage_chainer::PipelineStageChainer;
pub use types::{
    ActionResponse, Batch, BatchParams, BatchReport, FailureManifest, FileOutcome, FileRecord,
    JobParams, NextStageParams, PromotionMethod,
};

use floodgate_core::orchestration::FileRecord;
use floodgate_core::state_machine::{JobStatus, PipelineStage};
use floodgate_core::status::StatusUpdate;
use floodgate_core::DispatchHandle;
use proptest::prelude::*;

/// Relative file paths one or two folders deep
pub fn relative_path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z0-9]{1,8}", 1..=3).prop_map(|segments| {
        let mut path = String::new();
        for segment in &segments[..segments.len() - 1] {
            path.push('/');
            path.push_str(segment);
        }
        path.push('/');
        path.push_str(&segments[segments.len() - 1]);
        path.push_str(".html");
        path
    })
}

/// Enumerated files with distinct download URLs, in enumeration order
pub fn file_list_strategy(max: usize) -> impl Strategy<Value = Vec<FileRecord>> {
    prop::collection::vec(relative_path_strategy(), 0..=max).prop_map(|paths| {
        paths
            .into_iter()
            .enumerate()
            .map(|(i, path)| FileRecord::new(format!("https://staging.test/{i}{path}"), path))
            .collect()
    })
}

pub fn job_status_strategy() -> impl Strategy<Value = JobStatus> {
    prop_oneof![
        Just(JobStatus::Started),
        Just(JobStatus::InProgress),
        Just(JobStatus::Completed),
        Just(JobStatus::CompletedWithError),
        Just(JobStatus::Failed),
    ]
}

pub fn stage_strategy() -> impl Strategy<Value = PipelineStage> {
    prop_oneof![
        Just(PipelineStage::CreateBatch),
        Just(PipelineStage::PromoteCopy),
        Just(PipelineStage::PostCopy),
    ]
}

/// Partial status updates of the kinds pipeline stages write
pub fn status_update_strategy() -> impl Strategy<Value = StatusUpdate> {
    (
        prop::option::of(job_status_strategy()),
        prop::option::of("[A-Za-z ]{1,24}"),
        prop::option::of((stage_strategy(), job_status_strategy())),
        prop::option::of((0u32..8, "[a-f0-9]{8}")),
    )
        .prop_map(|(status, message, detail, handle)| {
            let mut update = StatusUpdate::new();
            if let Some(status) = status {
                update = update.status(status);
            }
            if let Some(message) = message {
                update = update.message(message);
            }
            if let Some((stage, stage_status)) = detail {
                update = update.detail(stage, stage_status);
            }
            if let Some((batch_number, handle)) = handle {
                update = update.batch_handle(batch_number, DispatchHandle::new(handle));
            }
            update
        })
}

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use floodgate_core::orchestration::{partition, FileRecord};
use floodgate_core::state_machine::{JobStatus, PipelineStage};
use floodgate_core::status::{StatusKey, StatusRecord, StatusUpdate};
use floodgate_core::DispatchHandle;

fn file_list(count: usize) -> Vec<FileRecord> {
    (0..count)
        .map(|i| {
            let path = format!("/section-{}/page-{i}.html", i % 40);
            FileRecord::new(format!("https://staging.test{path}"), path)
        })
        .collect()
}

fn benchmark_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");
    for count in [1_000usize, 10_000, 50_000] {
        let files = file_list(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &files, |b, files| {
            b.iter(|| partition(black_box(files.clone()), black_box(50)))
        });
    }
    group.finish();
}

fn benchmark_status_merge(c: &mut Criterion) {
    let key = StatusKey::job("/fg-site");
    let updates: Vec<StatusUpdate> = (0..1_000u32)
        .map(|n| {
            StatusUpdate::with_status(JobStatus::InProgress)
                .batch_handle(n, DispatchHandle::new(format!("activation-{n}")))
        })
        .collect();

    c.bench_function("merge_1000_batch_handles", |b| {
        b.iter(|| {
            let mut record = StatusRecord::default();
            record.apply(&key, &StatusUpdate::status_message(JobStatus::Started, "start"));
            for update in &updates {
                record.apply(&key, black_box(update));
            }
            record.apply(
                &key,
                &StatusUpdate::new().detail(PipelineStage::CreateBatch, JobStatus::Completed),
            );
            record
        })
    });
}

criterion_group!(benches, benchmark_partition, benchmark_status_merge);
criterion_main!(benches);

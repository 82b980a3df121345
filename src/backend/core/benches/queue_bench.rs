//! Benchmarks for the work queue, status tracker and in-memory lock path.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use lockstep_core::jobs::{action_fn, Job, StatusTracker, WorkQueue};
use lockstep_core::lock::{LockBackend, LockCoordinator, LockOptions, QuorumLockBackend};

fn noop(id: String) -> Job {
    Job::from_fn(id, || async { Ok(()) })
}

fn bench_queue_enqueue_dequeue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_enqueue_dequeue");
    for size in [100usize, 1_000, 10_000] {
        let ids: Vec<String> = (0..size).map(|i| format!("job-{}", i)).collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &ids, |b, ids| {
            b.iter(|| {
                let queue = WorkQueue::new();
                for id in ids { queue.enqueue(noop(id.clone())); }
                while let Some(job) = queue.try_dequeue() { black_box(job); }
            });
        });
    }
    group.finish();
}

fn bench_queue_duplicate_rejection(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_duplicate_rejection");
    let queue = WorkQueue::new();
    for i in 0..1_000 { queue.enqueue(noop(format!("job-{}", i))); }
    let duplicate = noop("job-500".to_string());
    group.bench_function("reject", |b| { b.iter(|| black_box(queue.enqueue(duplicate.clone()))); });
    group.bench_function("contains", |b| { b.iter(|| black_box(queue.contains("job-999"))); });
    group.finish();
}

fn bench_tracker_transitions(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracker_transitions");
    let tracker = StatusTracker::new();
    group.bench_function("start_complete", |b| { b.iter(|| { tracker.start("bench-job"); black_box(tracker.complete("bench-job")); }); });
    for size in [100usize, 10_000] {
        let tracker = StatusTracker::new();
        for i in 0..size { let id = format!("job-{}", i); tracker.start(&id); tracker.complete(&id); }
        group.bench_with_input(BenchmarkId::new("get_all", size), &tracker, |b, t| { b.iter(|| black_box(t.get_all())); });
        group.bench_with_input(BenchmarkId::new("summary", size), &tracker, |b, t| { b.iter(|| black_box(t.summary())); });
    }
    group.finish();
}

fn bench_in_memory_quorum(c: &mut Criterion) {
    let mut group = c.benchmark_group("in_memory_quorum");
    let rt = tokio::runtime::Runtime::new().unwrap();
    let options = LockOptions::default();
    for nodes in [1usize, 3, 5] {
        let backend = QuorumLockBackend::in_memory(nodes);
        group.bench_with_input(BenchmarkId::new("acquire_release", nodes), &backend, |b, backend| {
            b.iter(|| { rt.block_on(async { let lease = backend.acquire("bench", &options).await.unwrap().unwrap(); backend.release(&lease).await.unwrap(); }); });
        });
    }
    let coordinator = LockCoordinator::new(Arc::new(QuorumLockBackend::in_memory(3)), options.clone());
    let action = action_fn(|| async { Ok(()) });
    group.bench_function("execute_with_lock", |b| { b.iter(|| { rt.block_on(async { black_box(coordinator.execute_with_lock("bench", action.clone()).await.unwrap()); }); }); });
    group.finish();
}

criterion_group!(benches, bench_queue_enqueue_dequeue, bench_queue_duplicate_rejection, bench_tracker_transitions, bench_in_memory_quorum);
criterion_main!(benches);

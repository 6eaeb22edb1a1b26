//! Benchmarks for the dispatch engine.
//!
//! Benchmarks cover:
//! - Admission pool acquire/release
//! - Batch queue refills from a long source
//! - End-to-end runs at several degrees of parallelism

#![allow(missing_docs)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

use prometheus_dop_engine::builders::RunnerBuilder;
use prometheus_dop_engine::config::EngineConfig;
use prometheus_dop_engine::core::{
    AdmissionPool, BatchQueue, EngineMetrics, Runner, StopController, StopSignal, WorkExecutor,
};

use async_trait::async_trait;
use tokio::runtime::Runtime;

// ============================================================================
// Work Function
// ============================================================================

struct BenchWork;

#[async_trait]
impl WorkExecutor<u64> for BenchWork {
    async fn execute(&self, item: u64, _stop: StopSignal) -> anyhow::Result<()> {
        black_box(item.wrapping_mul(31));
        tokio::task::yield_now().await;
        Ok(())
    }
}

// ============================================================================
// Admission Pool
// ============================================================================

fn bench_pool_acquire_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_acquire_release");

    for capacity in [1usize, 8, 64] {
        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                b.to_async(Runtime::new().unwrap()).iter(|| async move {
                    let pool = Arc::new(AdmissionPool::new(
                        capacity,
                        capacity,
                        Arc::new(EngineMetrics::default()),
                    ));
                    let controller = StopController::new();
                    let signal = controller.signal();
                    for _ in 0..1000 {
                        let permit = pool.acquire(&signal).await.unwrap();
                        black_box(&permit);
                    }
                });
            },
        );
    }
    group.finish();
}

// ============================================================================
// Batch Queue
// ============================================================================

fn bench_batch_refill(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_refill");

    for target in [16usize, 128, 1024] {
        group.throughput(Throughput::Elements(100_000));
        group.bench_with_input(BenchmarkId::from_parameter(target), &target, |b, &target| {
            b.iter(|| {
                let (mut queue, _) = BatchQueue::new(Box::new(0..100_000u64), 0, target);
                while !queue.is_drained() {
                    queue.replenish();
                    while let Some(item) = queue.pop() {
                        black_box(item);
                    }
                }
            });
        });
    }
    group.finish();
}

// ============================================================================
// End-to-End Runs
// ============================================================================

fn bench_run_to_completion(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_to_completion");
    group.sample_size(20);

    for dop in [1usize, 4, 16] {
        group.throughput(Throughput::Elements(2000));
        group.bench_with_input(BenchmarkId::from_parameter(dop), &dop, |b, &dop| {
            b.to_async(Runtime::new().unwrap()).iter(|| async move {
                let config = EngineConfig::new()
                    .with_max_degree_of_parallelism(16)
                    .with_degree_of_parallelism(dop)
                    .with_total_items(2000)
                    .with_drain_poll_interval_ms(1);
                let runner: Runner<u64, BenchWork> =
                    RunnerBuilder::new(config, BenchWork).build().unwrap();
                runner.start(0..2000u64).unwrap();
                runner.wait().await.unwrap();
                black_box(runner.metrics());
            });
        });
    }
    group.finish();
}

criterion_group!(pool_benches, bench_pool_acquire_release);

criterion_group!(queue_benches, bench_batch_refill);

criterion_group!(scenario_benches, bench_run_to_completion);

criterion_main!(pool_benches, queue_benches, scenario_benches);

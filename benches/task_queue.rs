//! Priority queue benchmarks: enqueue throughput and ordered drain.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use tokio::runtime::Runtime;

use vigia::domain::models::TaskPriority;
use vigia::services::queue::{PriorityQueueService, QueueConfig};

fn priorities() -> [TaskPriority; 5] {
    [
        TaskPriority::Critical,
        TaskPriority::High,
        TaskPriority::Normal,
        TaskPriority::Low,
        TaskPriority::Background,
    ]
}

fn bench_enqueue(c: &mut Criterion) {
    let runtime = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("queue_enqueue");

    for size in [100usize, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                runtime.block_on(async {
                    let queue = PriorityQueueService::new(QueueConfig::default());
                    let levels = priorities();
                    for i in 0..size {
                        queue
                            .enqueue(
                                "bench",
                                json!({ "i": i }),
                                levels[i % levels.len()],
                                None,
                                3,
                                None,
                                None,
                            )
                            .await
                            .expect("enqueue");
                    }
                });
            });
        });
    }
    group.finish();
}

fn bench_enqueue_dequeue_drain(c: &mut Criterion) {
    let runtime = Runtime::new().expect("tokio runtime");

    c.bench_function("queue_drain_1000", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let queue = PriorityQueueService::new(QueueConfig::default());
                let levels = priorities();
                for i in 0..1_000usize {
                    queue
                        .enqueue(
                            "bench",
                            json!({ "i": i }),
                            levels[i % levels.len()],
                            None,
                            3,
                            None,
                            None,
                        )
                        .await
                        .expect("enqueue");
                }
                while queue.dequeue().await.is_some() {}
            });
        });
    });
}

criterion_group!(benches, bench_enqueue, bench_enqueue_dequeue_drain);
criterion_main!(benches);

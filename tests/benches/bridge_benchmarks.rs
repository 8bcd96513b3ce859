//! # Event Bridge Benchmarks
//!
//! | Path | What is measured |
//! |------|------------------|
//! | send | stamp, validate and delegate one message |
//! | persistent send | send plus replay queue append at capacity (eviction) |
//! | replay | persistent subscribe replaying a full backlog |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;
use tokio::runtime::Runtime;

use eb_tests::integration::fixtures::{tick, Collector, Hub};
use event_service::EventServiceConfig;
use shared_types::DeliveryOptions;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn bench_send(c: &mut Criterion) {
    let rt = runtime();
    let hub = Hub::<u32>::new();
    let sender = hub.service("sender");

    let mut group = c.benchmark_group("event-service-send");
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(1));

    group.bench_function("send_local", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(
                sender
                    .send_message("sink", tick(1), DeliveryOptions::local())
                    .await
                    .expect("send"),
            )
        })
    });

    let config = EventServiceConfig::new("bench", "persistent")
        .expect("config")
        .with_max_queue_size(100);
    let persistent = hub.service_with(config);
    group.bench_function("send_persistent_evicting", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(
                persistent
                    .send_message("sink", tick(1), DeliveryOptions::persistent())
                    .await
                    .expect("send"),
            )
        })
    });

    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("event-service-replay");

    for backlog in [10usize, 100, 1000] {
        let hub = Hub::<u32>::new();
        let config = EventServiceConfig::new("bench", "replay")
            .expect("config")
            .with_max_queue_size(backlog);
        let service = hub.service_with(config);
        rt.block_on(async {
            for n in 0..backlog as u32 {
                service
                    .send_message("replay", tick(n), DeliveryOptions::persistent())
                    .await
                    .expect("send");
            }
        });

        group.throughput(Throughput::Elements(backlog as u64));
        group.bench_with_input(BenchmarkId::new("subscribe_replay", backlog), &backlog, |b, _| {
            b.to_async(&rt).iter(|| async {
                let collector = Collector::new();
                let handle = service
                    .subscribe_to_messages(collector.callback(), DeliveryOptions::persistent())
                    .await
                    .expect("subscribe");
                let replayed = collector.len();
                handle.unsubscribe().await.expect("unsubscribe");
                black_box(replayed)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_send, bench_replay);
criterion_main!(benches);

//! Benchmarks for snapshot fan-out and lap accumulation
//!
//! Measures the publish path a tracker's poll thread pays on every tick:
//! - Topic::publish against growing subscriber counts
//! - Subscribe/unsubscribe churn while values are published
//! - LapAccumulator::observe over full laps of graphics snapshots
//!
//! Platform: Cross-platform (in-process only, CI-safe)

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use stint::test_utils::full_lap;
use stint::timing::{LapAccumulator, ValidityPolicy};
use stint::tracker::Topic;
use stint::types::PhysicsSnapshot;

fn bench_publish_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("topic_publish");

    for subscribers in [0usize, 1, 8, 32, 128] {
        let topic = Topic::<PhysicsSnapshot>::new("physics");
        let seen = Arc::new(AtomicU64::new(0));
        let _subscriptions: Vec<_> = (0..subscribers)
            .map(|_| {
                let seen = Arc::clone(&seen);
                topic.subscribe(move |physics| {
                    seen.fetch_add(physics.rpm as u64, Ordering::Relaxed);
                })
            })
            .collect();

        group.throughput(Throughput::Elements(subscribers.max(1) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(subscribers), &subscribers, |b, _| {
            let snapshot = PhysicsSnapshot { rpm: 7200, gear: 5, speed_kmh: 212.0, ..Default::default() };
            b.iter(|| black_box(topic.publish(black_box(snapshot.clone()))))
        });
    }

    group.finish();
}

fn bench_subscription_churn(c: &mut Criterion) {
    let topic = Topic::<PhysicsSnapshot>::new("physics");
    let _steady: Vec<_> = (0..16).map(|_| topic.subscribe(|physics| drop(black_box(physics)))).collect();

    c.bench_function("subscribe_publish_unsubscribe", |b| {
        b.iter(|| {
            let subscription = topic.subscribe(|physics| drop(black_box(physics)));
            topic.publish(PhysicsSnapshot::default());
            black_box(subscription.unsubscribe())
        })
    });
}

fn bench_lap_accumulator(c: &mut Criterion) {
    let laps: Vec<_> = (0..10).flat_map(|lap| full_lap(lap, [30_512, 41_207, 28_934])).collect();

    let mut group = c.benchmark_group("lap_accumulator");
    group.throughput(Throughput::Elements(laps.len() as u64));
    group.bench_function("observe_ten_laps", |b| {
        b.iter(|| {
            let mut accumulator = LapAccumulator::new(ValidityPolicy::Sticky);
            let finished = laps.iter().filter_map(|g| accumulator.observe(black_box(g))).count();
            black_box(finished)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_publish_fanout, bench_subscription_churn, bench_lap_accumulator);
criterion_main!(benches);

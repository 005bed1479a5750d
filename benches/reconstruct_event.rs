//! Benchmarks for the per-event fast tracking.
//!
//! Run with:
//!   cargo bench --bench reconstruct_event
//!   cargo bench reconstruct_event -- reconstruct_event/noisy_batch_50

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use fasttrack::fast_tracking::engine::FastTracking;
use fasttrack::geometry::plane_table::PlaneTable;

#[path = "../tests/common/mod.rs"]
mod common;

use common::{synthetic_event, synthetic_event_with, tracking_params, truth, EventOptions};

fn bench_single_event(c: &mut Criterion) {
    let table = PlaneTable::standard();
    let tracking = FastTracking::new(&table, tracking_params()).expect("tracking setup");
    let event = synthetic_event(&table, &truth());

    let mut group = c.benchmark_group("reconstruct_event");
    group.bench_function("single_track", |b| {
        b.iter(|| {
            let global = tracking.process_event(black_box(&event));
            black_box(global).ok();
        })
    });
    group.finish();
}

fn bench_noisy_batch(c: &mut Criterion) {
    let table = PlaneTable::standard();
    let tracking = FastTracking::new(&table, tracking_params()).expect("tracking setup");
    let options = EventOptions {
        drift_sigma: 0.01,
        n_noise_hits: 80,
        ..Default::default()
    };
    let mut rng = StdRng::seed_from_u64(42_u64);

    let mut group = c.benchmark_group("reconstruct_event");
    group.sample_size(20);
    group.bench_function("noisy_batch_50", |b| {
        b.iter_batched(
            || {
                (0..50)
                    .map(|_| synthetic_event_with(&table, &truth(), &options, Some(&mut rng)))
                    .collect::<Vec<_>>()
            },
            |events| {
                let results = tracking.reconstruct_batch(events.iter());
                black_box(results);
            },
            BatchSize::LargeInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_single_event, bench_noisy_batch);
criterion_main!(benches);

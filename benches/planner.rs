//! Benchmarks for the record and replay hot paths
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kinreplay::persistence::write_csv;
use kinreplay::replay::ReplayPlanner;
use kinreplay::trajectory::{RecordingLimits, SampleGate, TrajectoryBuffer};
use kinreplay::{TelemetrySample, Vec3};

fn wobbling_path(n: usize) -> Vec<TelemetrySample> {
    (0..n as u64)
        .map(|i| {
            let t = i as f64 * 0.01;
            // Every fifth sample repeats the previous position
            let k = (i - i % 5) as f64 * 0.01;
            let p = if i % 5 == 4 {
                Vec3::new(k, t.sin(), 0.5)
            } else {
                Vec3::new(t, t.sin(), 0.5)
            };
            TelemetrySample::new(i * 10, p).with_velocity(Vec3::new(1.0, t.cos(), 0.0))
        })
        .collect()
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan");
    let planner = ReplayPlanner::new().with_max_speed(Some(2.0));

    for size in [1_000, 10_000, 100_000].iter() {
        let samples = wobbling_path(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("steps", size), &samples, |b, samples| {
            b.iter(|| planner.plan(black_box(samples)).filter(|s| s.is_move()).count());
        });
    }

    group.finish();
}

fn bench_gate_offer(c: &mut Criterion) {
    let mut group = c.benchmark_group("gate_offer");
    group.throughput(Throughput::Elements(1));

    group.bench_function("recording", |b| {
        let gate = SampleGate::new("bench", TrajectoryBuffer::new(), RecordingLimits::unbounded());
        let _ = gate.arm();
        let _ = gate.start();
        let mut i = 0u64;
        b.iter(|| {
            let sample = TelemetrySample::new(i, Vec3::new(i as f64, 0.0, 0.0));
            black_box(gate.offer(sample));
            i += 1;
        });
    });

    group.bench_function("stopped", |b| {
        let gate = SampleGate::new("bench", TrajectoryBuffer::new(), RecordingLimits::unbounded());
        b.iter(|| black_box(gate.offer(TelemetrySample::new(0, Vec3::ZERO))));
    });

    group.finish();
}

fn bench_write_csv(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_csv");

    for size in [1_000, 10_000].iter() {
        let samples = wobbling_path(*size);
        group.throughput(Throughput::Elements(2 * *size as u64));
        group.bench_with_input(BenchmarkId::new("artifact", size), &samples, |b, samples| {
            let mut out = Vec::with_capacity(samples.len() * 128);
            b.iter(|| {
                out.clear();
                write_csv(&mut out, samples, samples).unwrap();
                black_box(out.len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_plan, bench_gate_offer, bench_write_csv);
criterion_main!(benches);

//! Waveform fit benchmarks
//!
//! Compares the analytic-gradient and finite-difference minimizer paths on
//! the exponential model, and measures PSP fits and batch throughput.
//!
//! Run with: cargo bench --bench fit_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use synphys_core::fit::synth::{ExpGenerator, PspGenerator};
use synphys_core::fit::{FitEngine, FitMethod, FitModel, MinimizeOptions, WaveformSample};

const SAMPLE_RATE: f64 = 10_000.0;

fn exp_samples(count: usize, duration: f64) -> Vec<WaveformSample> {
    let mut rng = StdRng::seed_from_u64(0);
    let generator = ExpGenerator::new(duration, SAMPLE_RATE);
    (0..count)
        .map(|_| generator.make_example(&mut rng).map(|e| e.sample))
        .collect::<Result<_, _>>()
        .unwrap()
}

/// Benchmark gradient strategies on the exponential model
fn bench_exponential_gradient(c: &mut Criterion) {
    let mut group = c.benchmark_group("exponential_fit");

    for duration in [0.05, 0.4] {
        let sample = exp_samples(1, duration).remove(0);
        for analytic in [true, false] {
            let engine = FitEngine::new(
                "minimize",
                FitMethod::Minimize {
                    model: FitModel::ExponentialDecay,
                    analytic_gradient: analytic,
                },
                MinimizeOptions::default(),
            );
            let label = if analytic { "analytic" } else { "numeric" };
            group.bench_with_input(BenchmarkId::new(label, sample.len()), &sample, |b, sample| {
                b.iter(|| engine.fit(black_box(sample)));
            });
        }
    }

    group.finish();
}

/// Benchmark PSP template fits
fn bench_psp(c: &mut Criterion) {
    let mut group = c.benchmark_group("psp_fit");
    group.sample_size(20);

    let mut rng = StdRng::seed_from_u64(1);
    let example = PspGenerator::new(0.06, SAMPLE_RATE)
        .make_example(&mut rng)
        .unwrap();
    let engine = FitEngine::minimizer(FitModel::psp());
    group.bench_function("minimize", |b| {
        b.iter(|| engine.fit(black_box(&example.sample)));
    });

    group.finish();
}

/// Benchmark batch fitting (parallel with the rayon feature)
fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_fit");
    group.sample_size(10);

    let engine = FitEngine::minimizer(FitModel::ExponentialDecay);
    for count in [16, 128] {
        let samples = exp_samples(count, 0.1);
        group.bench_with_input(BenchmarkId::from_parameter(count), &samples, |b, samples| {
            b.iter(|| engine.fit_batch(black_box(samples)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_exponential_gradient, bench_psp, bench_batch);
criterion_main!(benches);

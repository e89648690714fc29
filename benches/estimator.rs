//! Estimator Benchmarks
//!
//! Run with: cargo bench --bench estimator

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use spectral_player::{EstimatorConfig, OutputTransform, SpectralEstimator};

fn block(len: usize) -> Vec<f32> {
    (0..len).map(|i| (i as f32 * 0.031).sin() * 0.8).collect()
}

fn bench_welch(c: &mut Criterion) {
    // One 10 blocks/s push at 44.1kHz.
    let samples = block(4410);
    let mut group = c.benchmark_group("welch");
    group.throughput(Throughput::Elements(samples.len() as u64));

    for fft_size in [8, 16, 64, 1024] {
        let estimator = SpectralEstimator::new(EstimatorConfig {
            fft_size,
            ..Default::default()
        })
        .unwrap();

        group.bench_function(format!("nfft_{}", fft_size), |bencher| {
            bencher.iter(|| estimator.estimate(black_box(&samples), 44100.0).unwrap())
        });
    }

    group.finish();
}

fn bench_rms(c: &mut Criterion) {
    let samples = block(4410);
    let estimator = SpectralEstimator::new(EstimatorConfig {
        transform: OutputTransform::Rms,
        ..Default::default()
    })
    .unwrap();

    c.bench_function("rms_4410", |bencher| {
        bencher.iter(|| estimator.estimate(black_box(&samples), 44100.0).unwrap())
    });
}

criterion_group!(benches, bench_welch, bench_rms);
criterion_main!(benches);

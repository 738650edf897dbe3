//! Criterion benchmarks for the enhancement hot paths.
//!
//! Run with: cargo bench -p pnlm_core
//! Run specific: cargo bench -p pnlm_core -- nl_means

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::Array2;
use rand::prelude::*;

use pnlm_core::enhancement::enhance_gradient;
use pnlm_core::nl_means::denoise_nl_means;
use pnlm_core::{
    gradient, EnhanceParams, EnhanceRequest, Enhancer, ExactGradientDenoiser, ExactParams,
    FastGradientDenoiser, FastParams, PipelineParameters, PoissonDistanceTable,
};

// =============================================================================
// Helper Functions for Test Data Generation
// =============================================================================

fn random_field(rows: usize, cols: usize, seed: u64) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((rows, cols), |_| rng.gen())
}

fn random_image(rows: usize, cols: usize, seed: u64) -> Array2<u16> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((rows, cols), |_| rng.gen_range(1000..50000))
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_poisson_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("poisson_distance");

    group.bench_function("uncached", |b| {
        let mut lambda = 0.0;
        b.iter(|| {
            lambda = (lambda + 0.37) % 60.0;
            black_box(pnlm_core::poisson_distance::poisson_l2_distance(
                black_box(lambda),
                black_box(lambda + 1.3),
            ))
        })
    });

    let table = PoissonDistanceTable::new();
    group.bench_function("cached", |b| {
        b.iter(|| black_box(table.distance(black_box(18.4), black_box(21.02))))
    });

    group.finish();
}

fn bench_enhance_gradient(c: &mut Criterion) {
    let mut group = c.benchmark_group("enhance_gradient");
    let params = EnhanceParams::default();

    for size in [128, 256, 512] {
        let field = random_field(size, size, 42);
        group.throughput(Throughput::Elements((size * size) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| enhance_gradient(black_box(field.view()), &params))
        });
    }

    group.finish();
}

fn bench_nl_means(c: &mut Criterion) {
    let mut group = c.benchmark_group("nl_means");
    group.sample_size(10);

    for (size, distance) in [(128, 5), (256, 5), (256, 13)] {
        let field = random_field(size, size, 7);
        group.throughput(Throughput::Elements((size * size) as u64));
        group.bench_with_input(
            BenchmarkId::new(format!("d{}", distance), size),
            &size,
            |b, _| b.iter(|| denoise_nl_means(black_box(field.view()), 3, distance, 0.001)),
        );
    }

    group.finish();
}

fn bench_engines(c: &mut Criterion) {
    let mut group = c.benchmark_group("gradient_denoise");
    group.sample_size(10);

    let size = 64;
    let field = gradient(random_field(size, size, 3).view());
    let params = ExactParams {
        search_radius: 2,
        ..ExactParams::default()
    };

    let exact = ExactGradientDenoiser::new(params, Arc::new(PoissonDistanceTable::new()));
    group.bench_function("exact_64", |b| {
        b.iter(|| exact.denoise(black_box(&field), &mut |_| {}))
    });

    let fast = FastGradientDenoiser::new(FastParams::from_radii(2, 1));
    group.bench_function("fast_64", |b| {
        b.iter(|| fast.denoise(black_box(&field), &mut |_| {}))
    });

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);

    let enhancer = Enhancer::new();
    for (size, label) in [(128, "small_128"), (256, "medium_256")] {
        let image = random_image(size, size, 42);
        for (params, preset) in [
            (PipelineParameters::default(), "default"),
            (PipelineParameters::interactive(), "interactive"),
        ] {
            let request = EnhanceRequest::new(params);
            group.bench_function(format!("{}_{}", label, preset), |b| {
                b.iter(|| enhancer.enhance(black_box(image.view()), &request, None, None))
            });
        }
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_poisson_distance,
    bench_enhance_gradient,
    bench_nl_means,
    bench_engines,
    bench_pipeline
);
criterion_main!(benches);

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use nalgebra::Point2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cno_kde::{
    config::ScaleSettings,
    constants::PixelCoord,
    kde::{surface::DensitySurface, KernelDensity},
    layers::LayerAggregator,
    DensityPolicy,
};

fn scan_coords(rng: &mut StdRng, n: usize) -> Vec<PixelCoord> {
    (0..n)
        .map(|_| (rng.random_range(0..512), rng.random_range(0..512)))
        .collect()
}

/// Evaluation of a fitted density on the full 512 × 512 grid.
fn bench_evaluate(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xDEADBEEF);
    let coords = scan_coords(&mut rng, 150);
    let points: Vec<_> = coords
        .iter()
        .map(|&(x, y)| Point2::new(x as f64, y as f64))
        .collect();
    let kde = KernelDensity::fit(&points, 35.0).unwrap();

    c.bench_function("density_surface/evaluate_512x512_n=150", |b| {
        b.iter(|| {
            let surface = DensitySurface::evaluate(black_box(&kde), 512, 512).unwrap();
            black_box(surface.max());
        })
    });
}

/// Layer aggregation under both policies on a precomputed surface.
fn bench_aggregate(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xBADF00D);
    let coords = scan_coords(&mut rng, 150);
    let points: Vec<_> = coords
        .iter()
        .map(|&(x, y)| Point2::new(x as f64, y as f64))
        .collect();
    let kde = KernelDensity::fit(&points, 35.0).unwrap();
    let surface = DensitySurface::evaluate(&kde, 512, 512).unwrap();

    for policy in [DensityPolicy::HardMembership, DensityPolicy::ProbabilityMass] {
        let aggregator = LayerAggregator::new(policy, &ScaleSettings::default());
        c.bench_function(&format!("density_surface/aggregate_{policy}"), |b| {
            b.iter_batched(
                || coords.clone(),
                |centers| black_box(aggregator.aggregate(&surface, &centers)),
                BatchSize::SmallInput,
            )
        });
    }
}

criterion_group!(benches, bench_evaluate, bench_aggregate);
criterion_main!(benches);

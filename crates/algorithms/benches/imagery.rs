//! Benchmarks for the per-pixel detection kernels

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use seepwatch_algorithms::imagery::{compute_index, detect_change, ChangeParams};
use seepwatch_core::{GeoTransform, Raster};

fn create_band(size: usize, base: f64) -> Raster<f64> {
    let mut r = Raster::new(size, size);
    r.set_transform(GeoTransform::new(0.0, size as f64 * 10.0, 10.0, -10.0));
    for row in 0..size {
        for col in 0..size {
            let v = base + ((row * 7 + col * 13) % 200) as f64;
            r.set(row, col, v).unwrap();
        }
    }
    r
}

fn bench_ndwi(c: &mut Criterion) {
    let mut group = c.benchmark_group("imagery/ndwi");
    for size in [256, 512, 1024, 2048] {
        let green = create_band(size, 300.0);
        let nir = create_band(size, 100.0);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| compute_index(black_box(&green), black_box(&nir), None).unwrap())
        });
    }
    group.finish();
}

fn bench_change(c: &mut Criterion) {
    let mut group = c.benchmark_group("imagery/change_detection");
    for size in [256, 512, 1024] {
        let baseline = compute_index(&create_band(size, 300.0), &create_band(size, 250.0), None).unwrap();
        let current = compute_index(&create_band(size, 350.0), &create_band(size, 100.0), None).unwrap();
        let params = ChangeParams::default();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| detect_change(black_box(&baseline), black_box(&current), &params).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_ndwi, bench_change);
criterion_main!(benches);

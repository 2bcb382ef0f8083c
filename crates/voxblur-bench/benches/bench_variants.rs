use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use voxblur_bench::{make_noisy_volume, BenchmarkHarness, HarnessConfig, Variant};

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("Resolution");
    group.sample_size(10);

    let harness = BenchmarkHarness::new(HarnessConfig::default()).unwrap();

    for resolution in [2, 4, 6].iter() {
        let volume = make_noisy_volume(10.0, *resolution, 2.0, 0).unwrap();
        group.throughput(Throughput::Bytes(volume.nbytes() as u64));

        for variant in Variant::ALL {
            group.bench_with_input(
                BenchmarkId::new(variant.name(), volume.width()),
                &volume,
                |b, v| b.iter(|| black_box(harness.run_variant(variant, v, 0.5))),
            );
        }
    }

    group.finish();
}

fn bench_sigma(c: &mut Criterion) {
    let mut group = c.benchmark_group("Sigma");
    group.sample_size(10);

    let harness = BenchmarkHarness::new(HarnessConfig::default()).unwrap();
    let volume = make_noisy_volume(48.0, 1, 2.0, 0).unwrap();
    group.throughput(Throughput::Bytes(volume.nbytes() as u64));

    for sigma in [1.0f64, 2.5, 4.0, 7.0].iter() {
        for variant in Variant::ALL {
            group.bench_with_input(BenchmarkId::new(variant.name(), sigma), sigma, |b, s| {
                b.iter(|| black_box(harness.run_variant(variant, &volume, s * s)))
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_resolution, bench_sigma);
criterion_main!(benches);

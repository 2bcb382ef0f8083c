use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use voxblur_filter::{
    gaussian_kernel_1d, recursive_gaussian, separable_convolution_reference, CpuPlan,
    ExecutionStrategy, GpuPlan, SeparableConvolution,
};
use voxblur_volume::Volume;

fn bench_convolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("Separable Gaussian");

    for extent in [32, 64, 96].iter() {
        for variance in [1.0, 4.0, 16.0].iter() {
            let volume = Volume::from_fn([*extent; 3].into(), |x, y, z| {
                ((x * 7 + y * 13 + z * 29) % 17) as f32
            })
            .unwrap();

            let kernel = gaussian_kernel_1d(*variance, 0.01, 32).unwrap();
            let kernels = [kernel.clone(), kernel.clone(), kernel];

            group.throughput(Throughput::Bytes(volume.nbytes() as u64));
            let parameter_string = format!("{}^3 var {}", extent, variance);

            group.bench_with_input(
                BenchmarkId::new("cpu_plan", &parameter_string),
                &volume,
                |b, v| {
                    let plan = CpuPlan::default();
                    b.iter(|| black_box(plan.apply(v, &kernels)))
                },
            );

            group.bench_with_input(
                BenchmarkId::new("gpu_plan_host", &parameter_string),
                &volume,
                |b, v| {
                    let plan = GpuPlan::default();
                    b.iter(|| black_box(plan.apply(v, &kernels)))
                },
            );

            group.bench_with_input(
                BenchmarkId::new("reference", &parameter_string),
                &volume,
                |b, v| b.iter(|| black_box(separable_convolution_reference(v, &kernels))),
            );

            group.bench_with_input(
                BenchmarkId::new("recursive", &parameter_string),
                &volume,
                |b, v| {
                    let sigma = [variance.sqrt(); 3];
                    b.iter(|| black_box(recursive_gaussian(v, sigma, ExecutionStrategy::Parallel)))
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_convolution);
criterion_main!(benches);

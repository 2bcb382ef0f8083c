use std::{sync::Arc, time::Instant};

use voxblur_device::{ComputeDevice, HostDevice};
use voxblur_filter::{
    recursive_gaussian, separable_convolution_reference, CpuPlan, CpuPlanConfig,
    DiscreteGaussianFilter, ExecutionStrategy, FilterError, GpuPlan, GpuPlanConfig,
    KernelParameters,
};
use voxblur_volume::Volume;

use crate::{
    error::BenchError,
    noise::{make_noisy_volume, DEFAULT_NOISE_STDDEV},
};

/// An implementation of the gaussian blur under measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Variant {
    /// Direct three-pass convolution without tiling.
    ReferenceCpu,
    /// Recursive approximation of the gaussian.
    ReferenceRecursive,
    /// The engine running the tiled CPU plan.
    EngineCpu,
    /// The engine running the GPU plan on the harness device.
    EngineGpu,
}

impl Variant {
    /// Every variant, in table column order.
    pub const ALL: [Variant; 4] = [
        Variant::ReferenceCpu,
        Variant::ReferenceRecursive,
        Variant::EngineCpu,
        Variant::EngineGpu,
    ];

    /// Column name of the variant.
    pub fn name(&self) -> &'static str {
        match self {
            Variant::ReferenceCpu => "reference_cpu",
            Variant::ReferenceRecursive => "reference_recursive",
            Variant::EngineCpu => "engine_cpu",
            Variant::EngineGpu => "engine_gpu",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration of the benchmark harness.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HarnessConfig {
    /// Timed runs per sweep point.
    pub samples: usize,
    /// Run every variant once before timing.
    pub warmup: bool,
    /// Maximum kernel width handed to the discrete filters.
    pub maximum_kernel_width: u32,
    /// Maximum kernel error handed to the discrete filters.
    pub maximum_error: f64,
    /// The direct reference is skipped from this many samples per axis on.
    pub reference_cpu_limit: usize,
    /// The device variant is skipped from this many samples per axis on.
    pub device_limit: usize,
    /// The direct reference is timed only up to this sigma.
    pub reference_cpu_sigma_limit: f32,
    /// The CPU engine is timed only below this sigma.
    pub engine_cpu_sigma_limit: f32,
    /// Configuration of the CPU plan.
    pub cpu: CpuPlanConfig,
    /// Configuration of the GPU plan.
    pub gpu: GpuPlanConfig,
    /// Seed of the noise volumes created by the resolution sweep.
    pub seed: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            samples: 10,
            warmup: true,
            maximum_kernel_width: 48,
            maximum_error: 0.01,
            reference_cpu_limit: 400,
            device_limit: 800,
            reference_cpu_sigma_limit: 5.0,
            engine_cpu_sigma_limit: 19.0,
            cpu: CpuPlanConfig::default(),
            gpu: GpuPlanConfig::default(),
            seed: 0,
        }
    }
}

/// Results of a sweep, one row per timed sample.
///
/// A cell is `None` when the variant was skipped for that row.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BenchmarkTable {
    /// Column names.
    pub header: Vec<String>,
    /// Rows with one cell per column.
    pub rows: Vec<Vec<Option<f64>>>,
}

impl BenchmarkTable {
    fn new(leading: &[&str]) -> Self {
        let header = leading
            .iter()
            .map(|s| s.to_string())
            .chain(Variant::ALL.iter().map(|v| v.name().to_string()))
            .collect();
        Self {
            header,
            rows: Vec::new(),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The cells of the column called `name`.
    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let index = self.header.iter().position(|h| h == name)?;
        Some(self.rows.iter().map(|row| row[index]).collect())
    }
}

impl std::fmt::Display for BenchmarkTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.header.join("\t"))?;
        for row in &self.rows {
            let cells = row
                .iter()
                .map(|c| match c {
                    Some(v) => format!("{:.6}", v),
                    None => "nan".to_string(),
                })
                .collect::<Vec<_>>();
            writeln!(f, "{}", cells.join("\t"))?;
        }
        Ok(())
    }
}

/// Times the blur variants over sweeps of sigma and resolution.
///
/// # Examples
///
/// ```
/// use voxblur_bench::{make_noisy_volume, BenchmarkHarness, HarnessConfig};
///
/// let harness = BenchmarkHarness::new(HarnessConfig {
///     samples: 1,
///     ..Default::default()
/// })
/// .unwrap();
/// let volume = make_noisy_volume(12.0, 1, 2.0, 0).unwrap();
/// let table = harness.run_sigma_sweep(&volume, &[1.0, 2.5]).unwrap();
///
/// assert_eq!(table.len(), 2);
/// assert_eq!(table.header[0], "sigma");
/// ```
pub struct BenchmarkHarness {
    config: HarnessConfig,
    cpu: CpuPlan,
    gpu: GpuPlan,
}

impl std::fmt::Debug for BenchmarkHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchmarkHarness")
            .field("config", &self.config)
            .field("device", &self.gpu.device().device())
            .finish()
    }
}

impl BenchmarkHarness {
    /// Create a harness whose GPU variant runs on the host device.
    ///
    /// # Errors
    ///
    /// Fails if `samples` is zero or a plan configuration is invalid.
    pub fn new(config: HarnessConfig) -> Result<Self, BenchError> {
        Self::with_device(config, Arc::new(HostDevice::new()))
    }

    /// Create a harness whose GPU variant runs on `device`.
    pub fn with_device(
        config: HarnessConfig,
        device: Arc<dyn ComputeDevice>,
    ) -> Result<Self, BenchError> {
        if config.samples == 0 {
            return Err(BenchError::InvalidConfig("samples must be > 0".to_string()));
        }
        let cpu = CpuPlan::new(config.cpu)?;
        let gpu = GpuPlan::new(device, config.gpu)?;
        Ok(Self { config, cpu, gpu })
    }

    /// The harness configuration.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    fn parameters(&self, variance: f64) -> KernelParameters {
        KernelParameters {
            variance: [variance; 3],
            maximum_error: self.config.maximum_error,
            maximum_kernel_width: self.config.maximum_kernel_width,
            ..Default::default()
        }
    }

    /// Blur `volume` once with `variant`, deriving the kernels as part of the run.
    ///
    /// # Errors
    ///
    /// Fails if the variant fails.
    pub fn run_variant(
        &self,
        variant: Variant,
        volume: &Volume,
        variance: f64,
    ) -> Result<Volume, BenchError> {
        let params = self.parameters(variance);
        let output = match variant {
            Variant::ReferenceCpu => {
                let kernels = params.kernels(volume.spacing())?;
                separable_convolution_reference(volume, &kernels)?
            }
            Variant::ReferenceRecursive => {
                let sigma = params.effective_variance(volume.spacing())?.map(f64::sqrt);
                recursive_gaussian(volume, sigma, ExecutionStrategy::Parallel)?
            }
            Variant::EngineCpu | Variant::EngineGpu => {
                let mut filter = DiscreteGaussianFilter::new();
                filter.set_input(volume);
                filter.set_parameters(params);
                if variant == Variant::EngineCpu {
                    filter.set_engine(self.cpu.clone().into());
                } else {
                    filter.set_engine(self.gpu.clone().into());
                }
                filter.update()?;
                filter.take_output().ok_or(FilterError::MissingInput)?
            }
        };
        Ok(output)
    }

    /// Wall time of one run of `variant`, in nanoseconds.
    fn time_variant(
        &self,
        variant: Variant,
        volume: &Volume,
        variance: f64,
    ) -> Result<f64, BenchError> {
        let start = Instant::now();
        let output = self.run_variant(variant, volume, variance)?;
        let elapsed = start.elapsed().as_nanos() as f64;
        drop(output);
        Ok(elapsed)
    }

    fn warmup(&self, volume: &Volume, variance: f64) -> Result<(), BenchError> {
        if !self.config.warmup {
            return Ok(());
        }
        for variant in Variant::ALL {
            log::debug!("warm-up {} on {}", variant, volume.size());
            self.run_variant(variant, volume, variance)?;
        }
        Ok(())
    }

    fn is_skipped_at_sigma(&self, variant: Variant, sigma: f32) -> bool {
        match variant {
            Variant::ReferenceCpu => sigma > self.config.reference_cpu_sigma_limit,
            Variant::EngineCpu => sigma >= self.config.engine_cpu_sigma_limit,
            Variant::ReferenceRecursive | Variant::EngineGpu => false,
        }
    }

    fn is_skipped(&self, variant: Variant, extent: usize) -> bool {
        match variant {
            Variant::ReferenceCpu => extent >= self.config.reference_cpu_limit,
            Variant::EngineGpu => extent >= self.config.device_limit,
            Variant::ReferenceRecursive | Variant::EngineCpu => false,
        }
    }

    /// Measure the bandwidth of every variant over a sweep of sigma.
    ///
    /// Each row holds the sigma, the kernel radius along x and the bandwidth of each variant in
    /// bytes per nanosecond. The variance handed to the filters is `sigma^2`.
    ///
    /// # Arguments
    ///
    /// * `volume` - The volume to blur.
    /// * `sigmas` - The standard deviations to sweep, in physical units.
    ///
    /// # Returns
    ///
    /// A table with `samples` rows per sigma.
    pub fn run_sigma_sweep(
        &self,
        volume: &Volume,
        sigmas: &[f32],
    ) -> Result<BenchmarkTable, BenchError> {
        let mut table = BenchmarkTable::new(&["sigma", "radius"]);
        let nbytes = volume.nbytes() as f64;

        self.warmup(volume, 1.0)?;

        for &sigma in sigmas {
            let variance = (sigma as f64) * (sigma as f64);
            let radius = self.parameters(variance).kernel_radius(volume.spacing())?[0];
            log::info!("sigma {} (radius {}) on {}", sigma, radius, volume.size());

            for _ in 0..self.config.samples {
                let mut row = vec![Some(sigma as f64), Some(radius as f64)];
                for variant in Variant::ALL {
                    let ns = self.time_variant(variant, volume, variance)?;
                    row.push(Some(nbytes / ns.max(1.0)));
                }
                table.rows.push(row);
            }
        }
        Ok(table)
    }

    /// Measure the run time of every variant over a sweep of sigma.
    ///
    /// Each row holds the sigma and the elapsed milliseconds of each variant. The direct
    /// reference is recorded as `None` above `reference_cpu_sigma_limit`, and the CPU engine
    /// from `engine_cpu_sigma_limit` on.
    ///
    /// # Arguments
    ///
    /// * `volume` - The volume to blur.
    /// * `sigmas` - The standard deviations to sweep, in physical units.
    pub fn run_sigma_time_sweep(
        &self,
        volume: &Volume,
        sigmas: &[f32],
    ) -> Result<BenchmarkTable, BenchError> {
        let mut table = BenchmarkTable::new(&["sigma"]);

        self.warmup(volume, 1.0)?;

        for &sigma in sigmas {
            let variance = (sigma as f64) * (sigma as f64);
            log::info!("sigma {} on {}", sigma, volume.size());

            for _ in 0..self.config.samples {
                let mut row = vec![Some(sigma as f64)];
                for variant in Variant::ALL {
                    if self.is_skipped_at_sigma(variant, sigma) {
                        row.push(None);
                        continue;
                    }
                    let ns = self.time_variant(variant, volume, variance)?;
                    row.push(Some(ns * 1e-6));
                }
                table.rows.push(row);
            }
        }
        Ok(table)
    }

    /// Measure the run time of every variant over a sweep of resolution.
    ///
    /// A noise cube covering `extent` physical units is created for every resolution. Each row
    /// holds the resolution and the elapsed milliseconds of each variant. Variants past their
    /// size limit are recorded as `None`.
    ///
    /// # Arguments
    ///
    /// * `extent` - Physical size of the cube along each axis.
    /// * `resolutions` - The samples per physical unit to sweep.
    /// * `variance` - The variance of the blur, in physical units.
    pub fn run_resolution_sweep(
        &self,
        extent: f32,
        resolutions: &[usize],
        variance: f64,
    ) -> Result<BenchmarkTable, BenchError> {
        let mut table = BenchmarkTable::new(&["resolution"]);

        if self.config.warmup {
            let small = make_noisy_volume(extent, 1, DEFAULT_NOISE_STDDEV, self.config.seed)?;
            self.warmup(&small, variance)?;
        }

        for &resolution in resolutions {
            let volume = make_noisy_volume(
                extent,
                resolution,
                DEFAULT_NOISE_STDDEV,
                self.config.seed.wrapping_add(resolution as u64),
            )?;
            let n = volume.width();
            log::info!("resolution {} ({} samples per axis)", resolution, n);

            for _ in 0..self.config.samples {
                let mut row = vec![Some(resolution as f64)];
                for variant in Variant::ALL {
                    if self.is_skipped(variant, n) {
                        row.push(None);
                        continue;
                    }
                    let ns = self.time_variant(variant, &volume, variance)?;
                    row.push(Some(ns * 1e-6));
                }
                table.rows.push(row);
            }
        }
        Ok(table)
    }
}

/// The sigma sweep of the bandwidth benchmark: 1 to 20 in steps of 1.5.
pub fn default_sigmas() -> Vec<f32> {
    (0..13).map(|i| 1.0 + 1.5 * i as f32).collect()
}

/// The sigma sweep of the timing benchmark: 1 to 8, then 10 to 25 in steps of 3.
pub fn default_time_sigmas() -> Vec<f32> {
    (1..=8)
        .chain((10..=25).step_by(3))
        .map(|s| s as f32)
        .collect()
}

/// The resolution sweep of the resolution benchmark.
pub fn default_resolutions() -> Vec<usize> {
    (5..=15)
        .step_by(2)
        .chain((5..=45).step_by(10))
        .chain((10..=100).step_by(10))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> HarnessConfig {
        HarnessConfig {
            samples: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_config() {
        let res = BenchmarkHarness::new(HarnessConfig {
            samples: 0,
            ..Default::default()
        });
        assert!(matches!(res, Err(BenchError::InvalidConfig(_))));
    }

    #[test]
    fn test_sigma_sweep_shape() -> Result<(), BenchError> {
        let harness = BenchmarkHarness::new(small_config())?;
        let volume = make_noisy_volume(10.0, 1, 2.0, 3)?;
        let table = harness.run_sigma_sweep(&volume, &[1.0, 4.0])?;

        assert_eq!(
            table.header,
            [
                "sigma",
                "radius",
                "reference_cpu",
                "reference_recursive",
                "engine_cpu",
                "engine_gpu"
            ]
        );
        assert_eq!(table.len(), 4);
        assert!(table.rows.iter().all(|r| r.len() == 6));
        assert!(table
            .rows
            .iter()
            .all(|r| r[2..].iter().all(|c| matches!(c, Some(b) if *b > 0.0))));

        let radius = table.column("radius").unwrap_or_default();
        assert_eq!(radius[0], radius[1]);
        assert!(radius[2] > radius[0]);
        Ok(())
    }

    #[test]
    fn test_resolution_sweep_skips() -> Result<(), BenchError> {
        let harness = BenchmarkHarness::new(HarnessConfig {
            samples: 1,
            reference_cpu_limit: 10,
            device_limit: 20,
            ..Default::default()
        })?;
        let table = harness.run_resolution_sweep(2.0, &[3, 6, 12], 0.5)?;
        assert_eq!(table.len(), 3);

        let reference = table.column("reference_cpu").unwrap_or_default();
        let gpu = table.column("engine_gpu").unwrap_or_default();
        let cpu = table.column("engine_cpu").unwrap_or_default();
        assert!(reference[0].is_some() && reference[1].is_none() && reference[2].is_none());
        assert!(gpu[0].is_some() && gpu[1].is_some() && gpu[2].is_none());
        assert!(cpu.iter().all(|c| c.is_some()));
        Ok(())
    }

    #[test]
    fn test_sigma_time_sweep_skips() -> Result<(), BenchError> {
        let harness = BenchmarkHarness::new(HarnessConfig {
            samples: 1,
            reference_cpu_sigma_limit: 1.5,
            engine_cpu_sigma_limit: 3.0,
            ..Default::default()
        })?;
        let volume = make_noisy_volume(6.0, 1, 2.0, 4)?;
        let table = harness.run_sigma_time_sweep(&volume, &[1.0, 2.0, 3.0])?;
        assert_eq!(table.len(), 3);
        assert_eq!(table.header[0], "sigma");

        let reference = table.column("reference_cpu").unwrap_or_default();
        let cpu = table.column("engine_cpu").unwrap_or_default();
        let gpu = table.column("engine_gpu").unwrap_or_default();
        let recursive = table.column("reference_recursive").unwrap_or_default();
        assert!(reference[0].is_some() && reference[1].is_none() && reference[2].is_none());
        assert!(cpu[0].is_some() && cpu[1].is_some() && cpu[2].is_none());
        assert!(gpu.iter().chain(recursive.iter()).all(|c| c.is_some()));
        Ok(())
    }

    #[test]
    fn test_engine_variants_agree() -> Result<(), BenchError> {
        let harness = BenchmarkHarness::new(small_config())?;
        let volume = make_noisy_volume(3.0, 4, 2.0, 11)?;

        let reference = harness.run_variant(Variant::ReferenceCpu, &volume, 0.25)?;
        let cpu = harness.run_variant(Variant::EngineCpu, &volume, 0.25)?;
        let gpu = harness.run_variant(Variant::EngineGpu, &volume, 0.25)?;
        assert!(cpu.max_abs_diff(&reference)? < 1e-3);
        assert!(gpu.max_abs_diff(&reference)? < 1e-3);
        Ok(())
    }

    #[test]
    fn test_default_sweeps() {
        let sigmas = default_sigmas();
        assert_eq!(sigmas.first(), Some(&1.0));
        assert_eq!(sigmas.last(), Some(&19.0));
        assert_eq!(
            default_time_sigmas(),
            [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0, 13.0, 16.0, 19.0, 22.0, 25.0]
        );
        assert_eq!(
            default_resolutions(),
            [5, 7, 9, 11, 13, 15, 5, 15, 25, 35, 45, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100]
        );
    }

    #[test]
    fn test_table_display() {
        let table = BenchmarkTable {
            header: vec!["a".to_string(), "b".to_string()],
            rows: vec![vec![Some(1.0), None]],
        };
        assert_eq!(table.to_string(), "a\tb\n1.000000\tnan\n");
    }
}

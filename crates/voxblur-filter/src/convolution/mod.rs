//! Separable convolution of volumes.
//!
//! A separable filter is applied as three one-dimensional passes along x, then y, then z.
//! Out-of-range samples are read with the clamp-to-edge policy of
//! [`BoundaryExtendedSampler`](crate::sampler::BoundaryExtendedSampler).

use rayon::prelude::*;
use voxblur_volume::{Axis, Volume, VolumeError};

use crate::{error::FilterError, kernels::Kernel1D, sampler::BoundaryExtendedSampler};

mod cpu;
pub use cpu::{CpuPlan, CpuPlanConfig};

mod gpu;
pub use gpu::{GpuPlan, GpuPlanConfig};

/// The hardware an execution plan runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExecutionPlan {
    /// Tiled multi-threaded host execution.
    Cpu,
    /// Block launches on a compute device.
    Gpu,
}

impl std::fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionPlan::Cpu => write!(f, "cpu"),
            ExecutionPlan::Gpu => write!(f, "gpu"),
        }
    }
}

/// Applies three axis kernels to a volume.
pub trait SeparableConvolution {
    /// The execution plan used by this engine.
    fn plan(&self) -> ExecutionPlan;

    /// Convolve `src` with the x, y and z kernels.
    ///
    /// # Arguments
    ///
    /// * `src` - The input volume. It is never modified.
    /// * `kernels` - The kernels along x, y and z.
    ///
    /// # Returns
    ///
    /// A new volume of the same size, spacing and origin as `src`.
    fn apply(&self, src: &Volume, kernels: &[Kernel1D; 3]) -> Result<Volume, FilterError>;
}

/// A separable convolution engine with its execution plan chosen at construction.
#[derive(Debug, Clone)]
pub enum ConvolutionEngine {
    /// Run on the host.
    Cpu(CpuPlan),
    /// Run on a compute device.
    Gpu(GpuPlan),
}

impl Default for ConvolutionEngine {
    fn default() -> Self {
        ConvolutionEngine::Cpu(CpuPlan::default())
    }
}

impl From<CpuPlan> for ConvolutionEngine {
    fn from(plan: CpuPlan) -> Self {
        ConvolutionEngine::Cpu(plan)
    }
}

impl From<GpuPlan> for ConvolutionEngine {
    fn from(plan: GpuPlan) -> Self {
        ConvolutionEngine::Gpu(plan)
    }
}

impl SeparableConvolution for ConvolutionEngine {
    fn plan(&self) -> ExecutionPlan {
        match self {
            ConvolutionEngine::Cpu(plan) => plan.plan(),
            ConvolutionEngine::Gpu(plan) => plan.plan(),
        }
    }

    fn apply(&self, src: &Volume, kernels: &[Kernel1D; 3]) -> Result<Volume, FilterError> {
        match self {
            ConvolutionEngine::Cpu(plan) => plan.apply(src, kernels),
            ConvolutionEngine::Gpu(plan) => plan.apply(src, kernels),
        }
    }
}

/// Convolve a volume with a kernel along a single axis.
///
/// Every output sample is `sum_k src[p + k * axis] * kernel[k]`, with out-of-range samples
/// clamped to the edge. The z-slices of the output are processed in parallel.
///
/// # Arguments
///
/// * `src` - The input volume.
/// * `dst` - The output volume, of the same size as `src`.
/// * `kernel` - The kernel.
/// * `axis` - The axis along which to convolve.
pub fn convolve_axis(
    src: &Volume,
    dst: &mut Volume,
    kernel: &Kernel1D,
    axis: Axis,
) -> Result<(), FilterError> {
    if src.size() != dst.size() {
        return Err(VolumeError::SizeMismatch(src.size(), dst.size()).into());
    }

    let size = src.size();
    let sampler = BoundaryExtendedSampler::new(src);
    let radius = kernel.radius() as isize;
    let weights = kernel.weights();

    dst.as_slice_mut()
        .par_chunks_mut(size.width * size.height)
        .enumerate()
        .for_each(|(z, slice)| {
            for y in 0..size.height {
                for x in 0..size.width {
                    let mut p = [x as isize, y as isize, z as isize];
                    let center = p[axis.index()];
                    let mut acc = 0.0f32;
                    for (k, &w) in weights.iter().enumerate() {
                        p[axis.index()] = center + k as isize - radius;
                        acc += sampler.sample(p[0], p[1], p[2]) * w;
                    }
                    slice[y * size.width + x] = acc;
                }
            }
        });

    Ok(())
}

/// Direct separable convolution, one full pass per axis.
///
/// This is the straightforward rendition of the filter, with two full-size intermediates.
pub fn separable_convolution_reference(
    src: &Volume,
    kernels: &[Kernel1D; 3],
) -> Result<Volume, FilterError> {
    let mut tmp = Volume::zeros(src.size())?;
    let mut dst = Volume::zeros(src.size())?;

    convolve_axis(src, &mut tmp, &kernels[0], Axis::X)?;
    convolve_axis(&tmp, &mut dst, &kernels[1], Axis::Y)?;
    convolve_axis(&dst, &mut tmp, &kernels[2], Axis::Z)?;

    tmp.copy_information(src);
    Ok(tmp)
}

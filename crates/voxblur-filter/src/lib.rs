#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Overview
//!
//! A gaussian blur of a volume is computed as three one-dimensional convolutions, along x,
//! then y, then z. The kernels come from [`KernelParameters`], and the convolutions run on a
//! [`ConvolutionEngine`] that is either a tiled multi-threaded [`CpuPlan`] or a [`GpuPlan`]
//! launching on a compute device.
//!
//! ```rust
//! use voxblur_filter::{
//!     gaussian_kernel_1d, ConvolutionEngine, CpuPlan, GpuPlan, SeparableConvolution,
//! };
//! use voxblur_volume::Volume;
//!
//! let volume = Volume::from_fn([16, 16, 16].into(), |x, y, z| (x + y + z) as f32).unwrap();
//! let kernel = gaussian_kernel_1d(2.0, 0.01, 32).unwrap();
//! let kernels = [kernel.clone(), kernel.clone(), kernel];
//!
//! let cpu = ConvolutionEngine::from(CpuPlan::default()).apply(&volume, &kernels).unwrap();
//! let gpu = ConvolutionEngine::from(GpuPlan::default()).apply(&volume, &kernels).unwrap();
//!
//! assert!(cpu.max_abs_diff(&gpu).unwrap() < 1e-3);
//! ```

/// Separable convolution engine and its execution plans.
pub mod convolution;

/// Error types for the filter module.
pub mod error;

/// Discrete gaussian filter front end.
pub mod filter;

/// Filter kernels
pub mod kernels;

/// Utilities for parallel execution.
pub mod parallel;

/// Recursive gaussian reference filter.
pub mod recursive;

/// Boundary handling for out-of-range samples.
pub mod sampler;

pub use crate::convolution::{
    convolve_axis, separable_convolution_reference, ConvolutionEngine, CpuPlan, CpuPlanConfig,
    ExecutionPlan, GpuPlan, GpuPlanConfig, SeparableConvolution,
};
pub use crate::error::FilterError;
pub use crate::filter::DiscreteGaussianFilter;
pub use crate::kernels::{
    box_kernel_1d, gaussian_kernel_1d, sampled_gaussian_kernel_1d, Kernel1D, KernelConvention,
    KernelParameters,
};
pub use crate::parallel::{ExecutionStrategy, ParallelError};
pub use crate::recursive::{recursive_gaussian, recursive_gaussian_axis, RecursiveCoefficients};
pub use crate::sampler::BoundaryExtendedSampler;

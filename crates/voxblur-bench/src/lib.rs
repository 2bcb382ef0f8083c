#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! The harness blurs noise volumes with each [`Variant`] and collects the timings in a
//! [`BenchmarkTable`]: bandwidth or elapsed time over a sweep of sigma, or elapsed time over a
//! sweep of resolution at a fixed physical extent.

/// Error types for the benchmark harness.
pub mod error;

/// Benchmark sweeps over the blur variants.
pub mod harness;

/// Noise volumes.
pub mod noise;

pub use crate::error::BenchError;
pub use crate::harness::{
    default_resolutions, default_sigmas, default_time_sigmas, BenchmarkHarness, BenchmarkTable,
    HarnessConfig, Variant,
};
pub use crate::noise::{add_gaussian_noise, make_noisy_volume, DEFAULT_NOISE_STDDEV};

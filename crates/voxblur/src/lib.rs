//! Separable 3D gaussian blur for volumes on CPU and GPU.
//!
//! ```rust
//! use voxblur::{filter::DiscreteGaussianFilter, volume::Volume};
//!
//! let input = Volume::from_fn([32, 32, 32].into(), |x, y, z| (x * y + z) as f32).unwrap();
//!
//! let mut filter = DiscreteGaussianFilter::new();
//! filter.set_input(&input);
//! filter.set_sigma(2.0);
//! filter.update().unwrap();
//!
//! assert_eq!(filter.output().unwrap().size(), input.size());
//! ```

#[doc(inline)]
pub use voxblur_volume as volume;

#[doc(inline)]
pub use voxblur_device as device;

#[doc(inline)]
pub use voxblur_filter as filter;

#[doc(inline)]
pub use voxblur_bench as bench;

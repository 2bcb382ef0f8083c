#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for the volume module.
pub mod error;

/// volume representation for 3d image processing.
pub mod volume;

pub use crate::error::VolumeError;
pub use crate::volume::{try_alloc, Axis, Volume, VolumeSize};

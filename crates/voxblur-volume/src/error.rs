use crate::volume::VolumeSize;

/// An error type for the volume module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum VolumeError {
    /// Error when the sample data does not match the volume size.
    #[error("Data length ({0}) does not match the volume size ({1})")]
    InvalidDataLength(usize, usize),

    /// Error when one of the axis extents is zero.
    #[error("Volume extents must be >= 1, got {0}")]
    ZeroExtent(VolumeSize),

    /// Error when the spacing of an axis is not finite and positive.
    #[error("Invalid spacing {1} for axis {0}")]
    InvalidSpacing(usize, f64),

    /// Error when two volumes are expected to have the same size.
    #[error("Volume size mismatch: {0} != {1}")]
    SizeMismatch(VolumeSize, VolumeSize),

    /// Error when the host allocation for the samples failed.
    #[error("Failed to allocate {0} samples")]
    AllocationFailed(usize),
}

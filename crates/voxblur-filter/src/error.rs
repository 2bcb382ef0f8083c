use voxblur_device::DeviceError;
use voxblur_volume::VolumeError;

use crate::parallel::ParallelError;

/// An error type for the filter module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum FilterError {
    /// A kernel or plan parameter is out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The filter was updated without an input volume.
    #[error("No input volume has been set")]
    MissingInput,

    /// Host or device memory could not be allocated.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The compute device reported a failure.
    #[error(transparent)]
    Device(DeviceError),

    /// A volume could not be created or does not match.
    #[error(transparent)]
    Volume(VolumeError),

    /// The worker pool could not be set up.
    #[error(transparent)]
    Parallel(#[from] ParallelError),
}

impl From<DeviceError> for FilterError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::OutOfMemory { .. } => FilterError::ResourceExhausted(e.to_string()),
            e => FilterError::Device(e),
        }
    }
}

impl From<VolumeError> for FilterError {
    fn from(e: VolumeError) -> Self {
        match e {
            VolumeError::AllocationFailed(_) => FilterError::ResourceExhausted(e.to_string()),
            e => FilterError::Volume(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_failures_map_to_resource_exhausted() {
        let e: FilterError = DeviceError::OutOfMemory {
            requested: 8,
            available: 4,
        }
        .into();
        assert!(matches!(e, FilterError::ResourceExhausted(_)));

        let e: FilterError = VolumeError::AllocationFailed(16).into();
        assert!(matches!(e, FilterError::ResourceExhausted(_)));

        let e: FilterError = DeviceError::AdapterUnavailable.into();
        assert_eq!(e, FilterError::Device(DeviceError::AdapterUnavailable));
    }
}

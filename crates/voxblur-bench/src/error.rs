use voxblur_filter::FilterError;
use voxblur_volume::VolumeError;

/// An error type for the benchmark harness.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum BenchError {
    /// A benchmarked filter failed.
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// A benchmark volume could not be created.
    #[error(transparent)]
    Volume(#[from] VolumeError),

    /// The noise parameters are not valid.
    #[error("Invalid noise parameters: {0}")]
    InvalidNoise(String),

    /// The harness configuration is not valid.
    #[error("Invalid harness configuration: {0}")]
    InvalidConfig(String),
}

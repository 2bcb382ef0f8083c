use thiserror::Error;

use crate::backend::BufferHandle;

/// An error type for device operations.
#[derive(Error, Debug, PartialEq)]
pub enum DeviceError {
    /// The device could not satisfy an allocation.
    #[error("Device out of memory: requested {requested} bytes, {available} bytes available")]
    OutOfMemory {
        /// Number of bytes requested.
        requested: usize,
        /// Number of bytes still available on the device.
        available: usize,
    },

    /// The handle does not refer to a live allocation.
    #[error("Invalid device buffer handle {0:?}")]
    InvalidHandle(BufferHandle),

    /// A transfer or launch was given a buffer of the wrong length.
    #[error("Length mismatch: expected {0} elements, got {1}")]
    LengthMismatch(usize, usize),

    /// A launch reads from and writes to the same buffer.
    #[error("Launch source and destination alias buffer {0:?}")]
    AliasedBuffers(BufferHandle),

    /// Both the host and the device copy hold unsynchronized writes.
    #[error("Host and device copies are both dirty")]
    ConflictingDirtyState,

    /// The launch configuration is not valid.
    #[error("Invalid launch configuration: {0}")]
    InvalidLaunch(String),

    /// No compatible adapter was found.
    #[error("No compatible compute adapter found")]
    AdapterUnavailable,

    /// An error reported by the underlying backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

//! Backend abstraction for device operations.
//!
//! A [`ComputeDevice`] owns device-side allocations addressed by opaque [`BufferHandle`]s and
//! executes one-dimensional convolution stages over them. Launches issued on the same device
//! execute in submission order.

use voxblur_volume::{Axis, VolumeSize};

use crate::{device::Device, error::DeviceError};

/// Opaque handle to a device allocation of `f32` elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

/// Parameters of a single convolution stage launch.
///
/// The launch computes, for every sample `p` of a volume of size `extent`,
/// `dst[p] = sum_{k=-radius..radius} src[clamp(p + k * axis)] * weights[k + radius]`,
/// with one thread per output sample and `block` threads per execution block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageLaunch {
    /// Buffer read by the stage.
    pub src: BufferHandle,
    /// Buffer written by the stage.
    pub dst: BufferHandle,
    /// Buffer with the `2 * radius + 1` kernel weights.
    pub weights: BufferHandle,
    /// Radius of the kernel.
    pub radius: u32,
    /// Axis along which the kernel is applied.
    pub axis: Axis,
    /// Extents of the volume in samples.
    pub extent: VolumeSize,
    /// Number of threads per block along x, y and z.
    pub block: [u32; 3],
}

impl StageLaunch {
    /// Number of blocks along x, y and z needed to cover the volume.
    pub fn grid(&self) -> [u32; 3] {
        let extent = self.extent.to_array();
        let mut grid = [0u32; 3];
        for i in 0..3 {
            grid[i] = (extent[i] as u32).div_ceil(self.block[i]);
        }
        grid
    }

    /// Number of kernel taps.
    pub fn taps(&self) -> usize {
        2 * self.radius as usize + 1
    }

    /// Check the launch before it is submitted.
    ///
    /// # Errors
    ///
    /// Fails if a block dimension is zero or if the stage writes to the buffer it reads.
    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.block.iter().any(|&b| b == 0) {
            return Err(DeviceError::InvalidLaunch(format!(
                "block dimensions must be > 0, got {:?}",
                self.block
            )));
        }
        if self.src == self.dst || self.weights == self.dst {
            return Err(DeviceError::AliasedBuffers(self.dst));
        }
        Ok(())
    }
}

/// Core operations of a compute device.
///
/// Implementations must be `Send + Sync` so a device can be shared between execution plans.
/// Transfer calls block until the data is in place; launches may be queued and are only
/// guaranteed complete after [`ComputeDevice::synchronize`] or a subsequent
/// [`ComputeDevice::read`].
pub trait ComputeDevice: Send + Sync {
    /// Returns the device type for this backend.
    fn device(&self) -> Device;

    /// Allocates `len` elements of device memory.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::OutOfMemory`] if the device cannot hold the allocation.
    fn alloc(&self, len: usize) -> Result<BufferHandle, DeviceError>;

    /// Releases a device allocation.
    fn free(&self, handle: BufferHandle) -> Result<(), DeviceError>;

    /// Number of elements of a live allocation.
    fn len(&self, handle: BufferHandle) -> Result<usize, DeviceError>;

    /// Copies host data into a device allocation of the same length.
    fn write(&self, handle: BufferHandle, src: &[f32]) -> Result<(), DeviceError>;

    /// Copies a device allocation into host memory of the same length.
    fn read(&self, handle: BufferHandle, dst: &mut [f32]) -> Result<(), DeviceError>;

    /// Queues a convolution stage.
    fn launch_convolution(&self, launch: &StageLaunch) -> Result<(), DeviceError>;

    /// Blocks until every queued launch has completed.
    fn synchronize(&self) -> Result<(), DeviceError> {
        Ok(())
    }
}

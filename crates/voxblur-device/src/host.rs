use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use rayon::prelude::*;

use crate::{
    backend::{BufferHandle, ComputeDevice, StageLaunch},
    device::Device,
    error::DeviceError,
};

/// Counters of the traffic a [`HostDevice`] has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Number of host to device copies.
    pub uploads: usize,
    /// Number of device to host copies.
    pub downloads: usize,
    /// Bytes copied from host to device.
    pub bytes_uploaded: usize,
    /// Bytes copied from device to host.
    pub bytes_downloaded: usize,
    /// Number of convolution stages launched.
    pub launches: usize,
    /// Number of allocations served.
    pub allocations: usize,
}

#[derive(Default)]
struct HostState {
    buffers: HashMap<BufferHandle, Vec<f32>>,
    next_id: u64,
    allocated_bytes: usize,
    stats: TransferStats,
}

/// A compute device that emulates device memory and block launches on the host.
///
/// Device allocations live in host memory that is kept separate from the caller's buffers, so
/// data only moves through explicit [`ComputeDevice::write`] and [`ComputeDevice::read`]
/// calls. Launches run one thread per output sample grouped into blocks, with the blocks of a
/// z-layer of the grid executed in parallel.
#[derive(Default)]
pub struct HostDevice {
    state: Mutex<HostState>,
    memory_limit: Option<usize>,
}

impl HostDevice {
    /// Create a host device without a memory limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a host device that refuses allocations beyond `bytes` in total.
    pub fn with_memory_limit(bytes: usize) -> Self {
        Self {
            state: Mutex::new(HostState::default()),
            memory_limit: Some(bytes),
        }
    }

    /// Snapshot of the transfer counters.
    pub fn stats(&self) -> TransferStats {
        self.lock().stats
    }

    /// Bytes currently allocated on the device.
    pub fn allocated_bytes(&self) -> usize {
        self.lock().allocated_bytes
    }

    /// Number of live allocations.
    pub fn live_buffers(&self) -> usize {
        self.lock().buffers.len()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ComputeDevice for HostDevice {
    fn device(&self) -> Device {
        Device::Host
    }

    fn alloc(&self, len: usize) -> Result<BufferHandle, DeviceError> {
        let bytes = len * std::mem::size_of::<f32>();
        let mut state = self.lock();

        if let Some(limit) = self.memory_limit {
            let available = limit.saturating_sub(state.allocated_bytes);
            if bytes > available {
                return Err(DeviceError::OutOfMemory {
                    requested: bytes,
                    available,
                });
            }
        }

        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| DeviceError::OutOfMemory {
                requested: bytes,
                available: 0,
            })?;
        data.resize(len, 0.0);

        let handle = BufferHandle(state.next_id);
        state.next_id += 1;
        state.allocated_bytes += bytes;
        state.stats.allocations += 1;
        state.buffers.insert(handle, data);
        Ok(handle)
    }

    fn free(&self, handle: BufferHandle) -> Result<(), DeviceError> {
        let mut state = self.lock();
        let data = state
            .buffers
            .remove(&handle)
            .ok_or(DeviceError::InvalidHandle(handle))?;
        state.allocated_bytes -= data.len() * std::mem::size_of::<f32>();
        Ok(())
    }

    fn len(&self, handle: BufferHandle) -> Result<usize, DeviceError> {
        self.lock()
            .buffers
            .get(&handle)
            .map(Vec::len)
            .ok_or(DeviceError::InvalidHandle(handle))
    }

    fn write(&self, handle: BufferHandle, src: &[f32]) -> Result<(), DeviceError> {
        let mut state = self.lock();
        let dst = state
            .buffers
            .get_mut(&handle)
            .ok_or(DeviceError::InvalidHandle(handle))?;
        if dst.len() != src.len() {
            return Err(DeviceError::LengthMismatch(dst.len(), src.len()));
        }
        dst.copy_from_slice(src);
        state.stats.uploads += 1;
        state.stats.bytes_uploaded += std::mem::size_of_val(src);
        Ok(())
    }

    fn read(&self, handle: BufferHandle, dst: &mut [f32]) -> Result<(), DeviceError> {
        let mut state = self.lock();
        let src = state
            .buffers
            .get(&handle)
            .ok_or(DeviceError::InvalidHandle(handle))?;
        if src.len() != dst.len() {
            return Err(DeviceError::LengthMismatch(src.len(), dst.len()));
        }
        dst.copy_from_slice(src);
        state.stats.downloads += 1;
        state.stats.bytes_downloaded += std::mem::size_of_val(dst);
        Ok(())
    }

    fn launch_convolution(&self, launch: &StageLaunch) -> Result<(), DeviceError> {
        launch.validate()?;

        let mut state = self.lock();
        let numel = launch.extent.numel();

        for handle in [launch.src, launch.weights] {
            if !state.buffers.contains_key(&handle) {
                return Err(DeviceError::InvalidHandle(handle));
            }
        }

        // take the output out of the map so the inputs can be borrowed alongside it
        let mut dst = state
            .buffers
            .remove(&launch.dst)
            .ok_or(DeviceError::InvalidHandle(launch.dst))?;

        let result = (|| {
            let src = &state.buffers[&launch.src];
            let weights = &state.buffers[&launch.weights];
            if src.len() != numel {
                return Err(DeviceError::LengthMismatch(numel, src.len()));
            }
            if dst.len() != numel {
                return Err(DeviceError::LengthMismatch(numel, dst.len()));
            }
            if weights.len() != launch.taps() {
                return Err(DeviceError::LengthMismatch(launch.taps(), weights.len()));
            }
            run_stage(launch, src, weights, &mut dst);
            Ok(())
        })();

        state.buffers.insert(launch.dst, dst);
        if result.is_ok() {
            state.stats.launches += 1;
        }
        result
    }
}

/// Execute a stage with the thread and block structure of a device launch.
fn run_stage(launch: &StageLaunch, src: &[f32], weights: &[f32], dst: &mut [f32]) {
    let [w, h, d] = launch.extent.to_array();
    let [bx, by, bz] = launch.block.map(|b| b as usize);
    let [gx, gy, _] = launch.grid().map(|g| g as usize);
    let radius = launch.radius as isize;
    let axis = launch.axis.index();
    let extent = [w, h, d];
    let stride = [1, w, w * h];

    let layer = w * h * bz;
    dst.par_chunks_mut(layer)
        .enumerate()
        .for_each(|(block_z, dst_layer)| {
            let z0 = block_z * bz;
            for block_y in 0..gy {
                for block_x in 0..gx {
                    for tz in 0..bz {
                        for ty in 0..by {
                            for tx in 0..bx {
                                let x = block_x * bx + tx;
                                let y = block_y * by + ty;
                                let z = z0 + tz;
                                if x >= w || y >= h || z >= d {
                                    continue;
                                }

                                let pos = [x, y, z];
                                let base = (z * h + y) * w + x - pos[axis] * stride[axis];
                                let last = extent[axis] as isize - 1;

                                let mut acc = 0.0f32;
                                for (k, &weight) in weights.iter().enumerate() {
                                    let i = (pos[axis] as isize + k as isize - radius).clamp(0, last);
                                    acc += src[base + i as usize * stride[axis]] * weight;
                                }

                                dst_layer[((z - z0) * h + y) * w + x] = acc;
                            }
                        }
                    }
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxblur_volume::Axis;

    fn launch(
        src: BufferHandle,
        dst: BufferHandle,
        weights: BufferHandle,
        radius: u32,
        axis: Axis,
        extent: [usize; 3],
    ) -> StageLaunch {
        StageLaunch {
            src,
            dst,
            weights,
            radius,
            axis,
            extent: extent.into(),
            block: [4, 4, 4],
        }
    }

    #[test]
    fn test_alloc_free() -> Result<(), DeviceError> {
        let device = HostDevice::new();
        let a = device.alloc(16)?;
        let b = device.alloc(4)?;
        assert_ne!(a, b);
        assert_eq!(device.len(a)?, 16);
        assert_eq!(device.allocated_bytes(), 80);
        assert_eq!(device.live_buffers(), 2);

        device.free(a)?;
        assert_eq!(device.allocated_bytes(), 16);
        assert_eq!(device.free(a), Err(DeviceError::InvalidHandle(a)));
        assert_eq!(device.stats().allocations, 2);
        Ok(())
    }

    #[test]
    fn test_memory_limit() -> Result<(), DeviceError> {
        let device = HostDevice::with_memory_limit(64);
        let a = device.alloc(12)?;
        assert_eq!(
            device.alloc(8),
            Err(DeviceError::OutOfMemory {
                requested: 32,
                available: 16
            })
        );
        device.free(a)?;
        device.alloc(16)?;
        Ok(())
    }

    #[test]
    fn test_write_read() -> Result<(), DeviceError> {
        let device = HostDevice::new();
        let handle = device.alloc(3)?;
        device.write(handle, &[1.0, 2.0, 3.0])?;

        let mut out = [0.0; 3];
        device.read(handle, &mut out)?;
        assert_eq!(out, [1.0, 2.0, 3.0]);

        assert_eq!(
            device.write(handle, &[1.0]),
            Err(DeviceError::LengthMismatch(3, 1))
        );

        let stats = device.stats();
        assert_eq!(stats.uploads, 1);
        assert_eq!(stats.downloads, 1);
        assert_eq!(stats.bytes_uploaded, 12);
        assert_eq!(stats.bytes_downloaded, 12);
        Ok(())
    }

    #[test]
    fn test_launch_identity() -> Result<(), DeviceError> {
        let device = HostDevice::new();
        let data = (0..60).map(|i| i as f32).collect::<Vec<_>>();
        let src = device.alloc(60)?;
        let dst = device.alloc(60)?;
        let weights = device.alloc(1)?;
        device.write(src, &data)?;
        device.write(weights, &[1.0])?;

        for axis in Axis::ALL {
            device.launch_convolution(&launch(src, dst, weights, 0, axis, [5, 4, 3]))?;
            let mut out = vec![0.0; 60];
            device.read(dst, &mut out)?;
            assert_eq!(out, data);
        }
        assert_eq!(device.stats().launches, 3);
        Ok(())
    }

    #[test]
    fn test_launch_clamped_box() -> Result<(), DeviceError> {
        let device = HostDevice::new();
        // a single row along z with values 0, 1, 2, 3, 4
        let src = device.alloc(5)?;
        let dst = device.alloc(5)?;
        let weights = device.alloc(3)?;
        device.write(src, &[0.0, 1.0, 2.0, 3.0, 4.0])?;
        device.write(weights, &[1.0, 1.0, 1.0])?;

        device.launch_convolution(&launch(src, dst, weights, 1, Axis::Z, [1, 1, 5]))?;
        let mut out = [0.0; 5];
        device.read(dst, &mut out)?;
        assert_eq!(out, [1.0, 3.0, 6.0, 9.0, 11.0]);
        Ok(())
    }

    #[test]
    fn test_launch_errors() -> Result<(), DeviceError> {
        let device = HostDevice::new();
        let src = device.alloc(8)?;
        let dst = device.alloc(8)?;
        let weights = device.alloc(2)?;

        assert_eq!(
            device.launch_convolution(&launch(src, dst, weights, 1, Axis::X, [2, 2, 2])),
            Err(DeviceError::LengthMismatch(3, 2))
        );
        assert_eq!(
            device.launch_convolution(&launch(src, src, weights, 0, Axis::X, [2, 2, 2])),
            Err(DeviceError::AliasedBuffers(src))
        );
        assert_eq!(
            device.launch_convolution(&launch(src, BufferHandle(99), weights, 0, Axis::X, [2, 2, 2])),
            Err(DeviceError::InvalidHandle(BufferHandle(99)))
        );
        // the destination survives a failed launch
        assert_eq!(device.len(dst)?, 8);
        assert_eq!(device.stats().launches, 0);
        Ok(())
    }
}

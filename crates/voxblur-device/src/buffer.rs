use std::sync::Arc;

use crate::{
    backend::{BufferHandle, ComputeDevice},
    error::DeviceError,
};

/// A device allocation paired with host data and explicit dirty flags.
///
/// The bridge never copies implicitly. Writers mark the side they modified as dirty and the
/// owner calls [`DeviceBuffer::upload_if_dirty`] or [`DeviceBuffer::download_to_host`] to move
/// the data across. The device allocation is released when the buffer is dropped.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use voxblur_device::{DeviceBuffer, HostDevice};
///
/// let device = Arc::new(HostDevice::new());
/// let host = vec![1.0, 2.0, 3.0];
///
/// let mut buffer = DeviceBuffer::from_host(device, &host).unwrap();
/// assert!(!buffer.upload_if_dirty(&host).unwrap());
///
/// let mut out = vec![0.0; 3];
/// buffer.mark_device_dirty();
/// assert!(buffer.download_to_host(&mut out).unwrap());
/// assert_eq!(out, host);
/// ```
pub struct DeviceBuffer {
    device: Arc<dyn ComputeDevice>,
    handle: BufferHandle,
    len: usize,
    host_dirty: bool,
    device_dirty: bool,
}

impl DeviceBuffer {
    /// Allocate an uninitialised device buffer of `len` elements.
    ///
    /// # Errors
    ///
    /// Fails if the device cannot satisfy the allocation.
    pub fn new(device: Arc<dyn ComputeDevice>, len: usize) -> Result<Self, DeviceError> {
        let handle = device.alloc(len)?;
        log::trace!("allocated device buffer {:?} of {} elements", handle, len);
        Ok(Self {
            device,
            handle,
            len,
            host_dirty: false,
            device_dirty: false,
        })
    }

    /// Allocate a device buffer and copy `host` into it.
    pub fn from_host(device: Arc<dyn ComputeDevice>, host: &[f32]) -> Result<Self, DeviceError> {
        let mut buffer = Self::new(device, host.len())?;
        buffer.mark_host_dirty();
        buffer.upload_if_dirty(host)?;
        Ok(buffer)
    }

    /// Record that the host copy was modified.
    pub fn mark_host_dirty(&mut self) {
        self.host_dirty = true;
    }

    /// Record that the device copy was modified, e.g. by a launch writing to it.
    pub fn mark_device_dirty(&mut self) {
        self.device_dirty = true;
    }

    /// Whether the host copy holds writes the device has not seen.
    pub fn is_host_dirty(&self) -> bool {
        self.host_dirty
    }

    /// Whether the device copy holds writes the host has not seen.
    pub fn is_device_dirty(&self) -> bool {
        self.device_dirty
    }

    /// Copy `host` to the device if the host side is dirty.
    ///
    /// # Arguments
    ///
    /// * `host` - The host copy of the data.
    ///
    /// # Returns
    ///
    /// `true` if a transfer happened.
    ///
    /// # Errors
    ///
    /// Fails if both sides are dirty or if `host` has the wrong length.
    pub fn upload_if_dirty(&mut self, host: &[f32]) -> Result<bool, DeviceError> {
        if !self.host_dirty {
            return Ok(false);
        }
        if self.device_dirty {
            return Err(DeviceError::ConflictingDirtyState);
        }
        if host.len() != self.len {
            return Err(DeviceError::LengthMismatch(self.len, host.len()));
        }
        self.device.write(self.handle, host)?;
        self.host_dirty = false;
        Ok(true)
    }

    /// Copy the device data into `host` if the device side is dirty.
    ///
    /// Waits for queued launches before reading.
    ///
    /// # Returns
    ///
    /// `true` if a transfer happened.
    ///
    /// # Errors
    ///
    /// Fails if both sides are dirty or if `host` has the wrong length.
    pub fn download_to_host(&mut self, host: &mut [f32]) -> Result<bool, DeviceError> {
        if !self.device_dirty {
            return Ok(false);
        }
        if self.host_dirty {
            return Err(DeviceError::ConflictingDirtyState);
        }
        if host.len() != self.len {
            return Err(DeviceError::LengthMismatch(self.len, host.len()));
        }
        self.device.synchronize()?;
        self.device.read(self.handle, host)?;
        self.device_dirty = false;
        Ok(true)
    }

    /// The device allocation backing this buffer.
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer has no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The device holding the allocation.
    pub fn device(&self) -> &Arc<dyn ComputeDevice> {
        &self.device
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.device.free(self.handle) {
            log::error!("failed to free device buffer {:?}: {}", self.handle, e);
        }
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("device", &self.device.device())
            .field("handle", &self.handle)
            .field("len", &self.len)
            .field("host_dirty", &self.host_dirty)
            .field("device_dirty", &self.device_dirty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostDevice;

    #[test]
    fn test_upload_only_when_dirty() -> Result<(), DeviceError> {
        let device = Arc::new(HostDevice::new());
        let host = vec![1.0f32; 8];
        let mut buffer = DeviceBuffer::new(device.clone(), host.len())?;

        assert!(!buffer.upload_if_dirty(&host)?);
        assert_eq!(device.stats().uploads, 0);

        buffer.mark_host_dirty();
        assert!(buffer.is_host_dirty());
        assert!(buffer.upload_if_dirty(&host)?);
        assert!(!buffer.is_host_dirty());
        assert!(!buffer.upload_if_dirty(&host)?);
        assert_eq!(device.stats().uploads, 1);
        Ok(())
    }

    #[test]
    fn test_download_only_when_dirty() -> Result<(), DeviceError> {
        let device = Arc::new(HostDevice::new());
        let mut buffer = DeviceBuffer::from_host(device.clone(), &[4.0, 5.0])?;

        let mut out = [0.0f32; 2];
        assert!(!buffer.download_to_host(&mut out)?);
        assert_eq!(out, [0.0, 0.0]);

        buffer.mark_device_dirty();
        assert!(buffer.download_to_host(&mut out)?);
        assert_eq!(out, [4.0, 5.0]);
        assert!(!buffer.is_device_dirty());
        assert_eq!(device.stats().downloads, 1);
        Ok(())
    }

    #[test]
    fn test_conflicting_dirty_state() -> Result<(), DeviceError> {
        let device = Arc::new(HostDevice::new());
        let mut host = vec![0.0f32; 4];
        let mut buffer = DeviceBuffer::new(device, host.len())?;
        buffer.mark_host_dirty();
        buffer.mark_device_dirty();

        assert_eq!(
            buffer.download_to_host(&mut host),
            Err(DeviceError::ConflictingDirtyState)
        );
        assert_eq!(
            buffer.upload_if_dirty(&host),
            Err(DeviceError::ConflictingDirtyState)
        );
        Ok(())
    }

    #[test]
    fn test_length_mismatch() -> Result<(), DeviceError> {
        let device = Arc::new(HostDevice::new());
        let mut buffer = DeviceBuffer::new(device, 4)?;
        buffer.mark_host_dirty();
        assert_eq!(
            buffer.upload_if_dirty(&[1.0; 3]),
            Err(DeviceError::LengthMismatch(4, 3))
        );
        Ok(())
    }

    #[test]
    fn test_drop_frees() -> Result<(), DeviceError> {
        let device = Arc::new(HostDevice::new());
        {
            let buffer = DeviceBuffer::new(device.clone(), 16)?;
            assert_eq!(buffer.len(), 16);
            assert_eq!(device.live_buffers(), 1);
        }
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.allocated_bytes(), 0);
        Ok(())
    }
}

#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Overview
//!
//! Device memory in this crate is always separate from host memory. Data moves between the two
//! only through explicit transfers, and a [`DeviceBuffer`] keeps track of which side holds the
//! latest writes so that transfers happen exactly when they are needed.
//!
//! Every backend implements [`ComputeDevice`]. The [`HostDevice`] emulates a device on the host
//! and is always available; the wgpu backend is enabled with the `wgpu` feature.
//!
//! ```rust
//! use std::sync::Arc;
//! use voxblur_device::{ComputeDevice, DeviceBuffer, HostDevice};
//!
//! let device: Arc<dyn ComputeDevice> = Arc::new(HostDevice::new());
//! let mut buffer = DeviceBuffer::new(device, 4).unwrap();
//!
//! let host = vec![1.0, 2.0, 3.0, 4.0];
//! buffer.mark_host_dirty();
//! assert!(buffer.upload_if_dirty(&host).unwrap());
//! ```

/// backend module containing device operation abstractions.
pub mod backend;

/// Host and device memory bridge with explicit dirty tracking.
pub mod buffer;

/// Device module containing device abstraction.
pub mod device;

/// Error types for the device module.
pub mod error;

/// Host emulated compute device.
pub mod host;

/// Compute device backed by wgpu.
#[cfg(feature = "wgpu")]
pub mod wgpu_backend;

pub use crate::backend::{BufferHandle, ComputeDevice, StageLaunch};
pub use crate::buffer::DeviceBuffer;
pub use crate::device::Device;
pub use crate::error::DeviceError;
pub use crate::host::{HostDevice, TransferStats};
#[cfg(feature = "wgpu")]
pub use crate::wgpu_backend::WgpuDevice;

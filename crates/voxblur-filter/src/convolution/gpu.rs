use std::sync::Arc;

use voxblur_device::{ComputeDevice, DeviceBuffer, HostDevice, StageLaunch};
use voxblur_volume::{Axis, Volume};

use super::{ExecutionPlan, SeparableConvolution};
use crate::{error::FilterError, kernels::Kernel1D};

/// Launch geometry of the GPU plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpuPlanConfig {
    /// Threads per block along x, y and z.
    pub block: [u32; 3],
}

impl Default for GpuPlanConfig {
    fn default() -> Self {
        Self { block: [4, 4, 4] }
    }
}

/// Device execution of the separable convolution.
///
/// The input and the kernels are uploaded once, the three passes run as ordered launches
/// between device-resident intermediates, and the result is downloaded explicitly after the
/// device has been synchronized.
#[derive(Clone)]
pub struct GpuPlan {
    device: Arc<dyn ComputeDevice>,
    config: GpuPlanConfig,
}

impl Default for GpuPlan {
    fn default() -> Self {
        Self {
            device: Arc::new(HostDevice::new()),
            config: GpuPlanConfig::default(),
        }
    }
}

impl std::fmt::Debug for GpuPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuPlan")
            .field("device", &self.device.device())
            .field("config", &self.config)
            .finish()
    }
}

impl GpuPlan {
    /// Create a GPU plan on `device`.
    ///
    /// # Errors
    ///
    /// Every block dimension must be positive.
    pub fn new(device: Arc<dyn ComputeDevice>, config: GpuPlanConfig) -> Result<Self, FilterError> {
        if config.block.contains(&0) {
            return Err(FilterError::InvalidParameter(format!(
                "block dimensions must be > 0, got {:?}",
                config.block
            )));
        }
        Ok(Self { device, config })
    }

    /// The device the plan launches on.
    pub fn device(&self) -> &Arc<dyn ComputeDevice> {
        &self.device
    }

    /// The plan configuration.
    pub fn config(&self) -> &GpuPlanConfig {
        &self.config
    }
}

impl SeparableConvolution for GpuPlan {
    fn plan(&self) -> ExecutionPlan {
        ExecutionPlan::Gpu
    }

    fn apply(&self, src: &Volume, kernels: &[Kernel1D; 3]) -> Result<Volume, FilterError> {
        let size = src.size();
        let numel = size.numel();
        log::debug!(
            "gpu plan on {}: {} radius {:?} block {:?}",
            self.device.device(),
            size,
            [kernels[0].radius(), kernels[1].radius(), kernels[2].radius()],
            self.config.block
        );

        let mut dst = Volume::zeros(size)?;
        dst.copy_information(src);

        let input = DeviceBuffer::from_host(self.device.clone(), src.as_slice())?;
        let weights = [
            DeviceBuffer::from_host(self.device.clone(), kernels[0].weights())?,
            DeviceBuffer::from_host(self.device.clone(), kernels[1].weights())?,
            DeviceBuffer::from_host(self.device.clone(), kernels[2].weights())?,
        ];
        let mut blur_x = DeviceBuffer::new(self.device.clone(), numel)?;
        let mut blur_y = DeviceBuffer::new(self.device.clone(), numel)?;
        let mut output = DeviceBuffer::new(self.device.clone(), numel)?;

        let stages = [
            (Axis::X, input.handle(), blur_x.handle()),
            (Axis::Y, blur_x.handle(), blur_y.handle()),
            (Axis::Z, blur_y.handle(), output.handle()),
        ];
        for (axis, src_handle, dst_handle) in stages {
            let kernel = &kernels[axis.index()];
            self.device.launch_convolution(&StageLaunch {
                src: src_handle,
                dst: dst_handle,
                weights: weights[axis.index()].handle(),
                radius: kernel.radius() as u32,
                axis,
                extent: size,
                block: self.config.block,
            })?;
        }
        blur_x.mark_device_dirty();
        blur_y.mark_device_dirty();
        output.mark_device_dirty();

        self.device.synchronize()?;
        output.download_to_host(dst.as_slice_mut())?;

        Ok(dst)
    }
}

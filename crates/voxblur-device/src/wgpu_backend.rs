//! Compute device backed by a wgpu adapter.

use std::collections::HashMap;
use std::sync::{mpsc, Mutex, MutexGuard};

use wgpu::util::DeviceExt;

use crate::{
    backend::{BufferHandle, ComputeDevice, StageLaunch},
    device::Device,
    error::DeviceError,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct StageParams {
    extent: [u32; 3],
    radius: u32,
    axis: u32,
    _pad: [u32; 3],
}

/// Generate the convolution shader for a given workgroup size.
fn convolution_shader(block: [u32; 3]) -> String {
    format!(
        r#"
struct Params {{
    extent: vec3<u32>,
    radius: u32,
    axis: u32,
    pad0: u32,
    pad1: u32,
    pad2: u32,
}};

@group(0) @binding(0) var<storage, read> src: array<f32>;
@group(0) @binding(1) var<storage, read> weights: array<f32>;
@group(0) @binding(2) var<storage, read_write> dst: array<f32>;
@group(0) @binding(3) var<uniform> params: Params;

@compute @workgroup_size({}, {}, {})
fn convolve(@builtin(global_invocation_id) gid: vec3<u32>) {{
    let extent = params.extent;
    if (gid.x >= extent.x || gid.y >= extent.y || gid.z >= extent.z) {{
        return;
    }}

    let pos = vec3<i32>(gid);
    let center = pos[params.axis];
    let last = i32(extent[params.axis]) - 1;
    let radius = i32(params.radius);
    let taps = 2u * params.radius + 1u;

    var acc = 0.0;
    for (var k = 0u; k < taps; k = k + 1u) {{
        var p = pos;
        p[params.axis] = clamp(center + i32(k) - radius, 0, last);
        let idx = (u32(p.z) * extent.y + u32(p.y)) * extent.x + u32(p.x);
        acc = acc + src[idx] * weights[k];
    }}

    dst[(gid.z * extent.y + gid.y) * extent.x + gid.x] = acc;
}}
"#,
        block[0], block[1], block[2]
    )
}

struct Allocation {
    buffer: wgpu::Buffer,
    len: usize,
}

#[derive(Default)]
struct WgpuState {
    buffers: HashMap<BufferHandle, Allocation>,
    pipelines: HashMap<[u32; 3], wgpu::ComputePipeline>,
    next_id: u64,
}

/// A compute device running convolution stages as wgpu compute shaders.
pub struct WgpuDevice {
    adapter_id: usize,
    device: wgpu::Device,
    queue: wgpu::Queue,
    layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    state: Mutex<WgpuState>,
}

impl WgpuDevice {
    /// Open the default adapter.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::AdapterUnavailable`] if no adapter is found.
    pub fn new() -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(
            instance.request_adapter(&wgpu::RequestAdapterOptions::default()),
        )
        .map_err(|_| DeviceError::AdapterUnavailable)?;
        Self::from_adapter(0, adapter)
    }

    /// Open the adapter at `adapter_id` in enumeration order.
    pub fn with_adapter(adapter_id: usize) -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .enumerate_adapters(wgpu::Backends::all())
            .into_iter()
            .nth(adapter_id)
            .ok_or(DeviceError::AdapterUnavailable)?;
        Self::from_adapter(adapter_id, adapter)
    }

    fn from_adapter(adapter_id: usize, adapter: wgpu::Adapter) -> Result<Self, DeviceError> {
        let info = adapter.get_info();
        log::info!(
            "using wgpu adapter {}: {} ({:?})",
            adapter_id,
            info.name,
            info.backend
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("voxblur_device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            ..Default::default()
        }))
        .map_err(|e| DeviceError::Backend(e.to_string()))?;

        let storage = |binding, read_only| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ConvolutionBindGroupLayout"),
            entries: &[
                storage(0, true),
                storage(1, true),
                storage(2, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ConvolutionPipelineLayout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        Ok(Self {
            adapter_id,
            device,
            queue,
            layout,
            pipeline_layout,
            state: Mutex::new(WgpuState::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, WgpuState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_block(&self, block: [u32; 3]) -> Result<(), DeviceError> {
        let limits = self.device.limits();
        let max = [
            limits.max_compute_workgroup_size_x,
            limits.max_compute_workgroup_size_y,
            limits.max_compute_workgroup_size_z,
        ];
        let invocations = block.iter().product::<u32>();
        if block.iter().zip(max.iter()).any(|(b, m)| b > m)
            || invocations > limits.max_compute_invocations_per_workgroup
        {
            return Err(DeviceError::InvalidLaunch(format!(
                "block {:?} exceeds the device workgroup limits",
                block
            )));
        }
        Ok(())
    }

    fn pipeline(
        &self,
        state: &mut WgpuState,
        block: [u32; 3],
    ) -> Result<wgpu::ComputePipeline, DeviceError> {
        if let Some(pipeline) = state.pipelines.get(&block) {
            return Ok(pipeline.clone());
        }
        self.check_block(block)?;

        log::debug!("compiling convolution pipeline for block {:?}", block);
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("ConvolutionShader"),
                source: wgpu::ShaderSource::Wgsl(convolution_shader(block).into()),
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("ConvolutionPipeline"),
                layout: Some(&self.pipeline_layout),
                module: &shader,
                entry_point: Some("convolve"),
                compilation_options: Default::default(),
                cache: None,
            });
        state.pipelines.insert(block, pipeline.clone());
        Ok(pipeline)
    }
}

impl ComputeDevice for WgpuDevice {
    fn device(&self) -> Device {
        Device::Wgpu {
            adapter_id: self.adapter_id,
        }
    }

    fn alloc(&self, len: usize) -> Result<BufferHandle, DeviceError> {
        let bytes = len * std::mem::size_of::<f32>();
        let limits = self.device.limits();
        let available = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
        if bytes as u64 > available {
            return Err(DeviceError::OutOfMemory {
                requested: bytes,
                available: available as usize,
            });
        }

        // zero sized bindings are invalid
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("DeviceBuffer"),
            size: bytes.max(std::mem::size_of::<f32>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut state = self.lock();
        let handle = BufferHandle(state.next_id);
        state.next_id += 1;
        state.buffers.insert(handle, Allocation { buffer, len });
        Ok(handle)
    }

    fn free(&self, handle: BufferHandle) -> Result<(), DeviceError> {
        let allocation = self
            .lock()
            .buffers
            .remove(&handle)
            .ok_or(DeviceError::InvalidHandle(handle))?;
        allocation.buffer.destroy();
        Ok(())
    }

    fn len(&self, handle: BufferHandle) -> Result<usize, DeviceError> {
        self.lock()
            .buffers
            .get(&handle)
            .map(|a| a.len)
            .ok_or(DeviceError::InvalidHandle(handle))
    }

    fn write(&self, handle: BufferHandle, src: &[f32]) -> Result<(), DeviceError> {
        let state = self.lock();
        let allocation = state
            .buffers
            .get(&handle)
            .ok_or(DeviceError::InvalidHandle(handle))?;
        if allocation.len != src.len() {
            return Err(DeviceError::LengthMismatch(allocation.len, src.len()));
        }
        if !src.is_empty() {
            self.queue
                .write_buffer(&allocation.buffer, 0, bytemuck::cast_slice(src));
        }
        Ok(())
    }

    fn read(&self, handle: BufferHandle, dst: &mut [f32]) -> Result<(), DeviceError> {
        let state = self.lock();
        let allocation = state
            .buffers
            .get(&handle)
            .ok_or(DeviceError::InvalidHandle(handle))?;
        if allocation.len != dst.len() {
            return Err(DeviceError::LengthMismatch(allocation.len, dst.len()));
        }
        if dst.is_empty() {
            return Ok(());
        }

        let size = std::mem::size_of_val(dst) as wgpu::BufferAddress;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("StagingBuffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ReadEncoder"),
            });
        encoder.copy_buffer_to_buffer(&allocation.buffer, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| DeviceError::Backend(e.to_string()))?;
        rx.recv()
            .map_err(|e| DeviceError::Backend(e.to_string()))?
            .map_err(|e| DeviceError::Backend(e.to_string()))?;

        {
            let data = slice.get_mapped_range();
            dst.copy_from_slice(bytemuck::cast_slice(&data));
        }
        staging.unmap();
        Ok(())
    }

    fn launch_convolution(&self, launch: &StageLaunch) -> Result<(), DeviceError> {
        launch.validate()?;

        let mut state = self.lock();
        let numel = launch.extent.numel();
        for (handle, expected) in [
            (launch.src, numel),
            (launch.dst, numel),
            (launch.weights, launch.taps()),
        ] {
            let allocation = state
                .buffers
                .get(&handle)
                .ok_or(DeviceError::InvalidHandle(handle))?;
            if allocation.len != expected {
                return Err(DeviceError::LengthMismatch(expected, allocation.len));
            }
        }

        let pipeline = self.pipeline(&mut state, launch.block)?;

        let [w, h, d] = launch.extent.to_array();
        let params = StageParams {
            extent: [w as u32, h as u32, d as u32],
            radius: launch.radius,
            axis: launch.axis.index() as u32,
            _pad: [0; 3],
        };
        let params_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("StageParams"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ConvolutionBindGroup"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: state.buffers[&launch.src].buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: state.buffers[&launch.weights].buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: state.buffers[&launch.dst].buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ConvolutionEncoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor::default());
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let [gx, gy, gz] = launch.grid();
            pass.dispatch_workgroups(gx, gy, gz);
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn synchronize(&self) -> Result<(), DeviceError> {
        self.device
            .poll(wgpu::PollType::Wait)
            .map(|_| ())
            .map_err(|e| DeviceError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxblur_volume::Axis;

    #[test]
    fn test_shader_workgroup_size() {
        let source = convolution_shader([8, 4, 2]);
        assert!(source.contains("@workgroup_size(8, 4, 2)"));
        assert!(source.contains("fn convolve"));
    }

    #[test]
    fn test_wgpu_box_filter() -> Result<(), DeviceError> {
        let device = match WgpuDevice::new() {
            Ok(device) => device,
            Err(DeviceError::AdapterUnavailable) => return Ok(()),
            Err(e) => return Err(e),
        };

        let src = device.alloc(5)?;
        let dst = device.alloc(5)?;
        let weights = device.alloc(3)?;
        device.write(src, &[0.0, 1.0, 2.0, 3.0, 4.0])?;
        device.write(weights, &[1.0, 1.0, 1.0])?;
        device.launch_convolution(&StageLaunch {
            src,
            dst,
            weights,
            radius: 1,
            axis: Axis::X,
            extent: [5, 1, 1].into(),
            block: [4, 4, 4],
        })?;
        device.synchronize()?;

        let mut out = [0.0; 5];
        device.read(dst, &mut out)?;
        assert_eq!(out, [1.0, 3.0, 6.0, 9.0, 11.0]);
        Ok(())
    }
}

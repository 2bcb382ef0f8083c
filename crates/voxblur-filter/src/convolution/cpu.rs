use voxblur_volume::Volume;

use super::{ExecutionPlan, SeparableConvolution};
use crate::{
    error::FilterError,
    kernels::Kernel1D,
    parallel::{try_for_each_chunk_mut, ExecutionStrategy},
    sampler::clamp_index,
};

/// Width of the accumulator arrays in the inner x loops.
const LANES: usize = 8;

/// Tiling and threading of the CPU plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CpuPlanConfig {
    /// Rows per tile.
    pub tile_y: usize,
    /// Slices per slab; slabs are the unit of parallel work.
    pub tile_z: usize,
    /// How slabs are distributed over threads.
    pub strategy: ExecutionStrategy,
}

impl Default for CpuPlanConfig {
    fn default() -> Self {
        Self {
            tile_y: 64,
            tile_z: 16,
            strategy: ExecutionStrategy::Parallel,
        }
    }
}

/// Tiled host execution of the separable convolution.
///
/// The output is split into slabs of `tile_z` slices processed in parallel, and each slab into
/// tiles of `tile_y` rows. For every tile the x pass is computed over the tile and its y and z
/// halo, the y pass over the tile and its z halo, and the z pass writes the output rows. Halos
/// are recomputed by neighbouring tiles, so no full-size intermediate is allocated.
#[derive(Debug, Clone, Default)]
pub struct CpuPlan {
    config: CpuPlanConfig,
}

/// Per-worker buffers reused across tiles.
#[derive(Default)]
struct TileScratch {
    padded: Vec<f32>,
    blur_x: Vec<f32>,
    blur_y: Vec<f32>,
}

impl CpuPlan {
    /// Create a CPU plan.
    ///
    /// # Errors
    ///
    /// Tile sizes must be positive.
    pub fn new(config: CpuPlanConfig) -> Result<Self, FilterError> {
        if config.tile_y == 0 || config.tile_z == 0 {
            return Err(FilterError::InvalidParameter(format!(
                "tile sizes must be > 0, got tile_y={} tile_z={}",
                config.tile_y, config.tile_z
            )));
        }
        Ok(Self { config })
    }

    /// The plan configuration.
    pub fn config(&self) -> &CpuPlanConfig {
        &self.config
    }

    fn process_slab(
        &self,
        src: &Volume,
        kernels: &[Kernel1D; 3],
        scratch: &mut TileScratch,
        slab: usize,
        out: &mut [f32],
    ) -> Result<(), FilterError> {
        let size = src.size();
        let (w, h, d) = (size.width, size.height, size.depth);
        let src_data = src.as_slice();

        let [kx, ky, kz] = kernels;
        let (rx, ry, rz) = (kx.radius(), ky.radius(), kz.radius());

        let z0 = slab * self.config.tile_z;
        let nz = out.len() / (w * h);
        let hz = nz + 2 * rz;

        let TileScratch {
            padded,
            blur_x,
            blur_y,
        } = scratch;

        for y0 in (0..h).step_by(self.config.tile_y) {
            let ny = self.config.tile_y.min(h - y0);
            let hy = ny + 2 * ry;

            resize_scratch(blur_x, hz * hy * w)?;
            resize_scratch(blur_y, hz * ny * w)?;

            // x pass over the tile with its y and z halo
            for j in 0..hz {
                let z = clamp_index((z0 + j) as isize - rz as isize, d);
                for i in 0..hy {
                    let y = clamp_index((y0 + i) as isize - ry as isize, h);
                    let offset = size.offset(0, y, z);
                    pad_row(&src_data[offset..offset + w], rx, padded)?;
                    let row = (j * hy + i) * w;
                    weighted_rows(&mut blur_x[row..row + w], padded, 0, 1, kx.weights());
                }
            }

            // y pass over the tile with its z halo
            for j in 0..hz {
                for i in 0..ny {
                    let row = (j * ny + i) * w;
                    weighted_rows(
                        &mut blur_y[row..row + w],
                        blur_x,
                        (j * hy + i) * w,
                        w,
                        ky.weights(),
                    );
                }
            }

            // z pass into the output rows
            for j in 0..nz {
                for i in 0..ny {
                    let row = (j * h + y0 + i) * w;
                    weighted_rows(
                        &mut out[row..row + w],
                        blur_y,
                        (j * ny + i) * w,
                        ny * w,
                        kz.weights(),
                    );
                }
            }
        }
        Ok(())
    }
}

impl SeparableConvolution for CpuPlan {
    fn plan(&self) -> ExecutionPlan {
        ExecutionPlan::Cpu
    }

    fn apply(&self, src: &Volume, kernels: &[Kernel1D; 3]) -> Result<Volume, FilterError> {
        let size = src.size();
        log::debug!(
            "cpu plan: {} radius {:?} tiles {}x{} {:?}",
            size,
            [kernels[0].radius(), kernels[1].radius(), kernels[2].radius()],
            self.config.tile_y,
            self.config.tile_z,
            self.config.strategy
        );

        let mut dst = Volume::zeros(size)?;
        dst.copy_information(src);

        let slab_len = size.width * size.height * self.config.tile_z;
        try_for_each_chunk_mut(
            self.config.strategy,
            dst.as_slice_mut(),
            slab_len,
            TileScratch::default,
            |scratch, slab, out| self.process_slab(src, kernels, scratch, slab, out),
        )?;

        Ok(dst)
    }
}

/// Grow or shrink a scratch buffer to `len` samples.
fn resize_scratch(buf: &mut Vec<f32>, len: usize) -> Result<(), FilterError> {
    if len > buf.len() {
        buf.try_reserve(len - buf.len()).map_err(|e| {
            FilterError::ResourceExhausted(format!("tile scratch of {} samples: {}", len, e))
        })?;
    }
    buf.resize(len, 0.0);
    Ok(())
}

/// Copy `row` into `padded` with `radius` repeated edge samples on both sides.
fn pad_row(row: &[f32], radius: usize, padded: &mut Vec<f32>) -> Result<(), FilterError> {
    padded.clear();
    padded
        .try_reserve(row.len() + 2 * radius)
        .map_err(|e| FilterError::ResourceExhausted(format!("padded row: {}", e)))?;
    if let (Some(&first), Some(&last)) = (row.first(), row.last()) {
        padded.extend(std::iter::repeat_n(first, radius));
        padded.extend_from_slice(row);
        padded.extend(std::iter::repeat_n(last, radius));
    }
    Ok(())
}

/// Weighted sum of `weights.len()` rows of `src` into `dst`.
///
/// Row `k` starts at `start + k * stride` and has `dst.len()` samples.
#[inline]
fn weighted_rows(dst: &mut [f32], src: &[f32], start: usize, stride: usize, weights: &[f32]) {
    let mut x0 = start;
    let mut chunks = dst.chunks_exact_mut(LANES);
    for out in &mut chunks {
        let mut acc = [0.0f32; LANES];
        for (k, &w) in weights.iter().enumerate() {
            let row = &src[x0 + k * stride..x0 + k * stride + LANES];
            for (a, &v) in acc.iter_mut().zip(row) {
                *a += v * w;
            }
        }
        out.copy_from_slice(&acc);
        x0 += LANES;
    }

    for (i, out) in chunks.into_remainder().iter_mut().enumerate() {
        let mut acc = 0.0f32;
        for (k, &w) in weights.iter().enumerate() {
            acc += src[x0 + i + k * stride] * w;
        }
        *out = acc;
    }
}

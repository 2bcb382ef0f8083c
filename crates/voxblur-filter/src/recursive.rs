//! Recursive gaussian filtering.
//!
//! Young and van Vliet's third order IIR approximation of the gaussian: a causal pass followed
//! by an anti-causal pass along each axis. The cost per sample does not depend on sigma, which
//! makes it the reference for large kernels.

use voxblur_volume::{Axis, Volume};

use crate::{
    error::FilterError,
    parallel::{for_each_chunk_mut, ExecutionStrategy},
};

/// Smallest sigma, in samples, for which the recursion is applied.
const MIN_SIGMA: f64 = 0.31;

/// Feedback coefficients of the recursive gaussian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecursiveCoefficients {
    /// Weight of the input sample.
    pub b: f64,
    /// Weights of the three previous outputs.
    pub feedback: [f64; 3],
}

impl RecursiveCoefficients {
    /// Coefficients for a gaussian of standard deviation `sigma` samples.
    ///
    /// Returns `None` when sigma is too small for the recursion, in which case the filter
    /// leaves the signal untouched.
    pub fn new(sigma: f64) -> Option<Self> {
        if sigma < MIN_SIGMA {
            return None;
        }

        let q = if sigma < 2.5 {
            3.97156 - 4.14554 * (1.0 - 0.26891 * sigma).sqrt()
        } else {
            0.98711 * sigma - 0.96330
        };
        let q2 = q * q;
        let q3 = q2 * q;

        let b0 = 1.0 / (1.578250 + 2.444130 * q + 1.428100 * q2 + 0.422205 * q3);
        let b1 = 2.44413 * q + 2.85619 * q2 + 1.26661 * q3;
        let b2 = -1.42810 * q2 - 1.26661 * q3;
        let b3 = 0.422205 * q3;

        Some(Self {
            b: 1.0 - (b1 + b2 + b3) * b0,
            feedback: [b1 * b0, b2 * b0, b3 * b0],
        })
    }
}

#[derive(Default)]
struct LineState {
    prev: [Vec<f64>; 3],
}

impl LineState {
    fn reset(&mut self, init: &[f32]) {
        for p in self.prev.iter_mut() {
            p.clear();
            p.extend(init.iter().map(|&v| v as f64));
        }
    }
}

/// Filter `n` interleaved lines of `inner` samples stored in `chunk`, in place.
///
/// Sample `i` of line `j` lives at `i * inner + j`.
fn filter_lines(
    chunk: &mut [f32],
    n: usize,
    inner: usize,
    coeffs: &RecursiveCoefficients,
    state: &mut LineState,
) {
    let [b1, b2, b3] = coeffs.feedback;
    let b = coeffs.b;

    // causal pass, initialised with the first sample repeated
    state.reset(&chunk[..inner]);
    for i in 0..n {
        let row = &mut chunk[i * inner..(i + 1) * inner];
        let [p1, p2, p3] = &mut state.prev;
        for (j, v) in row.iter_mut().enumerate() {
            let y = b * *v as f64 + b1 * p1[j] + b2 * p2[j] + b3 * p3[j];
            p3[j] = p2[j];
            p2[j] = p1[j];
            p1[j] = y;
            *v = y as f32;
        }
    }

    // anti-causal pass, initialised with the last causal output repeated
    state.reset(&chunk[(n - 1) * inner..n * inner]);
    for i in (0..n).rev() {
        let row = &mut chunk[i * inner..(i + 1) * inner];
        let [p1, p2, p3] = &mut state.prev;
        for (j, v) in row.iter_mut().enumerate() {
            let y = b * *v as f64 + b1 * p1[j] + b2 * p2[j] + b3 * p3[j];
            p3[j] = p2[j];
            p2[j] = p1[j];
            p1[j] = y;
            *v = y as f32;
        }
    }
}

/// Apply the recursive gaussian along one axis, in place.
///
/// # Arguments
///
/// * `volume` - The volume to filter.
/// * `sigma` - Standard deviation in samples.
/// * `axis` - The axis along which to filter.
/// * `strategy` - How independent groups of lines are distributed over threads.
pub fn recursive_gaussian_axis(
    volume: &mut Volume,
    sigma: f64,
    axis: Axis,
    strategy: ExecutionStrategy,
) -> Result<(), FilterError> {
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(FilterError::InvalidParameter(format!(
            "sigma must be finite and >= 0, got {}",
            sigma
        )));
    }
    let Some(coeffs) = RecursiveCoefficients::new(sigma) else {
        return Ok(());
    };

    let size = volume.size();
    let n = size.extent(axis);
    let inner = size.stride(axis);

    for_each_chunk_mut(
        strategy,
        volume.as_slice_mut(),
        n * inner,
        LineState::default,
        |state, _, chunk| filter_lines(chunk, n, inner, &coeffs, state),
    )?;
    Ok(())
}

/// Apply the recursive gaussian along x, y and z.
///
/// # Arguments
///
/// * `src` - The input volume.
/// * `sigma` - Standard deviation in samples along x, y and z.
/// * `strategy` - How independent groups of lines are distributed over threads.
///
/// # Returns
///
/// A new volume with the spacing and origin of `src`.
pub fn recursive_gaussian(
    src: &Volume,
    sigma: [f64; 3],
    strategy: ExecutionStrategy,
) -> Result<Volume, FilterError> {
    let mut dst = Volume::zeros(src.size())?;
    dst.as_slice_mut().copy_from_slice(src.as_slice());
    dst.copy_information(src);

    for axis in Axis::ALL {
        recursive_gaussian_axis(&mut dst, sigma[axis.index()], axis, strategy)?;
    }
    Ok(dst)
}

use crate::error::FilterError;

/// A symmetric one-dimensional convolution kernel.
///
/// The kernel holds `2 * radius + 1` weights centred on the middle element.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel1D {
    weights: Vec<f32>,
}

impl Kernel1D {
    /// Create a kernel from its weights.
    ///
    /// # Errors
    ///
    /// The number of weights must be odd.
    pub fn new(weights: Vec<f32>) -> Result<Self, FilterError> {
        if weights.len() % 2 == 0 {
            return Err(FilterError::InvalidParameter(format!(
                "kernel length must be odd, got {}",
                weights.len()
            )));
        }
        Ok(Self { weights })
    }

    /// The kernel `[1.0]` that leaves its input untouched.
    pub fn identity() -> Self {
        Self { weights: vec![1.0] }
    }

    /// Number of taps on each side of the centre.
    pub fn radius(&self) -> usize {
        self.weights.len() / 2
    }

    /// Number of taps.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Whether the kernel has no taps. Always false for a constructed kernel.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Weight at offset `i` from the centre, zero outside `[-radius, radius]`.
    pub fn get(&self, i: isize) -> f32 {
        let idx = i + self.radius() as isize;
        if idx < 0 {
            return 0.0;
        }
        self.weights.get(idx as usize).copied().unwrap_or(0.0)
    }

    /// The weights from offset `-radius` to `radius`.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Sum of the weights.
    pub fn sum(&self) -> f32 {
        self.weights.iter().sum()
    }
}

/// How the kernel weights are derived from the variance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KernelConvention {
    /// The discrete gaussian `exp(-t) * I_n(t)`, truncated by the maximum error.
    #[default]
    DiscreteBessel,
    /// The continuous gaussian sampled at integer offsets with radius `floor(2 * sigma + 1)`.
    Sampled,
}

/// Parameters driving the derivation of the three axis kernels.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KernelParameters {
    /// Variance along x, y and z.
    pub variance: [f64; 3],
    /// Tolerated missing mass of the truncated kernel, in `(0, 1)`.
    pub maximum_error: f64,
    /// Upper bound on the number of taps of a kernel.
    pub maximum_kernel_width: u32,
    /// Express the variance in physical units and divide it by the sample spacing.
    pub use_image_spacing: bool,
    /// Kernel derivation rule.
    pub convention: KernelConvention,
}

impl Default for KernelParameters {
    fn default() -> Self {
        Self {
            variance: [0.0; 3],
            maximum_error: 0.01,
            maximum_kernel_width: 32,
            use_image_spacing: true,
            convention: KernelConvention::DiscreteBessel,
        }
    }
}

impl KernelParameters {
    /// Check that the parameters describe a valid kernel.
    ///
    /// # Errors
    ///
    /// Fails if the width is zero, a variance is negative or not finite, or the maximum error
    /// is outside `(0, 1)`.
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.maximum_kernel_width == 0 {
            return Err(FilterError::InvalidParameter(
                "maximum kernel width must be > 0".to_string(),
            ));
        }
        if !(self.maximum_error > 0.0 && self.maximum_error < 1.0) {
            return Err(FilterError::InvalidParameter(format!(
                "maximum error must be in (0, 1), got {}",
                self.maximum_error
            )));
        }
        for (axis, &v) in self.variance.iter().enumerate() {
            if !v.is_finite() || v < 0.0 {
                return Err(FilterError::InvalidParameter(format!(
                    "variance along axis {} must be finite and >= 0, got {}",
                    axis, v
                )));
            }
        }
        Ok(())
    }

    /// Variance in samples along each axis.
    ///
    /// # Arguments
    ///
    /// * `spacing` - The physical spacing of the volume samples.
    pub fn effective_variance(&self, spacing: [f64; 3]) -> Result<[f64; 3], FilterError> {
        self.validate()?;
        if !self.use_image_spacing {
            return Ok(self.variance);
        }

        let mut variance = self.variance;
        for (axis, v) in variance.iter_mut().enumerate() {
            let s = spacing[axis];
            if !s.is_finite() || s <= 0.0 {
                return Err(FilterError::InvalidParameter(format!(
                    "spacing along axis {} must be > 0, got {}",
                    axis, s
                )));
            }
            *v /= s;
        }
        Ok(variance)
    }

    /// Build the x, y and z kernels for a volume with the given spacing.
    ///
    /// # Errors
    ///
    /// Fails if the parameters or the spacing are invalid.
    pub fn kernels(&self, spacing: [f64; 3]) -> Result<[Kernel1D; 3], FilterError> {
        let variance = self.effective_variance(spacing)?;
        let build = |v: f64| match self.convention {
            KernelConvention::DiscreteBessel => {
                gaussian_kernel_1d(v, self.maximum_error, self.maximum_kernel_width)
            }
            KernelConvention::Sampled => {
                sampled_gaussian_kernel_1d(v.sqrt(), self.maximum_kernel_width)
            }
        };
        Ok([build(variance[0])?, build(variance[1])?, build(variance[2])?])
    }

    /// Radius of the x, y and z kernels for a volume with the given spacing.
    pub fn kernel_radius(&self, spacing: [f64; 3]) -> Result<[usize; 3], FilterError> {
        let [kx, ky, kz] = self.kernels(spacing)?;
        Ok([kx.radius(), ky.radius(), kz.radius()])
    }
}

fn check_width(maximum_kernel_width: u32) -> Result<usize, FilterError> {
    if maximum_kernel_width == 0 {
        return Err(FilterError::InvalidParameter(
            "maximum kernel width must be > 0".to_string(),
        ));
    }
    Ok(((maximum_kernel_width - 1) / 2) as usize)
}

/// Above `t = HANKEL_RATIO * (n + 1)^2` the coefficients come from the asymptotic expansion.
const HANKEL_RATIO: f64 = 1e3;

/// Empty vector with room for `len` values, failing instead of aborting.
fn try_with_capacity<T>(len: usize) -> Result<Vec<T>, FilterError> {
    let mut values = Vec::new();
    values.try_reserve_exact(len).map_err(|e| {
        FilterError::ResourceExhausted(format!("kernel of {} coefficients: {}", len, e))
    })?;
    Ok(values)
}

/// Largest offset at which `exp(-t) * I_n(t)` can still exceed machine epsilon.
fn support_radius(t: f64) -> usize {
    ((9.0 * t.sqrt()).ceil() as usize).saturating_add(16)
}

/// Compute `exp(-t) * I_n(t)` for `n = 0..=n_max`.
fn scaled_bessel_sequence(t: f64, n_max: usize) -> Result<Vec<f64>, FilterError> {
    let n = (n_max as f64) + 1.0;
    if t >= HANKEL_RATIO * n * n {
        hankel_sequence(t, n_max)
    } else {
        miller_sequence(t, n_max)
    }
}

/// Asymptotic expansion of `exp(-t) * I_n(t)` for `t` much larger than `n^2`.
fn hankel_sequence(t: f64, n_max: usize) -> Result<Vec<f64>, FilterError> {
    let mut values = try_with_capacity(n_max + 1)?;
    let norm = 1.0 / (2.0 * std::f64::consts::PI * t).sqrt();
    values.extend((0..=n_max).map(|n| {
        let mu = 4.0 * (n as f64) * (n as f64);
        let mut term = 1.0;
        let mut acc = 1.0;
        for k in 1..=4 {
            let odd = (2 * k - 1) as f64;
            term *= -(mu - odd * odd) / (k as f64 * 8.0 * t);
            acc += term;
        }
        norm * acc
    }));
    Ok(values)
}

/// Backward recurrence normalized with `sum_{n in Z} exp(-t) I_n(t) = 1`.
///
/// Only the first `n_max + 1` values are stored; the tail enters through a running sum.
fn miller_sequence(t: f64, n_max: usize) -> Result<Vec<f64>, FilterError> {
    let mut values = try_with_capacity(n_max + 1)?;
    values.resize(n_max + 1, 0.0);

    // the terms decay like a gaussian of standard deviation sqrt(t)
    let start = n_max
        .saturating_add((10.0 * t.sqrt()).ceil() as usize)
        .saturating_add(32);

    // v_{n+1} and v_n, starting at n = start
    let (mut next, mut current) = (0.0f64, 1e-30f64);
    let mut tail = 0.0f64;
    for n in (1..=start).rev() {
        tail += current;
        if n <= n_max {
            values[n] = current;
        }

        let prev = next + (2.0 * n as f64 / t) * current;
        next = current;
        current = prev;

        if current > 1e200 {
            next *= 1e-200;
            current *= 1e-200;
            tail *= 1e-200;
            if n <= n_max {
                values[n..].iter_mut().for_each(|v| *v *= 1e-200);
            }
        }
    }
    values[0] = current;

    let total = current + 2.0 * tail;
    values.iter_mut().for_each(|v| *v /= total);
    Ok(values)
}

/// Create a discrete gaussian kernel.
///
/// The weights are `exp(-t) * I_n(t)` with `t = variance`, where `I_n` is the modified Bessel
/// function of the first kind. The radius grows until the kernel mass reaches
/// `1 - maximum_error`, a weight drops under machine epsilon, or the kernel reaches
/// `maximum_kernel_width` taps. The weights are not normalized, so a kernel cut by the width
/// sums to less than one.
///
/// # Arguments
///
/// * `variance` - The variance of the gaussian in samples squared.
/// * `maximum_error` - Tolerated missing mass, in `(0, 1)`.
/// * `maximum_kernel_width` - Upper bound on the number of taps.
///
/// # Returns
///
/// The kernel, `[1.0]` when the variance is zero.
pub fn gaussian_kernel_1d(
    variance: f64,
    maximum_error: f64,
    maximum_kernel_width: u32,
) -> Result<Kernel1D, FilterError> {
    let max_radius = check_width(maximum_kernel_width)?;
    if !(maximum_error > 0.0 && maximum_error < 1.0) {
        return Err(FilterError::InvalidParameter(format!(
            "maximum error must be in (0, 1), got {}",
            maximum_error
        )));
    }
    if !variance.is_finite() || variance < 0.0 {
        return Err(FilterError::InvalidParameter(format!(
            "variance must be finite and >= 0, got {}",
            variance
        )));
    }
    if variance < f64::EPSILON {
        return Ok(Kernel1D::identity());
    }

    let cap = 1.0 - maximum_error;
    let coeffs = scaled_bessel_sequence(variance, max_radius.min(support_radius(variance)))?;

    let mut radius = 0;
    let mut sum = coeffs[0];
    while sum < cap {
        if radius == max_radius {
            log::warn!(
                "gaussian kernel truncated at width {} (variance {}, mass {:.4})",
                maximum_kernel_width,
                variance,
                sum
            );
            break;
        }
        let c = match coeffs.get(radius + 1) {
            Some(&c) if c >= f64::EPSILON => c,
            _ => break,
        };
        radius += 1;
        sum += 2.0 * c;
    }

    let mut weights = try_with_capacity(2 * radius + 1)?;
    weights.extend((0..=2 * radius).map(|i| coeffs[i.abs_diff(radius)] as f32));

    log::debug!(
        "gaussian kernel: variance {}, radius {}, mass {:.6}",
        variance,
        radius,
        sum
    );
    Kernel1D::new(weights)
}

/// Create a sampled gaussian kernel.
///
/// The weights are `exp(-i^2 / (2 sigma^2)) / (sigma * sqrt(2 pi))` for
/// `i in [-r, r]` with `r = floor(2 sigma + 1)`, limited by `maximum_kernel_width`.
/// The weights are not normalized.
///
/// # Arguments
///
/// * `sigma` - The standard deviation in samples.
/// * `maximum_kernel_width` - Upper bound on the number of taps.
pub fn sampled_gaussian_kernel_1d(
    sigma: f64,
    maximum_kernel_width: u32,
) -> Result<Kernel1D, FilterError> {
    let max_radius = check_width(maximum_kernel_width)?;
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(FilterError::InvalidParameter(format!(
            "sigma must be finite and >= 0, got {}",
            sigma
        )));
    }
    if sigma < f64::EPSILON {
        return Ok(Kernel1D::identity());
    }

    let radius = ((2.0 * sigma + 1.0).floor() as usize).min(max_radius);
    let norm = 1.0 / (sigma * (2.0 * std::f64::consts::PI).sqrt());
    let mut weights = try_with_capacity(2 * radius + 1)?;
    weights.extend((0..=2 * radius).map(|i| {
        let x = i as f64 - radius as f64;
        ((-(x * x) / (2.0 * sigma * sigma)).exp() * norm) as f32
    }));

    Kernel1D::new(weights)
}

/// Create a box blur kernel of `2 * radius + 1` equal weights summing to one.
pub fn box_kernel_1d(radius: usize) -> Kernel1D {
    let size = 2 * radius + 1;
    Kernel1D {
        weights: vec![1.0 / size as f32; size],
    }
}

use voxblur_volume::Volume;

use crate::{
    convolution::{ConvolutionEngine, SeparableConvolution},
    error::FilterError,
    kernels::{KernelConvention, KernelParameters},
};

/// Gaussian blur of a volume with a discrete gaussian kernel.
///
/// The filter collects its input and parameters through setters and only computes when
/// [`DiscreteGaussianFilter::update`] is called. Kernels are derived again on every update.
///
/// # Examples
///
/// ```
/// use voxblur_filter::DiscreteGaussianFilter;
/// use voxblur_volume::Volume;
///
/// let input = Volume::from_size_val([8, 8, 8].into(), 1.0).unwrap();
///
/// let mut filter = DiscreteGaussianFilter::new();
/// filter.set_input(&input);
/// filter.set_variance(2.0);
/// filter.update().unwrap();
///
/// let output = filter.output().unwrap();
/// assert_eq!(output.size(), input.size());
/// ```
#[derive(Debug, Default)]
pub struct DiscreteGaussianFilter<'a> {
    input: Option<&'a Volume>,
    params: KernelParameters,
    engine: ConvolutionEngine,
    output: Option<Volume>,
}

impl<'a> DiscreteGaussianFilter<'a> {
    /// Create a filter with zero variance, maximum error 0.01, maximum kernel width 32 and
    /// image spacing enabled, running on the CPU plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the volume to filter.
    pub fn set_input(&mut self, input: &'a Volume) {
        self.input = Some(input);
    }

    /// Set the same variance along every axis.
    pub fn set_variance(&mut self, variance: f64) {
        self.params.variance = [variance; 3];
    }

    /// Set the variance along x, y and z.
    pub fn set_variance_per_axis(&mut self, variance: [f64; 3]) {
        self.params.variance = variance;
    }

    /// Set the same standard deviation along every axis.
    pub fn set_sigma(&mut self, sigma: f64) {
        self.params.variance = [sigma * sigma; 3];
    }

    /// Set the maximum number of kernel taps.
    pub fn set_maximum_kernel_width(&mut self, width: u32) {
        self.params.maximum_kernel_width = width;
    }

    /// Set the tolerated missing mass of the truncated kernels.
    pub fn set_maximum_error(&mut self, maximum_error: f64) {
        self.params.maximum_error = maximum_error;
    }

    /// Interpret the variance in physical units.
    pub fn set_use_image_spacing(&mut self, use_image_spacing: bool) {
        self.params.use_image_spacing = use_image_spacing;
    }

    /// Set the kernel derivation rule.
    pub fn set_kernel_convention(&mut self, convention: KernelConvention) {
        self.params.convention = convention;
    }

    /// Set the convolution engine.
    pub fn set_engine(&mut self, engine: ConvolutionEngine) {
        self.engine = engine;
    }

    /// Replace all kernel parameters.
    pub fn set_parameters(&mut self, params: KernelParameters) {
        self.params = params;
    }

    /// The input volume, if set.
    pub fn input(&self) -> Option<&'a Volume> {
        self.input
    }

    /// The variance along x, y and z.
    pub fn variance(&self) -> [f64; 3] {
        self.params.variance
    }

    /// The maximum number of kernel taps.
    pub fn maximum_kernel_width(&self) -> u32 {
        self.params.maximum_kernel_width
    }

    /// The tolerated missing mass of the truncated kernels.
    pub fn maximum_error(&self) -> f64 {
        self.params.maximum_error
    }

    /// Whether the variance is in physical units.
    pub fn use_image_spacing(&self) -> bool {
        self.params.use_image_spacing
    }

    /// The kernel derivation rule.
    pub fn kernel_convention(&self) -> KernelConvention {
        self.params.convention
    }

    /// The convolution engine.
    pub fn engine(&self) -> &ConvolutionEngine {
        &self.engine
    }

    /// All kernel parameters.
    pub fn parameters(&self) -> &KernelParameters {
        &self.params
    }

    /// Radius of the x, y and z kernels for the current input.
    ///
    /// # Errors
    ///
    /// Fails if no input is set or the parameters are invalid.
    pub fn kernel_radius(&self) -> Result<[usize; 3], FilterError> {
        let input = self.input.ok_or(FilterError::MissingInput)?;
        self.params.kernel_radius(input.spacing())
    }

    /// Derive the kernels and filter the input.
    ///
    /// # Errors
    ///
    /// Fails if no input is set, the parameters are invalid, or the engine fails. The previous
    /// output is discarded in every case.
    pub fn update(&mut self) -> Result<(), FilterError> {
        self.output = None;
        let input = self.input.ok_or(FilterError::MissingInput)?;

        let kernels = self.params.kernels(input.spacing())?;
        log::debug!(
            "discrete gaussian: variance {:?}, radius {:?}, engine {}",
            self.params.variance,
            [kernels[0].radius(), kernels[1].radius(), kernels[2].radius()],
            self.engine.plan()
        );

        self.output = Some(self.engine.apply(input, &kernels)?);
        Ok(())
    }

    /// The output of the last successful update.
    pub fn output(&self) -> Option<&Volume> {
        self.output.as_ref()
    }

    /// Take the output of the last successful update.
    pub fn take_output(&mut self) -> Option<Volume> {
        self.output.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convolution::GpuPlan;

    #[test]
    fn test_missing_input() {
        let mut filter = DiscreteGaussianFilter::new();
        assert_eq!(filter.update(), Err(FilterError::MissingInput));
        assert_eq!(filter.kernel_radius(), Err(FilterError::MissingInput));
        assert!(filter.output().is_none());
    }

    #[test]
    fn test_defaults() {
        let filter = DiscreteGaussianFilter::new();
        assert_eq!(filter.variance(), [0.0; 3]);
        assert_eq!(filter.maximum_error(), 0.01);
        assert_eq!(filter.maximum_kernel_width(), 32);
        assert!(filter.use_image_spacing());
        assert_eq!(filter.kernel_convention(), KernelConvention::DiscreteBessel);
        assert!(filter.input().is_none());
    }

    #[test]
    fn test_zero_variance_is_identity() -> Result<(), FilterError> {
        let input = Volume::from_fn([5, 4, 3].into(), |x, y, z| (x + y * z) as f32)?
            .with_spacing([0.5, 0.5, 2.0])?
            .with_origin([1.0, -1.0, 0.0]);

        let mut filter = DiscreteGaussianFilter::new();
        filter.set_input(&input);
        filter.update()?;

        assert_eq!(filter.kernel_radius()?, [0, 0, 0]);
        assert_eq!(filter.output(), Some(&input));
        Ok(())
    }

    #[test]
    fn test_sigma_and_spacing() -> Result<(), FilterError> {
        let input = Volume::zeros([4, 4, 4].into())?.with_spacing([1.0, 2.0, 4.0])?;
        let mut filter = DiscreteGaussianFilter::new();
        filter.set_input(&input);
        filter.set_sigma(2.0);
        assert_eq!(filter.variance(), [4.0; 3]);

        let radius = filter.kernel_radius()?;
        assert!(radius[0] > radius[2]);

        filter.set_use_image_spacing(false);
        let radius = filter.kernel_radius()?;
        assert_eq!(radius[0], radius[2]);
        Ok(())
    }

    #[test]
    fn test_invalid_parameters_clear_output() -> Result<(), FilterError> {
        let input = Volume::from_size_val([3, 3, 3].into(), 2.0)?;
        let mut filter = DiscreteGaussianFilter::new();
        filter.set_input(&input);
        filter.set_variance(1.0);
        filter.update()?;
        assert!(filter.output().is_some());

        filter.set_maximum_kernel_width(0);
        assert!(matches!(
            filter.update(),
            Err(FilterError::InvalidParameter(_))
        ));
        assert!(filter.output().is_none());
        Ok(())
    }

    #[test]
    fn test_engines_agree() -> Result<(), FilterError> {
        let input = Volume::from_fn([10, 8, 6].into(), |x, y, z| ((x ^ y) + z) as f32)?;

        let mut filter = DiscreteGaussianFilter::new();
        filter.set_input(&input);
        filter.set_variance_per_axis([1.0, 2.0, 3.0]);
        filter.update()?;
        let cpu = filter.take_output().ok_or(FilterError::MissingInput)?;

        filter.set_engine(GpuPlan::default().into());
        filter.update()?;
        let gpu = filter.take_output().ok_or(FilterError::MissingInput)?;

        assert!(cpu.max_abs_diff(&gpu)? < 1e-3);
        Ok(())
    }
}

use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use voxblur_volume::Volume;

use crate::error::BenchError;

/// Default standard deviation of the benchmark noise.
pub const DEFAULT_NOISE_STDDEV: f32 = 2.0;

/// Add gaussian noise to every sample of a volume.
///
/// # Arguments
///
/// * `volume` - The volume to modify.
/// * `mean` - Mean of the noise.
/// * `stddev` - Standard deviation of the noise.
/// * `rng` - The random number generator.
///
/// # Errors
///
/// The standard deviation must be finite and non-negative.
pub fn add_gaussian_noise<R: Rng + ?Sized>(
    volume: &mut Volume,
    mean: f32,
    stddev: f32,
    rng: &mut R,
) -> Result<(), BenchError> {
    let normal = Normal::new(mean, stddev).map_err(|e| BenchError::InvalidNoise(e.to_string()))?;
    volume
        .as_slice_mut()
        .iter_mut()
        .for_each(|v| *v += normal.sample(rng));
    Ok(())
}

/// Create a cube of zero-mean gaussian noise.
///
/// The cube has `extent * resolution` samples per axis and a spacing of `1 / resolution`, so
/// it always covers `extent` physical units.
///
/// # Arguments
///
/// * `extent` - Physical size of the cube along each axis.
/// * `resolution` - Samples per physical unit.
/// * `stddev` - Standard deviation of the noise.
/// * `seed` - Seed of the random number generator.
///
/// # Examples
///
/// ```
/// use voxblur_bench::make_noisy_volume;
///
/// let volume = make_noisy_volume(10.0, 5, 2.0, 0).unwrap();
/// assert_eq!(volume.width(), 50);
/// assert_eq!(volume.spacing(), [0.2; 3]);
/// ```
pub fn make_noisy_volume(
    extent: f32,
    resolution: usize,
    stddev: f32,
    seed: u64,
) -> Result<Volume, BenchError> {
    if resolution == 0 || !(extent.is_finite() && extent > 0.0) {
        return Err(BenchError::InvalidConfig(format!(
            "extent {} and resolution {} must be positive",
            extent, resolution
        )));
    }

    let n = (extent * resolution as f32) as usize;
    let mut volume = Volume::zeros([n; 3].into())?.with_spacing([1.0 / resolution as f64; 3])?;

    let mut rng = StdRng::seed_from_u64(seed);
    add_gaussian_noise(&mut volume, 0.0, stddev, &mut rng)?;
    Ok(volume)
}

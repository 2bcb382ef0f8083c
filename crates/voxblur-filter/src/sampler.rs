use voxblur_volume::Volume;

/// Clamp `i` to `[0, len - 1]`.
#[inline(always)]
pub(crate) fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

/// Reads volume samples at arbitrary integer coordinates.
///
/// Coordinates outside the volume are clamped to the nearest edge independently along each
/// axis, so the volume behaves as if its border samples were repeated forever.
///
/// # Examples
///
/// ```
/// use voxblur_filter::BoundaryExtendedSampler;
/// use voxblur_volume::Volume;
///
/// let volume = Volume::new([5, 1, 1].into(), vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
/// let sampler = BoundaryExtendedSampler::new(&volume);
///
/// assert_eq!(sampler.sample(-3, 0, 0), 1.0);
/// assert_eq!(sampler.sample(2, 4, -1), 3.0);
/// assert_eq!(sampler.sample(9, 0, 0), 5.0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BoundaryExtendedSampler<'a> {
    volume: &'a Volume,
}

impl<'a> BoundaryExtendedSampler<'a> {
    /// Create a sampler over `volume`.
    pub fn new(volume: &'a Volume) -> Self {
        Self { volume }
    }

    /// The sample at `(x, y, z)` after clamping each coordinate into the volume.
    #[inline]
    pub fn sample(&self, x: isize, y: isize, z: isize) -> f32 {
        let size = self.volume.size();
        let offset = size.offset(
            clamp_index(x, size.width),
            clamp_index(y, size.height),
            clamp_index(z, size.depth),
        );
        self.volume.as_slice()[offset]
    }

    /// The sampled volume.
    pub fn volume(&self) -> &'a Volume {
        self.volume
    }
}

use crate::error::VolumeError;

/// Volume size in samples
///
/// A struct to represent the extents of a volume along the x, y and z axes.
///
/// # Examples
///
/// ```
/// use voxblur_volume::VolumeSize;
///
/// let size = VolumeSize {
///     width: 10,
///     height: 20,
///     depth: 5,
/// };
///
/// assert_eq!(size.numel(), 1000);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VolumeSize {
    /// Number of samples along the x axis
    pub width: usize,
    /// Number of samples along the y axis
    pub height: usize,
    /// Number of samples along the z axis
    pub depth: usize,
}

impl VolumeSize {
    /// Total number of samples.
    #[inline]
    pub fn numel(&self) -> usize {
        self.width * self.height * self.depth
    }

    /// Extent of the given axis.
    #[inline]
    pub fn extent(&self, axis: Axis) -> usize {
        match axis {
            Axis::X => self.width,
            Axis::Y => self.height,
            Axis::Z => self.depth,
        }
    }

    /// Distance in the flat buffer between two neighbours along `axis`.
    #[inline]
    pub fn stride(&self, axis: Axis) -> usize {
        match axis {
            Axis::X => 1,
            Axis::Y => self.width,
            Axis::Z => self.width * self.height,
        }
    }

    /// Flat offset of the sample at `(x, y, z)`.
    #[inline]
    pub fn offset(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.height + y) * self.width + x
    }

    /// Extents as an `[x, y, z]` array.
    pub fn to_array(&self) -> [usize; 3] {
        [self.width, self.height, self.depth]
    }
}

impl std::fmt::Display for VolumeSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "VolumeSize {{ width: {}, height: {}, depth: {} }}",
            self.width, self.height, self.depth
        )
    }
}

impl From<[usize; 3]> for VolumeSize {
    fn from(size: [usize; 3]) -> Self {
        VolumeSize {
            width: size[0],
            height: size[1],
            depth: size[2],
        }
    }
}

/// One of the three spatial axes of a volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Axis {
    /// The fastest varying axis.
    X,
    /// The middle axis.
    Y,
    /// The slowest varying axis.
    Z,
}

impl Axis {
    /// The axes in the order the separable filters visit them.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Position of the axis in `[x, y, z]` arrays.
    #[inline]
    pub fn index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Allocate a zero-filled buffer of `len` samples without aborting on failure.
///
/// # Errors
///
/// Returns [`VolumeError::AllocationFailed`] if the allocator cannot satisfy the request.
pub fn try_alloc(len: usize) -> Result<Vec<f32>, VolumeError> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| VolumeError::AllocationFailed(len))?;
    data.resize(len, 0.0);
    Ok(data)
}

fn check_spacing(spacing: [f64; 3]) -> Result<(), VolumeError> {
    for (axis, &s) in spacing.iter().enumerate() {
        if !s.is_finite() || s <= 0.0 {
            return Err(VolumeError::InvalidSpacing(axis, s));
        }
    }
    Ok(())
}

/// A 3D volume of single precision samples.
///
/// The samples are stored x-fastest, i.e. the sample at `(x, y, z)` lives at
/// `(z * height + y) * width + x`. The volume carries the physical spacing between samples
/// and the physical position of its first sample.
#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    data: Vec<f32>,
    size: VolumeSize,
    spacing: [f64; 3],
    origin: [f64; 3],
}

impl Volume {
    /// Create a new volume from sample data.
    ///
    /// The spacing defaults to `1.0` and the origin to `0.0` along every axis.
    ///
    /// # Arguments
    ///
    /// * `size` - The extents of the volume.
    /// * `data` - The samples in x-fastest order.
    ///
    /// # Errors
    ///
    /// If an extent is zero or the data length does not match the size, an error is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use voxblur_volume::{Volume, VolumeSize};
    ///
    /// let volume = Volume::new([2, 3, 4].into(), vec![0.0; 24]).unwrap();
    ///
    /// assert_eq!(volume.size(), VolumeSize { width: 2, height: 3, depth: 4 });
    /// assert_eq!(volume.spacing(), [1.0, 1.0, 1.0]);
    /// ```
    pub fn new(size: VolumeSize, data: Vec<f32>) -> Result<Self, VolumeError> {
        if size.width == 0 || size.height == 0 || size.depth == 0 {
            return Err(VolumeError::ZeroExtent(size));
        }

        if data.len() != size.numel() {
            return Err(VolumeError::InvalidDataLength(data.len(), size.numel()));
        }

        Ok(Self {
            data,
            size,
            spacing: [1.0; 3],
            origin: [0.0; 3],
        })
    }

    /// Create a new volume with all samples set to `val`.
    ///
    /// # Errors
    ///
    /// If an extent is zero or the samples cannot be allocated, an error is returned.
    pub fn from_size_val(size: VolumeSize, val: f32) -> Result<Self, VolumeError> {
        if size.width == 0 || size.height == 0 || size.depth == 0 {
            return Err(VolumeError::ZeroExtent(size));
        }
        let mut data = try_alloc(size.numel())?;
        if val != 0.0 {
            data.fill(val);
        }
        Self::new(size, data)
    }

    /// Create a zero-filled volume.
    pub fn zeros(size: VolumeSize) -> Result<Self, VolumeError> {
        Self::from_size_val(size, 0.0)
    }

    /// Create a volume by evaluating `f(x, y, z)` at every sample.
    ///
    /// # Examples
    ///
    /// ```
    /// use voxblur_volume::Volume;
    ///
    /// let volume = Volume::from_fn([3, 2, 2].into(), |x, y, z| (x + 10 * y + 100 * z) as f32).unwrap();
    ///
    /// assert_eq!(volume.get(2, 1, 1), Some(112.0));
    /// ```
    pub fn from_fn(
        size: VolumeSize,
        f: impl Fn(usize, usize, usize) -> f32,
    ) -> Result<Self, VolumeError> {
        let mut volume = Self::zeros(size)?;
        for z in 0..size.depth {
            for y in 0..size.height {
                for x in 0..size.width {
                    volume.data[size.offset(x, y, z)] = f(x, y, z);
                }
            }
        }
        Ok(volume)
    }

    /// Set the physical spacing between samples.
    ///
    /// # Errors
    ///
    /// Every spacing must be finite and strictly positive.
    pub fn with_spacing(mut self, spacing: [f64; 3]) -> Result<Self, VolumeError> {
        check_spacing(spacing)?;
        self.spacing = spacing;
        Ok(self)
    }

    /// Set the physical position of the first sample.
    pub fn with_origin(mut self, origin: [f64; 3]) -> Self {
        self.origin = origin;
        self
    }

    /// Set the physical spacing between samples in place.
    pub fn set_spacing(&mut self, spacing: [f64; 3]) -> Result<(), VolumeError> {
        check_spacing(spacing)?;
        self.spacing = spacing;
        Ok(())
    }

    /// Set the physical position of the first sample in place.
    pub fn set_origin(&mut self, origin: [f64; 3]) {
        self.origin = origin;
    }

    /// Copy spacing and origin from another volume.
    pub fn copy_information(&mut self, other: &Volume) {
        self.spacing = other.spacing;
        self.origin = other.origin;
    }

    /// Get the size of the volume in samples.
    pub fn size(&self) -> VolumeSize {
        self.size
    }

    /// Get the number of samples along x.
    pub fn width(&self) -> usize {
        self.size.width
    }

    /// Get the number of samples along y.
    pub fn height(&self) -> usize {
        self.size.height
    }

    /// Get the number of samples along z.
    pub fn depth(&self) -> usize {
        self.size.depth
    }

    /// Get the total number of samples.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Get the physical spacing between samples.
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// Get the physical position of the first sample.
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    /// Get the samples as a slice.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Get the samples as a mutable slice.
    pub fn as_slice_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consume the volume and return its samples.
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Get the sample at `(x, y, z)`, or `None` if out of bounds.
    pub fn get(&self, x: usize, y: usize, z: usize) -> Option<f32> {
        if x >= self.size.width || y >= self.size.height || z >= self.size.depth {
            return None;
        }
        Some(self.data[self.size.offset(x, y, z)])
    }

    /// Get a mutable reference to the sample at `(x, y, z)`, or `None` if out of bounds.
    pub fn get_mut(&mut self, x: usize, y: usize, z: usize) -> Option<&mut f32> {
        if x >= self.size.width || y >= self.size.height || z >= self.size.depth {
            return None;
        }
        let offset = self.size.offset(x, y, z);
        self.data.get_mut(offset)
    }

    /// Get the size in bytes of the sample buffer.
    pub fn nbytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// Largest absolute difference between the samples of two volumes.
    ///
    /// # Errors
    ///
    /// The volumes must have the same size.
    pub fn max_abs_diff(&self, other: &Volume) -> Result<f32, VolumeError> {
        if self.size != other.size {
            return Err(VolumeError::SizeMismatch(self.size, other.size));
        }
        Ok(self
            .data
            .iter()
            .zip(other.data.iter())
            .fold(0.0f32, |acc, (a, b)| acc.max((a - b).abs())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_size() {
        let size = VolumeSize::from([4, 3, 2]);
        assert_eq!(size.width, 4);
        assert_eq!(size.height, 3);
        assert_eq!(size.depth, 2);
        assert_eq!(size.numel(), 24);
        assert_eq!(size.stride(Axis::X), 1);
        assert_eq!(size.stride(Axis::Y), 4);
        assert_eq!(size.stride(Axis::Z), 12);
        assert_eq!(size.offset(1, 2, 1), 12 + 8 + 1);
    }

    #[test]
    fn volume_smoke() -> Result<(), VolumeError> {
        let volume = Volume::new([2, 3, 4].into(), vec![0.0; 24])?;
        assert_eq!(volume.width(), 2);
        assert_eq!(volume.height(), 3);
        assert_eq!(volume.depth(), 4);
        assert_eq!(volume.numel(), 24);
        assert_eq!(volume.nbytes(), 96);
        assert_eq!(volume.origin(), [0.0; 3]);
        Ok(())
    }

    #[test]
    fn volume_invalid_length() {
        let res = Volume::new([2, 2, 2].into(), vec![0.0; 7]);
        assert_eq!(res, Err(VolumeError::InvalidDataLength(7, 8)));
    }

    #[test]
    fn volume_zero_extent() {
        let size = VolumeSize::from([2, 0, 2]);
        assert_eq!(Volume::new(size, vec![]), Err(VolumeError::ZeroExtent(size)));
        assert_eq!(Volume::zeros(size), Err(VolumeError::ZeroExtent(size)));
    }

    #[test]
    fn volume_spacing() -> Result<(), VolumeError> {
        let volume = Volume::zeros([2, 2, 2].into())?
            .with_spacing([0.5, 1.0, 2.0])?
            .with_origin([1.0, 2.0, 3.0]);
        assert_eq!(volume.spacing(), [0.5, 1.0, 2.0]);
        assert_eq!(volume.origin(), [1.0, 2.0, 3.0]);

        let res = Volume::zeros([2, 2, 2].into())?.with_spacing([1.0, -1.0, 1.0]);
        assert_eq!(res, Err(VolumeError::InvalidSpacing(1, -1.0)));

        let res = Volume::zeros([2, 2, 2].into())?.with_spacing([1.0, 1.0, f64::NAN]);
        assert!(matches!(res, Err(VolumeError::InvalidSpacing(2, _))));
        Ok(())
    }

    #[test]
    fn volume_get() -> Result<(), VolumeError> {
        let mut volume = Volume::from_fn([3, 2, 2].into(), |x, y, z| (x + 10 * y + 100 * z) as f32)?;
        assert_eq!(volume.get(0, 0, 0), Some(0.0));
        assert_eq!(volume.get(2, 1, 1), Some(112.0));
        assert_eq!(volume.get(3, 0, 0), None);

        if let Some(v) = volume.get_mut(1, 1, 0) {
            *v = -1.0;
        }
        assert_eq!(volume.as_slice()[4], -1.0);
        Ok(())
    }

    #[test]
    fn volume_max_abs_diff() -> Result<(), VolumeError> {
        let a = Volume::from_size_val([2, 2, 1].into(), 1.0)?;
        let mut b = a.clone();
        b.as_slice_mut()[3] = 1.5;
        assert_eq!(a.max_abs_diff(&b)?, 0.5);

        let c = Volume::zeros([1, 2, 2].into())?;
        assert!(matches!(
            a.max_abs_diff(&c),
            Err(VolumeError::SizeMismatch(_, _))
        ));
        Ok(())
    }

    #[test]
    fn try_alloc_too_large() {
        assert_eq!(
            try_alloc(usize::MAX / 2),
            Err(VolumeError::AllocationFailed(usize::MAX / 2))
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn volume_size_serde() -> Result<(), Box<dyn std::error::Error>> {
        let size = VolumeSize::from([4, 5, 6]);
        let json = serde_json::to_string(&size)?;
        let back: VolumeSize = serde_json::from_str(&json)?;
        assert_eq!(size, back);
        Ok(())
    }
}

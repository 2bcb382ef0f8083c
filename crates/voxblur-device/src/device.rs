/// Device type enumeration for kernel execution.
///
/// Represents the different compute devices a convolution stage can be launched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    /// Launches emulated on the host, with device memory kept in separate host allocations.
    #[default]
    Host,
    /// A wgpu adapter with its enumeration index
    #[cfg(feature = "wgpu")]
    Wgpu {
        /// The adapter index
        adapter_id: usize,
    },
}

impl Device {
    /// Returns the device type as a string.
    pub fn device_type(&self) -> &str {
        match self {
            Device::Host => "host",
            #[cfg(feature = "wgpu")]
            Device::Wgpu { .. } => "wgpu",
        }
    }

    /// Returns the device ID if applicable.
    pub fn device_id(&self) -> Option<usize> {
        match self {
            Device::Host => None,
            #[cfg(feature = "wgpu")]
            Device::Wgpu { adapter_id } => Some(*adapter_id),
        }
    }

    /// Returns true if launches run on the host.
    pub fn is_host(&self) -> bool {
        matches!(self, Device::Host)
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Host => write!(f, "host"),
            #[cfg(feature = "wgpu")]
            Device::Wgpu { adapter_id } => write!(f, "wgpu:{}", adapter_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_host() {
        let device = Device::Host;
        assert_eq!(device.device_type(), "host");
        assert_eq!(device.device_id(), None);
        assert!(device.is_host());
        assert_eq!(format!("{}", device), "host");
    }

    #[test]
    fn test_device_default() {
        assert_eq!(Device::default(), Device::Host);
    }

    #[cfg(feature = "wgpu")]
    #[test]
    fn test_device_wgpu() {
        let device = Device::Wgpu { adapter_id: 1 };
        assert_eq!(device.device_type(), "wgpu");
        assert_eq!(device.device_id(), Some(1));
        assert!(!device.is_host());
        assert_eq!(format!("{}", device), "wgpu:1");
    }
}

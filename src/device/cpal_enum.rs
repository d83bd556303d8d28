//! Device enumeration over the host's cpal output devices.

use cpal::traits::{DeviceTrait, HostTrait};

use super::{AudioDevice, DeviceEnumerator};
use crate::HardwareError;

/// Enumerates output devices of the default cpal host.
///
/// cpal exposes no stable endpoint path, so the device name doubles as the
/// opaque id. Devices whose name cannot be read are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDeviceEnumerator;

impl CpalDeviceEnumerator {
    /// Creates an enumerator over the default host.
    pub fn new() -> Self {
        Self
    }
}

fn describe(device: &cpal::Device) -> Option<AudioDevice> {
    device
        .name()
        .ok()
        .map(|name| AudioDevice::new(name.clone(), name))
}

impl DeviceEnumerator for CpalDeviceEnumerator {
    fn default_device(&self) -> Result<Option<AudioDevice>, HardwareError> {
        Ok(cpal::default_host()
            .default_output_device()
            .as_ref()
            .and_then(describe))
    }

    fn active_devices(&self) -> Result<Vec<AudioDevice>, HardwareError> {
        let devices = cpal::default_host()
            .output_devices()
            .map_err(|e| HardwareError::new("output_devices", e.to_string()))?;

        Ok(devices.filter_map(|d| describe(&d)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceCatalog;

    #[test]
    fn test_enumerate_doesnt_panic() {
        // May be empty in CI, but shouldn't panic
        let _ = DeviceCatalog::enumerate(&CpalDeviceEnumerator::new(), None);
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_default_device_is_listed_first() {
        let enumerator = CpalDeviceEnumerator::new();
        let default = enumerator.default_device().unwrap().unwrap();
        let catalog = DeviceCatalog::enumerate(&enumerator, None);
        assert_eq!(catalog.default_device(), Some(&default));
    }
}

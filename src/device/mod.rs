//! Output device enumeration and selection.
//!
//! The [`DeviceCatalog`] is a fresh, immutable snapshot produced by each
//! enumeration: the system default device first, followed by every active
//! output device. The default is not excluded from the full list, so it
//! usually appears twice.

mod cpal_enum;
mod device_id;

pub use cpal_enum::CpalDeviceEnumerator;
pub use device_id::DeviceId;

use std::fmt::Write as _;

use crate::event::{emit, EventCallback, SessionEvent};
use crate::HardwareError;

/// Index of the system default device within a catalog.
pub const DEFAULT_DEVICE_INDEX: usize = 0;

/// An output device as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    /// Opaque, stable identity of the device.
    pub id: DeviceId,
    /// Human-readable name.
    pub name: String,
}

impl AudioDevice {
    /// Creates a device entry.
    pub fn new(id: impl Into<DeviceId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Query interface over the platform's output devices.
///
/// Implemented by hardware backends; see [`CpalDeviceEnumerator`] and
/// [`MockBackend`](crate::MockBackend).
pub trait DeviceEnumerator {
    /// Returns the system default output device, if one is configured.
    ///
    /// An error here means the enumeration API itself is unavailable.
    fn default_device(&self) -> Result<Option<AudioDevice>, HardwareError>;

    /// Returns every currently active output device.
    fn active_devices(&self) -> Result<Vec<AudioDevice>, HardwareError>;
}

/// Ordered snapshot of the available output devices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCatalog {
    devices: Vec<AudioDevice>,
}

impl DeviceCatalog {
    /// Builds a catalog from an explicit device list (first entry is the default).
    #[must_use]
    pub fn from_devices(devices: Vec<AudioDevice>) -> Self {
        Self { devices }
    }

    /// Enumerates output devices: the default first, then all active devices.
    ///
    /// Enumeration failures are advisory. If the enumeration API is unavailable
    /// the catalog is empty; if only the active-device listing fails the catalog
    /// holds just the default. Either way a warning is logged and an
    /// [`SessionEvent::EnumerationFailed`] is emitted.
    pub fn enumerate<E>(enumerator: &E, events: Option<&EventCallback>) -> Self
    where
        E: DeviceEnumerator + ?Sized,
    {
        let mut devices = Vec::new();

        match enumerator.default_device() {
            Ok(Some(device)) => devices.push(device),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to get device enumerator");
                emit(
                    events,
                    SessionEvent::EnumerationFailed {
                        reason: e.to_string(),
                    },
                );
                return Self { devices };
            }
        }

        match enumerator.active_devices() {
            Ok(active) => devices.extend(active),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to enumerate devices");
                emit(
                    events,
                    SessionEvent::EnumerationFailed {
                        reason: e.to_string(),
                    },
                );
            }
        }

        Self { devices }
    }

    /// Number of entries, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns `true` if no device was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Returns the entry at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&AudioDevice> {
        self.devices.get(index)
    }

    /// Returns the default device (the first entry).
    #[must_use]
    pub fn default_device(&self) -> Option<&AudioDevice> {
        self.devices.get(DEFAULT_DEVICE_INDEX)
    }

    /// Iterates entries in catalog order.
    pub fn iter(&self) -> std::slice::Iter<'_, AudioDevice> {
        self.devices.iter()
    }

    /// Applies the selection policy: an in-range preference wins, otherwise the default.
    ///
    /// Returns the chosen index and device, or `None` for an empty catalog.
    #[must_use]
    pub fn select(&self, preferred: Option<usize>) -> Option<(usize, &AudioDevice)> {
        let index = preferred
            .filter(|&i| i < self.devices.len())
            .unwrap_or(DEFAULT_DEVICE_INDEX);
        self.devices.get(index).map(|device| (index, device))
    }

    /// Renders the device listing, one line per entry.
    ///
    /// Entries sharing the default's id are marked with `*`.
    ///
    /// ```
    /// use voice_session::{AudioDevice, DeviceCatalog};
    ///
    /// let catalog = DeviceCatalog::from_devices(vec![
    ///     AudioDevice::new("spk", "Speakers"),
    ///     AudioDevice::new("spk", "Speakers"),
    ///     AudioDevice::new("hp", "Headphones"),
    /// ]);
    /// let listing = catalog.render_listing();
    /// assert_eq!(listing.lines().count(), 3);
    /// assert!(listing.lines().nth(2).unwrap().starts_with("    2: Headphones"));
    /// ```
    #[must_use]
    pub fn render_listing(&self) -> String {
        let default_id = self.default_device().map(|d| &d.id);
        let mut out = String::new();
        for (index, device) in self.devices.iter().enumerate() {
            let marker = if Some(&device.id) == default_id { '*' } else { ' ' };
            let _ = writeln!(out, "{marker} {index:3}: {} {}", device.name, device.id);
        }
        out
    }
}

impl<'a> IntoIterator for &'a DeviceCatalog {
    type Item = &'a AudioDevice;
    type IntoIter = std::slice::Iter<'a, AudioDevice>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.iter()
    }
}

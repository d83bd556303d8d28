//! Output device identity.

use std::borrow::Borrow;
use std::sync::Arc;

/// Endpoint identity handed from enumeration to master endpoint creation.
///
/// Backends decide what goes in it (a Windows endpoint path, an ALSA name,
/// a cpal device name); the session only compares and forwards it. Two
/// catalog entries with equal ids are the same physical endpoint, which is
/// how the listing marks duplicates of the default device.
///
/// ```
/// use voice_session::DeviceId;
///
/// let speakers = DeviceId::new("{0.0.0.00000000}.{speakers}");
/// assert_eq!(speakers, DeviceId::from("{0.0.0.00000000}.{speakers}"));
/// assert_ne!(speakers, DeviceId::new("{0.0.0.00000000}.{headset}"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    /// Wraps a backend-specific endpoint identifier.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// The identifier exactly as the backend reported it.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Lets `HashMap<DeviceId, _>` be queried with a plain `&str`.
impl Borrow<str> for DeviceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

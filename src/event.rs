//! Advisory events for monitoring session health.
//!
//! Events are non-fatal notifications. The session keeps running after any of
//! them is emitted - they're for logging and diagnostics, not error handling.

use std::sync::Arc;

use crate::device::DeviceId;

/// Advisory events emitted by the output session and the voice pool.
///
/// # Example
///
/// ```
/// use voice_session::SessionEvent;
///
/// fn handle_event(event: SessionEvent) {
///     match event {
///         SessionEvent::FormatMismatch { leadin, looping } => {
///             eprintln!("dropped loop {looping}: format differs from {leadin}");
///         }
///         SessionEvent::CriticalError { reason } => {
///             eprintln!("audio engine crashed: {reason}");
///         }
///         other => eprintln!("{other:?}"),
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The device enumeration API failed; the catalog is empty or partial.
    EnumerationFailed {
        /// Description of the failure.
        reason: String,
    },

    /// Enumeration succeeded but produced no output devices.
    NoDevicesFound,

    /// A device was selected and its master endpoint created.
    DeviceSelected {
        /// Id of the selected device.
        device_id: DeviceId,
        /// Human-readable name of the selected device.
        name: String,
    },

    /// An initialization attempt failed in a way the watchdog will retry.
    InitializationFailed {
        /// Description of the failure.
        reason: String,
    },

    /// The session became ready after an initialization attempt.
    SessionReady {
        /// Output channel count of the master endpoint.
        channels: u16,
    },

    /// Lead-in and looping samples differ in codec or channel count; the loop was dropped.
    FormatMismatch {
        /// Name of the lead-in sample.
        leadin: String,
        /// Name of the discarded looping sample.
        looping: String,
    },

    /// An allocation found no free, idle voice.
    PoolExhausted,

    /// The hardware layer reported a critical error; the session will be rebuilt.
    CriticalError {
        /// Description of the error, as reported by the hardware layer.
        reason: String,
    },
}

/// Callback type for receiving advisory events.
///
/// Register one via [`SoundHardware::on_event()`](crate::SoundHardware::on_event).
/// The callback is invoked on the owner thread, from inside `tick`, `allocate`
/// or initialization; keep it cheap.
pub type EventCallback = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use voice_session::{event_callback, SessionEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// callback(SessionEvent::PoolExhausted);
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(SessionEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Forwards an event to an optional callback.
pub(crate) fn emit(callback: Option<&EventCallback>, event: SessionEvent) {
    if let Some(callback) = callback {
        callback(event);
    }
}

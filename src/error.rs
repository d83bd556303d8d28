//! Error types for voice-session.
//!
//! Errors are split into three categories:
//! - **Hardware errors** ([`HardwareError`]): a single failed call into the hardware layer
//! - **Session errors** ([`SessionError`]): an initialization attempt that did not produce a
//!   usable session, either retryable (the watchdog tries again later) or fatal
//! - **Allocation outcomes** ([`AllocationFailure`]): "no voice available", a valid result
//!   of [`VoicePool::allocate`](crate::VoicePool::allocate) rather than an exceptional one
//!
//! Advisory conditions (enumeration failure, format mismatch, draining voices) are not
//! errors at all; they are logged and surfaced via [`EventCallback`](crate::EventCallback).

/// A failed call into the hardware layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed: {reason}")]
pub struct HardwareError {
    /// The hardware primitive that failed (e.g. `"create_master"`).
    pub operation: &'static str,
    /// Backend-provided description of the failure.
    pub reason: String,
}

impl HardwareError {
    /// Creates a hardware error for the given operation.
    pub fn new(operation: &'static str, reason: impl Into<String>) -> Self {
        Self {
            operation,
            reason: reason.into(),
        }
    }
}

/// Outcome of an initialization attempt that did not produce a ready session.
///
/// Retryable errors leave the session uninitialized; the
/// [`Watchdog`](crate::Watchdog) schedules another attempt after its cooldown.
/// Fatal errors mean the platform itself is unusable and the owner is expected
/// to halt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// The hardware engine could not be created in any mode.
    #[error("failed to create audio engine: {source}")]
    EngineCreation {
        /// The last creation failure.
        #[source]
        source: HardwareError,
    },

    /// Device enumeration returned no output devices.
    #[error("no audio output devices found")]
    NoDevices,

    /// The master output endpoint could not be created on the selected device.
    #[error("failed to create master endpoint on '{device}': {source}")]
    MasterCreation {
        /// Id of the device the endpoint was requested on.
        device: String,
        /// The underlying hardware failure.
        #[source]
        source: HardwareError,
    },

    /// The submix bus could not be created although a valid engine and master exist.
    #[error("failed to create submix bus: {source}")]
    SubmixCreation {
        /// The underlying hardware failure.
        #[source]
        source: HardwareError,
    },
}

impl SessionError {
    /// Returns `true` if the process cannot continue with audio after this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SubmixCreation { .. })
    }

    /// Returns `true` if a later initialization attempt may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !self.is_fatal()
    }
}

/// Why [`VoicePool::allocate`](crate::VoicePool::allocate) returned no voice.
///
/// Callers are expected to drop the sound request silently; there is no
/// queueing and no retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocationFailure {
    /// No lead-in sample was supplied.
    #[error("no lead-in sample supplied")]
    MissingLeadin,

    /// Every free slot is taken or still reported as playing.
    #[error("voice pool exhausted")]
    Exhausted,

    /// There is no initialized output session to allocate from.
    #[error("output session is not initialized")]
    SessionDown,

    /// The hardware refused to bind the samples to the selected slot.
    #[error("hardware failed to bind voice")]
    BindFailed,
}

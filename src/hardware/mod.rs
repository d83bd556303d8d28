//! Hardware layer contracts.
//!
//! The session core never talks to a driver directly; it drives these traits.
//! A backend supplies an [`AudioEngine`] per initialization attempt, and the
//! engine hands out the master endpoint, the submix bus and the voice slots.
//!
//! ```text
//! AudioBackend ──create_engine──▶ AudioEngine ─┬─▶ MasterEndpoint (gain, level meter)
//!      │                                       ├─▶ SubmixBus
//!      └─ DeviceEnumerator                     └─▶ HardwareVoice × capacity
//! ```
//!
//! Stop and flush on a voice are fire-and-forget: the only way to observe
//! completion is to poll [`HardwareVoice::is_playing`].

mod mock;

pub use mock::{MockBackend, MockEngine, MockHandle, MockMaster, MockSubmix, MockVoice, MockVoiceState};

use std::sync::Arc;

use crate::device::{DeviceEnumerator, DeviceId};
use crate::HardwareError;

/// Maximum number of channels the level meter reads.
pub const MAX_METER_CHANNELS: usize = 8;

/// Sample encoding of a sound buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Integer PCM.
    Pcm,
    /// IEEE floating point PCM.
    Float,
    /// Microsoft ADPCM.
    Adpcm,
}

/// Audio format descriptor of a sound buffer or a voice slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    /// Sample encoding.
    pub codec: Codec,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioFormat {
    /// Creates a format descriptor.
    #[must_use]
    pub const fn new(codec: Codec, channels: u16, sample_rate: u32) -> Self {
        Self {
            codec,
            channels,
            sample_rate,
        }
    }

    /// Returns `true` if both formats share codec and channel count.
    ///
    /// This is the requirement for chaining a looping buffer after a lead-in;
    /// the sample rate may differ.
    #[must_use]
    pub fn same_layout(&self, other: &Self) -> bool {
        self.codec == other.codec && self.channels == other.channels
    }
}

/// A loaded sound buffer that can be bound to a voice.
///
/// Samples are shared as `Arc<SoundSample>`; the pool keeps a reference for as
/// long as a voice is bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundSample {
    name: String,
    format: AudioFormat,
}

impl SoundSample {
    /// Creates a sample description.
    pub fn new(name: impl Into<String>, format: AudioFormat) -> Self {
        Self {
            name: name.into(),
            format,
        }
    }

    /// Creates a shared sample.
    pub fn shared(name: impl Into<String>, format: AudioFormat) -> Arc<Self> {
        Arc::new(Self::new(name, format))
    }

    /// Name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Format of the sample data.
    pub fn format(&self) -> &AudioFormat {
        &self.format
    }
}

/// Mode the hardware engine is created in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineMode {
    /// Engine with debug instrumentation; may be unavailable on end-user machines.
    Instrumented,
    /// Plain engine.
    Standard,
}

/// Shape of the master output endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointDetails {
    /// Number of output channels.
    pub channels: u16,
    /// Speaker position bitmask (bit 0 = front left, bit 1 = front right, ...).
    pub channel_mask: u32,
}

/// Engine-wide performance counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerformanceSnapshot {
    /// Source voices currently rendering.
    pub active_voices: u32,
    /// Source voices in existence.
    pub total_voices: u32,
    /// Fraction of CPU cycles spent on audio since the last query.
    pub cpu_fraction: f32,
    /// Memory used by the engine.
    pub memory_bytes: u64,
}

impl std::fmt::Display for PerformanceSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Voices: {}/{} CPU: {:.2}% Mem: {}kb",
            self.active_voices,
            self.total_voices,
            self.cpu_fraction * 100.0,
            self.memory_bytes / 1024
        )
    }
}

/// Per-channel readings of the metering effect.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeterLevels {
    /// Number of valid channels in `rms` and `peak`.
    pub channels: usize,
    /// RMS level per channel.
    pub rms: [f32; MAX_METER_CHANNELS],
    /// Peak level per channel.
    pub peak: [f32; MAX_METER_CHANNELS],
}

impl MeterLevels {
    /// Creates zeroed levels for `channels` channels, capped at [`MAX_METER_CHANNELS`].
    #[must_use]
    pub fn with_channels(channels: usize) -> Self {
        Self {
            channels: channels.min(MAX_METER_CHANNELS),
            ..Self::default()
        }
    }
}

/// Handler invoked by the hardware layer on a critical engine error.
///
/// It may run on a thread the session does not control, so it must only
/// record the fact (see [`RestartFlag`](crate::RestartFlag)).
pub type CriticalErrorHandler = Arc<dyn Fn(HardwareError) + Send + Sync>;

/// Factory for hardware engines, plus device enumeration.
pub trait AudioBackend: DeviceEnumerator {
    /// The engine type this backend creates.
    type Engine: AudioEngine;

    /// Creates a hardware engine in the given mode.
    fn create_engine(&mut self, mode: EngineMode) -> Result<Self::Engine, HardwareError>;
}

/// A live hardware engine connection.
pub trait AudioEngine {
    /// Voice slot type.
    type Voice: HardwareVoice;
    /// Master endpoint type.
    type Master: MasterEndpoint;
    /// Submix bus type.
    type Submix: SubmixBus;

    /// Registers the handler for asynchronous critical errors.
    fn register_critical_error_handler(&mut self, handler: CriticalErrorHandler);

    /// Removes the critical error handler.
    fn unregister_critical_error_handler(&mut self);

    /// Creates the master output endpoint on `device`.
    fn create_master(
        &mut self,
        sample_rate: u32,
        device: &DeviceId,
    ) -> Result<Self::Master, HardwareError>;

    /// Creates an auxiliary submix bus.
    fn create_submix(
        &mut self,
        channels: u16,
        sample_rate: u32,
    ) -> Result<Self::Submix, HardwareError>;

    /// Creates an unbound voice slot.
    fn create_voice(&mut self) -> Self::Voice;

    /// Applies all pending parameter changes.
    fn commit_changes(&mut self);

    /// Returns current performance counters.
    fn performance(&self) -> PerformanceSnapshot;

    /// Releases the engine connection.
    fn release(self);
}

/// The single hardware output destination.
pub trait MasterEndpoint {
    /// Channel count and mask of the endpoint.
    fn details(&self) -> EndpointDetails;

    /// Sets the linear output gain.
    fn set_gain(&mut self, linear: f32);

    /// Attaches a level-metering effect as the endpoint's only effect.
    fn attach_level_meter(&mut self, channels: u16, enabled: bool) -> Result<(), HardwareError>;

    /// Enables or disables the level-metering effect.
    fn set_level_meter_enabled(&mut self, enabled: bool);

    /// Reads RMS and peak values for `levels.channels` channels.
    fn read_levels(&mut self, levels: &mut MeterLevels);

    /// Removes all effects from the endpoint.
    fn detach_effects(&mut self);

    /// Destroys the endpoint.
    fn destroy(self);
}

/// An auxiliary mixing stage between voices and the master endpoint.
pub trait SubmixBus {
    /// Destroys the bus.
    fn destroy(self);
}

/// One hardware playback channel.
pub trait HardwareVoice {
    /// Configures the channel for `format` and queues the lead-in and optional loop.
    fn bind(
        &mut self,
        format: &AudioFormat,
        leadin: &SoundSample,
        looping: Option<&SoundSample>,
    ) -> Result<(), HardwareError>;

    /// Starts rendering the bound buffers.
    fn start(&mut self);

    /// Requests a stop. Returns before playback has actually ceased.
    fn request_stop(&mut self);

    /// Discards queued buffers. Safe to call repeatedly.
    fn flush_buffers(&mut self);

    /// Whether the channel is currently rendering audio, as reported by the hardware.
    fn is_playing(&self) -> bool;

    /// Destroys the channel.
    fn destroy(self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_layout_ignores_sample_rate() {
        let a = AudioFormat::new(Codec::Pcm, 2, 44_100);
        let b = AudioFormat::new(Codec::Pcm, 2, 22_050);
        let c = AudioFormat::new(Codec::Adpcm, 2, 44_100);
        let d = AudioFormat::new(Codec::Pcm, 1, 44_100);

        assert!(a.same_layout(&b));
        assert!(!a.same_layout(&c));
        assert!(!a.same_layout(&d));
        assert_ne!(a, b);
    }

    #[test]
    fn test_meter_levels_are_capped() {
        assert_eq!(MeterLevels::with_channels(12).channels, MAX_METER_CHANNELS);
        assert_eq!(MeterLevels::with_channels(2).channels, 2);
    }

    #[test]
    fn test_performance_snapshot_display() {
        let perf = PerformanceSnapshot {
            active_voices: 3,
            total_voices: 48,
            cpu_fraction: 0.0125,
            memory_bytes: 4096,
        };
        assert_eq!(perf.to_string(), "Voices: 3/48 CPU: 1.25% Mem: 4kb");
    }

    #[test]
    fn test_sound_sample_accessors() {
        let format = AudioFormat::new(Codec::Float, 1, 48_000);
        let sample = SoundSample::shared("footstep", format);
        assert_eq!(sample.name(), "footstep");
        assert_eq!(sample.format(), &format);
    }
}

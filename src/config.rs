//! Configuration values consumed by the session each tick.

use std::time::Duration;

/// Sample rate the master endpoint and submix bus are created at.
pub const OUTPUT_SAMPLE_RATE: u32 = 44_100;

/// Default number of hardware voice slots.
pub const DEFAULT_VOICE_CAPACITY: usize = 48;

/// Default meter geometry string (`left top width height`).
pub const DEFAULT_METER_POSITION: &str = "100 100 20 200";

/// Live configuration for a [`SoundHardware`](crate::SoundHardware).
///
/// All fields are re-read on every tick, so changes made through
/// [`SoundHardware::config_mut()`](crate::SoundHardware::config_mut) take
/// effect on the next tick. `preferred_device`, `instrumented_engine` and
/// `voice_capacity` are only consulted during (re-)initialization.
///
/// # Example
///
/// ```
/// use voice_session::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig {
///     volume_db: -6.0,
///     show_level_meter: true,
///     meter_peak_hold: Duration::from_millis(500),
///     ..Default::default()
/// };
/// assert_eq!(config.voice_capacity, 48);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Master output gain in decibels.
    ///
    /// Default: 0.0
    pub volume_db: f32,

    /// Forces the master gain to silence while set.
    ///
    /// Default: false
    pub muted: bool,

    /// Index into the device catalog; out-of-range or `None` selects the default device.
    ///
    /// Default: None
    pub preferred_device: Option<usize>,

    /// Enables the level meter display and the metering effect.
    ///
    /// Default: false
    pub show_level_meter: bool,

    /// Meter geometry as `"left top width height"`; unparsed fields keep their defaults.
    ///
    /// Default: `"100 100 20 200"`
    pub meter_position: String,

    /// How long a meter peak is held before it starts to decay.
    ///
    /// Default: 1000ms
    pub meter_peak_hold: Duration,

    /// Logs an engine performance snapshot every tick.
    ///
    /// Default: false
    pub show_perf_data: bool,

    /// Try the instrumented engine mode first, then fall back to the standard mode.
    ///
    /// Default: true in debug builds, false in release builds
    pub instrumented_engine: bool,

    /// Number of voice slots the pool is built with.
    ///
    /// Default: 48
    pub voice_capacity: usize,

    /// Minimum time between two re-initialization attempts.
    ///
    /// Default: 1000ms
    pub restart_cooldown: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            volume_db: 0.0,
            muted: false,
            preferred_device: None,
            show_level_meter: false,
            meter_position: DEFAULT_METER_POSITION.to_string(),
            meter_peak_hold: Duration::from_millis(1000),
            show_perf_data: false,
            instrumented_engine: cfg!(debug_assertions),
            voice_capacity: DEFAULT_VOICE_CAPACITY,
            restart_cooldown: Duration::from_millis(1000),
        }
    }
}

impl SessionConfig {
    /// Linear master gain for the current volume and mute state.
    #[must_use]
    pub fn output_gain(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            db_to_linear(self.volume_db)
        }
    }
}

/// Converts a decibel value to a linear amplitude factor.
#[must_use]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

//! # voice-session
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Hardware output session and fixed-capacity voice pool for game-style sound
//! engines.
//!
//! `voice-session` owns the connection to an audio engine (master endpoint,
//! submix bus, a fixed set of hardware voices), hands voices out to callers,
//! parks released voices as *zombies* until the hardware reports them idle,
//! meters the master output and re-initializes itself after the device
//! disappears.
//!
//! ## Quick Start
//!
//! ```rust
//! use voice_session::{AudioFormat, Codec, MockBackend, SessionConfig, SoundHardware, SoundSample};
//!
//! let mut hardware = SoundHardware::new(MockBackend::new(), SessionConfig::default());
//! hardware.on_event(|e| tracing::warn!(?e, "audio event"));
//! hardware.init()?;
//!
//! let format = AudioFormat::new(Codec::Pcm, 2, 44_100);
//! let engine_start = SoundSample::shared("engine_start", format);
//! let engine_loop = SoundSample::shared("engine_loop", format);
//!
//! // Allocation never blocks; "no voice" is a normal outcome.
//! if let Ok(id) = hardware.allocate(Some(&engine_start), Some(&engine_loop)) {
//!     if let Some(voice) = hardware.voice_mut(id) {
//!         voice.start();
//!     }
//!     hardware.release(id);
//! }
//!
//! // Once per frame.
//! hardware.tick()?;
//! # Ok::<(), voice_session::SessionError>(())
//! ```
//!
//! ## Architecture
//!
//! Everything is driven from one owner thread through [`SoundHardware::tick`]:
//!
//! - **Output session**: engine, master endpoint and submix bus, created per
//!   initialization attempt
//! - **Voice pool**: free / active / zombie partition of the hardware voices
//! - **Level meter**: RMS and held peaks read from the master endpoint
//! - **Watchdog**: a lock-free flag set by the hardware's critical error
//!   callback, and a cooldown pacing re-initialization
//!
//! The hardware itself sits behind the traits in [`hardware`]; [`MockBackend`]
//! implements them in memory for tests.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
#![allow(clippy::missing_panics_doc)]

mod config;
mod device;
mod error;
mod event;
pub mod hardware;
mod meter;
mod session;
mod sound;
mod voice;
mod watchdog;

pub use config::{
    db_to_linear, SessionConfig, DEFAULT_METER_POSITION, DEFAULT_VOICE_CAPACITY,
    OUTPUT_SAMPLE_RATE,
};
pub use device::{
    AudioDevice, CpalDeviceEnumerator, DeviceCatalog, DeviceEnumerator, DeviceId,
    DEFAULT_DEVICE_INDEX,
};
pub use error::{AllocationFailure, HardwareError, SessionError};
pub use event::{event_callback, EventCallback, SessionEvent};
pub use hardware::{
    AudioBackend, AudioFormat, Codec, EngineMode, MockBackend, MockEngine, MockHandle, MockMaster,
    MockVoice, MockVoiceState, SoundSample,
};
pub use meter::{
    channel_labels, LevelMeter, LogMeterDisplay, MeterDisplay, MeterFrame, MeterGeometry,
    NullMeterDisplay, PEAK_DECAY,
};
pub use session::{OutputSession, SessionState, SUBMIX_CHANNELS};
pub use sound::{SoundHardware, TickReport};
pub use voice::{PoolStats, ReclaimReport, SlotState, Voice, VoiceId, VoicePool};
pub use watchdog::{RestartFlag, Watchdog};

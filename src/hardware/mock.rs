//! Mock hardware backend for testing without audio hardware.
//!
//! All mock objects share one [`MockHandle`] state, so a test can script
//! failures, flip a voice's "is playing" flag, inject meter levels and inspect
//! what the session did to the hardware.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{
    AudioBackend, AudioEngine, AudioFormat, CriticalErrorHandler, EndpointDetails, EngineMode,
    HardwareVoice, MasterEndpoint, MeterLevels, PerformanceSnapshot, SoundSample, SubmixBus,
    MAX_METER_CHANNELS,
};
use crate::device::{AudioDevice, DeviceEnumerator, DeviceId};
use crate::HardwareError;

/// Stereo front left + front right.
const STEREO_MASK: u32 = 0b11;

/// Observable state of one mock voice slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockVoiceState {
    /// What `is_playing` reports.
    pub playing: bool,
    /// Number of stop requests received.
    pub stop_requests: usize,
    /// Number of flushes received.
    pub flushes: usize,
    /// Number of successful binds.
    pub binds: usize,
    /// Format of the last bind.
    pub format: Option<AudioFormat>,
    /// Name of the last bound lead-in.
    pub leadin: Option<String>,
    /// Name of the last bound loop, if any.
    pub looping: Option<String>,
    /// Whether `destroy` was called.
    pub destroyed: bool,
}

struct MockState {
    default_device: Option<AudioDevice>,
    devices: Vec<AudioDevice>,
    enumeration_error: Option<String>,
    failing_modes: Vec<EngineMode>,
    fail_master: bool,
    fail_submix: bool,
    fail_meter: bool,
    fail_bind: bool,
    instant_stop: bool,
    details: EndpointDetails,
    levels: MeterLevels,
    performance: PerformanceSnapshot,
    performance_queries: usize,
    submix_channels: Option<u16>,
    engine_attempts: Vec<EngineMode>,
    engine_alive: bool,
    master_device: Option<DeviceId>,
    gains: Vec<f32>,
    meter_attached: bool,
    meter_enabled: bool,
    meter_reads: usize,
    commits: usize,
    voices: Vec<MockVoiceState>,
    handler: Option<CriticalErrorHandler>,
    log: Vec<&'static str>,
}

impl Default for MockState {
    fn default() -> Self {
        let speakers = AudioDevice::new("mock-speakers", "Mock Speakers");
        Self {
            default_device: Some(speakers.clone()),
            devices: vec![speakers],
            enumeration_error: None,
            failing_modes: Vec::new(),
            fail_master: false,
            fail_submix: false,
            fail_meter: false,
            fail_bind: false,
            instant_stop: false,
            details: EndpointDetails {
                channels: 2,
                channel_mask: STEREO_MASK,
            },
            levels: MeterLevels::default(),
            performance: PerformanceSnapshot::default(),
            performance_queries: 0,
            submix_channels: None,
            engine_attempts: Vec::new(),
            engine_alive: false,
            master_device: None,
            gains: Vec::new(),
            meter_attached: false,
            meter_enabled: false,
            meter_reads: 0,
            commits: 0,
            voices: Vec::new(),
            handler: None,
            log: Vec::new(),
        }
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory hardware backend.
///
/// # Example
///
/// ```
/// use voice_session::{MockBackend, SessionConfig, SoundHardware};
///
/// let backend = MockBackend::new();
/// let handle = backend.handle();
///
/// let mut hardware = SoundHardware::new(backend, SessionConfig::default());
/// hardware.init().unwrap();
/// assert!(handle.engine_alive());
/// assert_eq!(handle.voice_count(), 48);
/// ```
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend").finish_non_exhaustive()
    }
}

impl MockBackend {
    /// Creates a backend with one stereo device ("mock-speakers").
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle for scripting and inspecting the mock.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl DeviceEnumerator for MockBackend {
    fn default_device(&self) -> Result<Option<AudioDevice>, HardwareError> {
        let state = lock(&self.state);
        match &state.enumeration_error {
            Some(reason) => Err(HardwareError::new("default_device", reason.clone())),
            None => Ok(state.default_device.clone()),
        }
    }

    fn active_devices(&self) -> Result<Vec<AudioDevice>, HardwareError> {
        Ok(lock(&self.state).devices.clone())
    }
}

impl AudioBackend for MockBackend {
    type Engine = MockEngine;

    fn create_engine(&mut self, mode: EngineMode) -> Result<MockEngine, HardwareError> {
        let mut state = lock(&self.state);
        state.engine_attempts.push(mode);
        if state.failing_modes.contains(&mode) {
            return Err(HardwareError::new("create_engine", format!("{mode:?} unavailable")));
        }
        state.engine_alive = true;
        state.voices.clear();
        state.log.push("engine_create");
        Ok(MockEngine {
            state: Arc::clone(&self.state),
        })
    }
}

/// Engine created by [`MockBackend`].
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEngine").finish_non_exhaustive()
    }
}

impl AudioEngine for MockEngine {
    type Voice = MockVoice;
    type Master = MockMaster;
    type Submix = MockSubmix;

    fn register_critical_error_handler(&mut self, handler: CriticalErrorHandler) {
        lock(&self.state).handler = Some(handler);
    }

    fn unregister_critical_error_handler(&mut self) {
        let mut state = lock(&self.state);
        state.handler = None;
        state.log.push("unregister_handler");
    }

    fn create_master(
        &mut self,
        _sample_rate: u32,
        device: &DeviceId,
    ) -> Result<MockMaster, HardwareError> {
        let mut state = lock(&self.state);
        if state.fail_master {
            return Err(HardwareError::new("create_master", "endpoint unavailable"));
        }
        state.master_device = Some(device.clone());
        state.log.push("master_create");
        Ok(MockMaster {
            state: Arc::clone(&self.state),
        })
    }

    fn create_submix(
        &mut self,
        channels: u16,
        _sample_rate: u32,
    ) -> Result<MockSubmix, HardwareError> {
        let mut state = lock(&self.state);
        if state.fail_submix {
            return Err(HardwareError::new("create_submix", "out of memory"));
        }
        state.submix_channels = Some(channels);
        state.log.push("submix_create");
        Ok(MockSubmix {
            state: Arc::clone(&self.state),
        })
    }

    fn create_voice(&mut self) -> MockVoice {
        let mut state = lock(&self.state);
        state.voices.push(MockVoiceState::default());
        MockVoice {
            index: state.voices.len() - 1,
            state: Arc::clone(&self.state),
        }
    }

    fn commit_changes(&mut self) {
        lock(&self.state).commits += 1;
    }

    fn performance(&self) -> PerformanceSnapshot {
        let mut state = lock(&self.state);
        state.performance_queries += 1;
        state.performance
    }

    fn release(self) {
        let mut state = lock(&self.state);
        state.engine_alive = false;
        state.log.push("engine_release");
    }
}

/// Master endpoint created by [`MockEngine`].
pub struct MockMaster {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockMaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockMaster").finish_non_exhaustive()
    }
}

impl MasterEndpoint for MockMaster {
    fn details(&self) -> EndpointDetails {
        lock(&self.state).details
    }

    fn set_gain(&mut self, linear: f32) {
        lock(&self.state).gains.push(linear);
    }

    fn attach_level_meter(&mut self, _channels: u16, enabled: bool) -> Result<(), HardwareError> {
        let mut state = lock(&self.state);
        if state.fail_meter {
            return Err(HardwareError::new("attach_level_meter", "effect unavailable"));
        }
        state.meter_attached = true;
        state.meter_enabled = enabled;
        Ok(())
    }

    fn set_level_meter_enabled(&mut self, enabled: bool) {
        lock(&self.state).meter_enabled = enabled;
    }

    fn read_levels(&mut self, levels: &mut MeterLevels) {
        let mut state = lock(&self.state);
        state.meter_reads += 1;
        let n = levels.channels.min(MAX_METER_CHANNELS);
        levels.rms[..n].copy_from_slice(&state.levels.rms[..n]);
        levels.peak[..n].copy_from_slice(&state.levels.peak[..n]);
    }

    fn detach_effects(&mut self) {
        let mut state = lock(&self.state);
        state.meter_attached = false;
        state.log.push("master_detach_effects");
    }

    fn destroy(self) {
        lock(&self.state).log.push("master_destroy");
    }
}

/// Submix bus created by [`MockEngine`].
pub struct MockSubmix {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockSubmix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSubmix").finish_non_exhaustive()
    }
}

impl SubmixBus for MockSubmix {
    fn destroy(self) {
        lock(&self.state).log.push("submix_destroy");
    }
}

/// Voice slot created by [`MockEngine`].
pub struct MockVoice {
    index: usize,
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockVoice")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl MockVoice {
    fn with_state<R>(&self, f: impl FnOnce(&mut MockState, usize) -> R) -> R {
        let mut state = lock(&self.state);
        f(&mut state, self.index)
    }
}

impl HardwareVoice for MockVoice {
    fn bind(
        &mut self,
        format: &AudioFormat,
        leadin: &SoundSample,
        looping: Option<&SoundSample>,
    ) -> Result<(), HardwareError> {
        self.with_state(|state, i| {
            if state.fail_bind {
                return Err(HardwareError::new("bind", "source voice creation failed"));
            }
            if let Some(voice) = state.voices.get_mut(i) {
                voice.binds += 1;
                voice.format = Some(*format);
                voice.leadin = Some(leadin.name().to_string());
                voice.looping = looping.map(|s| s.name().to_string());
            }
            Ok(())
        })
    }

    fn start(&mut self) {
        self.with_state(|state, i| {
            if let Some(voice) = state.voices.get_mut(i) {
                voice.playing = true;
            }
        });
    }

    fn request_stop(&mut self) {
        self.with_state(|state, i| {
            let instant = state.instant_stop;
            if let Some(voice) = state.voices.get_mut(i) {
                voice.stop_requests += 1;
                if instant {
                    voice.playing = false;
                }
            }
        });
    }

    fn flush_buffers(&mut self) {
        self.with_state(|state, i| {
            if let Some(voice) = state.voices.get_mut(i) {
                voice.flushes += 1;
            }
        });
    }

    fn is_playing(&self) -> bool {
        self.with_state(|state, i| state.voices.get(i).is_some_and(|v| v.playing))
    }

    fn destroy(self) {
        self.with_state(|state, i| {
            if let Some(voice) = state.voices.get_mut(i) {
                voice.destroyed = true;
            }
            if i == 0 {
                state.log.push("voices_destroy");
            }
        });
    }
}

/// Scripting and inspection handle shared with a [`MockBackend`].
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHandle").finish_non_exhaustive()
    }
}

impl MockHandle {
    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    /// Replaces the default device and the active device list.
    pub fn set_devices(&self, default: Option<AudioDevice>, active: Vec<AudioDevice>) {
        let mut state = self.state();
        state.default_device = default;
        state.devices = active;
    }

    /// Makes the enumeration API fail (or recover with `None`).
    pub fn set_enumeration_error(&self, reason: Option<&str>) {
        self.state().enumeration_error = reason.map(str::to_string);
    }

    /// Makes engine creation fail in `mode`.
    pub fn fail_engine_mode(&self, mode: EngineMode, fail: bool) {
        let mut state = self.state();
        state.failing_modes.retain(|&m| m != mode);
        if fail {
            state.failing_modes.push(mode);
        }
    }

    /// Makes master endpoint creation fail.
    pub fn set_fail_master(&self, fail: bool) {
        self.state().fail_master = fail;
    }

    /// Makes submix bus creation fail.
    pub fn set_fail_submix(&self, fail: bool) {
        self.state().fail_submix = fail;
    }

    /// Makes level meter attachment fail.
    pub fn set_fail_meter(&self, fail: bool) {
        self.state().fail_meter = fail;
    }

    /// Makes every voice bind fail.
    pub fn set_fail_bind(&self, fail: bool) {
        self.state().fail_bind = fail;
    }

    /// When set, `request_stop` clears the playing flag immediately.
    pub fn set_instant_stop(&self, instant: bool) {
        self.state().instant_stop = instant;
    }

    /// Sets the master endpoint's channel count and mask.
    pub fn set_output(&self, channels: u16, channel_mask: u32) {
        self.state().details = EndpointDetails {
            channels,
            channel_mask,
        };
    }

    /// Sets the levels reported by the metering effect (extra channels are ignored).
    pub fn set_levels(&self, rms: &[f32], peak: &[f32]) {
        let mut state = self.state();
        for (slot, value) in state.levels.rms.iter_mut().zip(rms) {
            *slot = *value;
        }
        for (slot, value) in state.levels.peak.iter_mut().zip(peak) {
            *slot = *value;
        }
    }

    /// Sets the performance counters reported by the engine.
    pub fn set_performance(&self, performance: PerformanceSnapshot) {
        self.state().performance = performance;
    }

    /// Sets what `is_playing` reports for voice `index`.
    pub fn set_playing(&self, index: usize, playing: bool) {
        if let Some(voice) = self.state().voices.get_mut(index) {
            voice.playing = playing;
        }
    }

    /// Clears the playing flag of every voice.
    pub fn drain_all(&self) {
        for voice in &mut self.state().voices {
            voice.playing = false;
        }
    }

    /// Invokes the registered critical error handler from the calling thread.
    ///
    /// Returns `false` if no handler is registered.
    pub fn fire_critical_error(&self, reason: &str) -> bool {
        let handler = self.state().handler.clone();
        match handler {
            Some(handler) => {
                handler(HardwareError::new("engine", reason));
                true
            }
            None => false,
        }
    }

    /// Returns `true` if a critical error handler is registered.
    pub fn has_critical_handler(&self) -> bool {
        self.state().handler.is_some()
    }

    /// Returns a snapshot of voice `index`.
    pub fn voice(&self, index: usize) -> Option<MockVoiceState> {
        self.state().voices.get(index).cloned()
    }

    /// Number of voices created by the current engine.
    pub fn voice_count(&self) -> usize {
        self.state().voices.len()
    }

    /// Modes of every engine creation attempt, in order.
    pub fn engine_attempts(&self) -> Vec<EngineMode> {
        self.state().engine_attempts.clone()
    }

    /// Whether an engine is currently alive.
    pub fn engine_alive(&self) -> bool {
        self.state().engine_alive
    }

    /// Device id the last master endpoint was created on.
    pub fn master_device(&self) -> Option<DeviceId> {
        self.state().master_device.clone()
    }

    /// Every gain written to the master endpoint, in order.
    pub fn gains(&self) -> Vec<f32> {
        self.state().gains.clone()
    }

    /// Last gain written to the master endpoint.
    pub fn last_gain(&self) -> Option<f32> {
        self.state().gains.last().copied()
    }

    /// Whether the metering effect is attached.
    pub fn meter_attached(&self) -> bool {
        self.state().meter_attached
    }

    /// Whether the metering effect is enabled.
    pub fn meter_enabled(&self) -> bool {
        self.state().meter_enabled
    }

    /// Number of level reads performed.
    pub fn meter_reads(&self) -> usize {
        self.state().meter_reads
    }

    /// Number of performance counter queries.
    pub fn performance_queries(&self) -> usize {
        self.state().performance_queries
    }

    /// Channel count the last submix bus was created with.
    pub fn submix_channels(&self) -> Option<u16> {
        self.state().submix_channels
    }

    /// Number of `commit_changes` calls.
    pub fn commits(&self) -> usize {
        self.state().commits
    }

    /// Lifecycle log (creation and teardown steps), in order.
    pub fn log(&self) -> Vec<&'static str> {
        self.state().log.clone()
    }
}

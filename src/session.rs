//! Output session: engine, master endpoint and submix bus lifecycle.

use crate::config::{SessionConfig, OUTPUT_SAMPLE_RATE};
use crate::device::{AudioDevice, DeviceCatalog};
use crate::event::{emit, EventCallback, SessionEvent};
use crate::hardware::{
    AudioBackend, AudioEngine, CriticalErrorHandler, EndpointDetails, EngineMode, MasterEndpoint,
    PerformanceSnapshot, SubmixBus, MAX_METER_CHANNELS,
};
use crate::SessionError;

/// Channel count of the auxiliary submix bus.
pub const SUBMIX_CHANNELS: u16 = 1;

/// Lifecycle state of an [`OutputSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No engine; an initialization attempt may be made.
    #[default]
    Uninitialized,
    /// An initialization attempt is in progress.
    Initializing,
    /// Engine, master endpoint and submix bus are live.
    Ready,
    /// An initialization attempt failed or the engine reported a critical
    /// error; the watchdog retries from here.
    Failed,
    /// A fatal initialization error occurred; the session will not be retried.
    Halted,
}

impl SessionState {
    /// Returns `true` if a (re-)initialization attempt may be made from this state.
    #[must_use]
    pub fn can_initialize(self) -> bool {
        matches!(self, Self::Uninitialized | Self::Failed)
    }
}

/// Owns the hardware engine and its master endpoint and submix bus.
///
/// # Lifecycle
///
/// 1. [`initialize`](Self::initialize) creates everything and hands back the
///    voice slots for the pool
/// 2. [`apply_gain`](Self::apply_gain) and [`commit`](Self::commit) run every tick
/// 3. [`shutdown`](Self::shutdown) tears everything down; the voices must be
///    destroyed by their owner first
///
/// Any partially initialized state is torn down the same way, so `shutdown`
/// is safe to call at any point and more than once.
pub struct OutputSession<E: AudioEngine> {
    state: SessionState,
    engine: Option<E>,
    master: Option<E::Master>,
    submix: Option<E::Submix>,
    device: Option<AudioDevice>,
    details: EndpointDetails,
    meter_attached: bool,
}

impl<E: AudioEngine> std::fmt::Debug for OutputSession<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSession")
            .field("state", &self.state)
            .field("device", &self.device)
            .field("details", &self.details)
            .field("meter_attached", &self.meter_attached)
            .finish_non_exhaustive()
    }
}

impl<E: AudioEngine> Default for OutputSession<E> {
    fn default() -> Self {
        Self {
            state: SessionState::Uninitialized,
            engine: None,
            master: None,
            submix: None,
            device: None,
            details: EndpointDetails::default(),
            meter_attached: false,
        }
    }
}

impl<E: AudioEngine> OutputSession<E> {
    /// Creates an uninitialized session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns `true` if the engine exists and the session is ready.
    pub fn is_initialized(&self) -> bool {
        self.state == SessionState::Ready && self.engine.is_some()
    }

    /// Returns `true` if an engine connection exists, ready or not.
    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// The device the master endpoint was created on.
    pub fn device(&self) -> Option<&AudioDevice> {
        self.device.as_ref()
    }

    /// Channel count and mask of the master endpoint.
    pub fn details(&self) -> EndpointDetails {
        self.details
    }

    /// Whether the level-metering effect is attached to the master endpoint.
    pub fn meter_attached(&self) -> bool {
        self.meter_attached
    }

    /// The master endpoint, if the session is initialized.
    pub fn master_mut(&mut self) -> Option<&mut E::Master> {
        self.master.as_mut()
    }

    /// Runs one initialization attempt.
    ///
    /// On success the session is [`Ready`](SessionState::Ready) and the freshly
    /// created voice slots (`config.voice_capacity` of them) are returned for the
    /// pool. On failure everything created so far is torn down; the state is
    /// [`Failed`](SessionState::Failed) for retryable errors and
    /// [`Halted`](SessionState::Halted) for fatal ones.
    ///
    /// # Errors
    ///
    /// See [`SessionError`]; only [`SessionError::SubmixCreation`] is fatal.
    pub fn initialize<B>(
        &mut self,
        backend: &mut B,
        config: &SessionConfig,
        on_critical_error: CriticalErrorHandler,
        events: Option<&EventCallback>,
    ) -> Result<Vec<E::Voice>, SessionError>
    where
        B: AudioBackend<Engine = E>,
    {
        if self.engine.is_some() {
            self.shutdown();
        }
        self.state = SessionState::Initializing;

        match self.try_initialize(backend, config, on_critical_error, events) {
            Ok(voices) => {
                self.state = SessionState::Ready;
                tracing::info!(
                    channels = self.details.channels,
                    voices = voices.len(),
                    "Output session ready"
                );
                emit(
                    events,
                    SessionEvent::SessionReady {
                        channels: self.details.channels,
                    },
                );
                Ok(voices)
            }
            Err(e) => {
                self.teardown(false);
                if e.is_fatal() {
                    tracing::error!(error = %e, "Output session initialization failed fatally");
                    self.state = SessionState::Halted;
                } else {
                    self.state = SessionState::Failed;
                    tracing::warn!(error = %e, "Output session initialization failed");
                    emit(
                        events,
                        SessionEvent::InitializationFailed {
                            reason: e.to_string(),
                        },
                    );
                }
                Err(e)
            }
        }
    }

    fn try_initialize<B>(
        &mut self,
        backend: &mut B,
        config: &SessionConfig,
        on_critical_error: CriticalErrorHandler,
        events: Option<&EventCallback>,
    ) -> Result<Vec<E::Voice>, SessionError>
    where
        B: AudioBackend<Engine = E>,
    {
        let mut engine = create_engine(backend, config.instrumented_engine)?;
        engine.register_critical_error_handler(on_critical_error);
        let engine = self.engine.insert(engine);

        let catalog = DeviceCatalog::enumerate(&*backend, events);
        if !catalog.is_empty() {
            tracing::debug!(
                devices = catalog.len(),
                "Output devices:\n{}",
                catalog.render_listing()
            );
        }
        let Some((index, device)) = catalog.select(config.preferred_device) else {
            tracing::warn!("No audio devices found");
            emit(events, SessionEvent::NoDevicesFound);
            return Err(SessionError::NoDevices);
        };

        let mut master = engine
            .create_master(OUTPUT_SAMPLE_RATE, &device.id)
            .map_err(|source| SessionError::MasterCreation {
                device: device.id.to_string(),
                source,
            })?;
        master.set_gain(config.output_gain());
        self.details = master.details();

        tracing::info!(
            index,
            device = %device.id,
            name = %device.name,
            channels = self.details.channels,
            channel_mask = self.details.channel_mask,
            "Selected audio device"
        );
        emit(
            events,
            SessionEvent::DeviceSelected {
                device_id: device.id.clone(),
                name: device.name.clone(),
            },
        );
        self.device = Some(device.clone());

        let meter_channels = self
            .details
            .channels
            .min(u16::try_from(MAX_METER_CHANNELS).unwrap_or(u16::MAX));
        self.meter_attached = match master.attach_level_meter(meter_channels, config.show_level_meter)
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to attach level meter");
                false
            }
        };
        self.master = Some(master);

        let submix = engine
            .create_submix(SUBMIX_CHANNELS, OUTPUT_SAMPLE_RATE)
            .map_err(|source| SessionError::SubmixCreation { source })?;
        self.submix = Some(submix);

        Ok((0..config.voice_capacity)
            .map(|_| engine.create_voice())
            .collect())
    }

    /// Writes the configured output gain to the master endpoint.
    ///
    /// Muted forces silence; otherwise the decibel volume is applied as a
    /// linear factor. Unconditional and idempotent.
    pub fn apply_gain(&mut self, config: &SessionConfig) {
        if let Some(master) = self.master.as_mut() {
            master.set_gain(config.output_gain());
        }
    }

    /// Applies all pending engine parameter changes.
    pub fn commit(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.commit_changes();
        }
    }

    /// Current engine performance counters.
    pub fn performance(&self) -> Option<PerformanceSnapshot> {
        self.engine.as_ref().map(AudioEngine::performance)
    }

    /// Tears down the session and logs a final performance snapshot.
    ///
    /// Voices created by [`initialize`](Self::initialize) must already be destroyed.
    pub fn shutdown(&mut self) {
        if self.engine.is_none() {
            return;
        }
        self.teardown(true);
        tracing::info!("Output session shut down");
    }

    /// Tears down the session after a critical hardware error.
    ///
    /// Like [`shutdown`](Self::shutdown), but leaves the session
    /// [`Failed`](SessionState::Failed) so the watchdog brings it back.
    pub fn fail(&mut self) {
        self.shutdown();
        if self.state != SessionState::Halted {
            self.state = SessionState::Failed;
        }
    }

    fn teardown(&mut self, report_performance: bool) {
        if let Some(engine) = self.engine.as_mut() {
            engine.unregister_critical_error_handler();
        }
        if let Some(submix) = self.submix.take() {
            submix.destroy();
        }
        if let Some(mut master) = self.master.take() {
            master.detach_effects();
            master.destroy();
        }
        if let Some(engine) = self.engine.take() {
            if report_performance {
                let perf = engine.performance();
                tracing::info!(%perf, "Final audio performance");
            }
            engine.release();
        }
        self.meter_attached = false;
        self.device = None;
        if self.state != SessionState::Halted {
            self.state = SessionState::Uninitialized;
        }
    }
}

/// Creates the engine, trying the instrumented mode first when requested.
fn create_engine<B: AudioBackend>(
    backend: &mut B,
    instrumented: bool,
) -> Result<B::Engine, SessionError> {
    if instrumented {
        match backend.create_engine(EngineMode::Instrumented) {
            Ok(engine) => return Ok(engine),
            Err(e) => {
                tracing::warn!(error = %e, "Instrumented audio engine unavailable, falling back");
            }
        }
    }
    backend
        .create_engine(EngineMode::Standard)
        .map_err(|source| SessionError::EngineCreation { source })
}

//! The owning per-tick driver.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::SessionConfig;
use crate::device::DeviceCatalog;
use crate::event::{event_callback, EventCallback, SessionEvent};
use crate::hardware::{AudioBackend, AudioEngine, SoundSample};
use crate::meter::{LevelMeter, LogMeterDisplay, MeterDisplay};
use crate::session::OutputSession;
use crate::voice::{PoolStats, ReclaimReport, Voice, VoiceId, VoicePool};
use crate::watchdog::{RestartFlag, Watchdog};
use crate::{AllocationFailure, SessionError};

type VoiceOf<B> = <<B as AudioBackend>::Engine as AudioEngine>::Voice;

/// What a single [`SoundHardware::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// A pending restart request was consumed and the session shut down.
    pub restarted: bool,
    /// An initialization attempt was made this tick.
    pub reinit_attempted: bool,
    /// The session was ready for the regular tick work.
    pub ready: bool,
    /// Zombie reclamation results.
    pub reclaim: ReclaimReport,
    /// Whether the level meter read new values.
    pub meter_read: bool,
}

/// Owns the output session, the voice pool, the level meter and the watchdog,
/// and drives them from a single thread.
///
/// Every tick runs, in order:
///
/// 1. consume a pending restart request (shutting the session down)
/// 2. if the session is down, attempt re-initialization at most once per
///    cooldown window, and stop there
/// 3. apply the master gain and commit engine changes
/// 4. reclaim zombie voices
/// 5. log performance counters when enabled
/// 6. update the level meter
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use voice_session::{AudioFormat, Codec, MockBackend, SessionConfig, SoundHardware, SoundSample};
///
/// let backend = MockBackend::new();
/// let mut hardware = SoundHardware::new(backend, SessionConfig::default());
/// hardware.init().unwrap();
///
/// let shot = SoundSample::shared("shot", AudioFormat::new(Codec::Pcm, 1, 22_050));
/// let id = hardware.allocate(Some(&shot), None).unwrap();
/// hardware.voice_mut(id).unwrap().start();
/// hardware.release(id);
///
/// hardware.tick().unwrap();
/// hardware.shutdown();
/// ```
pub struct SoundHardware<B: AudioBackend> {
    backend: B,
    config: SessionConfig,
    session: OutputSession<B::Engine>,
    pool: VoicePool<VoiceOf<B>>,
    meter: LevelMeter,
    watchdog: Watchdog,
    fatal: Option<SessionError>,
    event_callback: Option<EventCallback>,
}

impl<B: AudioBackend> std::fmt::Debug for SoundHardware<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundHardware")
            .field("config", &self.config)
            .field("session", &self.session)
            .field("pool", &self.pool.stats())
            .field("meter", &self.meter)
            .field("watchdog", &self.watchdog)
            .finish_non_exhaustive()
    }
}

impl<B: AudioBackend> SoundHardware<B> {
    /// Creates an uninitialized driver whose level meter logs at `trace` level.
    pub fn new(backend: B, config: SessionConfig) -> Self {
        Self::with_meter_display(backend, config, LogMeterDisplay::default())
    }

    /// Creates an uninitialized driver drawing the level meter to `display`.
    pub fn with_meter_display(
        backend: B,
        config: SessionConfig,
        display: impl MeterDisplay + Send + 'static,
    ) -> Self {
        Self {
            backend,
            config,
            session: OutputSession::new(),
            pool: VoicePool::default(),
            meter: LevelMeter::new(Box::new(display)),
            watchdog: Watchdog::new(),
            fatal: None,
            event_callback: None,
        }
    }

    /// Registers a callback for advisory events.
    ///
    /// Takes effect for the pool immediately and for the hardware error
    /// callback on the next initialization.
    pub fn on_event<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        let callback = event_callback(f);
        self.pool.set_event_callback(Some(Arc::clone(&callback)));
        self.event_callback = Some(callback);
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Configuration, mutable between ticks. Changes apply on the next tick.
    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    /// The hardware backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The output session.
    pub fn session(&self) -> &OutputSession<B::Engine> {
        &self.session
    }

    /// The voice pool.
    pub fn pool(&self) -> &VoicePool<VoiceOf<B>> {
        &self.pool
    }

    /// The level meter.
    pub fn meter(&self) -> &LevelMeter {
        &self.meter
    }

    /// The restart flag the hardware error callback sets.
    ///
    /// Setting it by hand schedules a restart on the next tick.
    pub fn restart_flag(&self) -> RestartFlag {
        self.watchdog.flag().clone()
    }

    /// Returns `true` if the output session is ready.
    pub fn is_initialized(&self) -> bool {
        self.session.is_initialized()
    }

    /// Runs the startup initialization attempt.
    ///
    /// The attempt counts toward the re-initialization cooldown.
    ///
    /// # Errors
    ///
    /// Returns the [`SessionError`] of the attempt. Retryable failures leave
    /// the driver ticking and retrying; a fatal one is also returned by every
    /// later [`tick`](Self::tick).
    pub fn init(&mut self) -> Result<(), SessionError> {
        self.init_at(tokio::time::Instant::now().into_std())
    }

    fn init_at(&mut self, now: Instant) -> Result<(), SessionError> {
        if let Some(fatal) = &self.fatal {
            return Err(fatal.clone());
        }
        self.watchdog.record_attempt(now);

        if self.session.has_engine() {
            self.shutdown();
        }

        let handler = self.watchdog.flag().handler(self.event_callback.clone());
        match self.session.initialize(
            &mut self.backend,
            &self.config,
            handler,
            self.event_callback.as_ref(),
        ) {
            Ok(voices) => {
                self.pool.rebuild(voices);
                self.meter.reset(self.session.details());
                Ok(())
            }
            Err(e) => {
                if e.is_fatal() {
                    self.fatal = Some(e.clone());
                }
                Err(e)
            }
        }
    }

    /// Runs one tick at the current time.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`SessionError`]; the owner is expected to halt.
    pub fn tick(&mut self) -> Result<TickReport, SessionError> {
        self.tick_at(tokio::time::Instant::now().into_std())
    }

    /// Runs one tick with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`SessionError`]; the owner is expected to halt.
    pub fn tick_at(&mut self, now: Instant) -> Result<TickReport, SessionError> {
        if let Some(fatal) = &self.fatal {
            return Err(fatal.clone());
        }

        let mut report = TickReport::default();

        if self.watchdog.flag().take() {
            tracing::warn!("Restarting output session after critical error");
            self.release_hardware();
            self.session.fail();
            report.restarted = true;
        }

        if !self.session.is_initialized() {
            if self.session.state().can_initialize()
                && self.watchdog.should_attempt(now, self.config.restart_cooldown)
            {
                report.reinit_attempted = true;
                match self.init_at(now) {
                    Ok(()) => report.ready = true,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(_) => {}
                }
            }
            return Ok(report);
        }

        self.session.apply_gain(&self.config);
        self.session.commit();

        report.reclaim = self.pool.reclaim();

        if self.config.show_perf_data {
            if let Some(perf) = self.session.performance() {
                tracing::info!(%perf, "Audio performance");
            }
        }

        if self.session.meter_attached() {
            if let Some(master) = self.session.master_mut() {
                report.meter_read = self.meter.tick(master, &self.config, now);
            }
        }

        report.ready = true;
        Ok(report)
    }

    /// Drives [`tick`](Self::tick) every `period` until `stop` turns `true`
    /// (or its sender is dropped). `period` must be non-zero.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`SessionError`].
    pub async fn run(
        &mut self,
        period: Duration,
        mut stop: watch::Receiver<bool>,
    ) -> Result<(), SessionError> {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*stop.borrow_and_update() {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick()?;
                }
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Allocates a voice for `leadin`, optionally chained with `looping`.
    ///
    /// # Errors
    ///
    /// [`AllocationFailure::SessionDown`] while the session is not initialized;
    /// otherwise see [`VoicePool::allocate`].
    pub fn allocate(
        &mut self,
        leadin: Option<&Arc<SoundSample>>,
        looping: Option<&Arc<SoundSample>>,
    ) -> Result<VoiceId, AllocationFailure> {
        if !self.session.is_initialized() {
            return Err(AllocationFailure::SessionDown);
        }
        self.pool.allocate(leadin, looping)
    }

    /// Releases an active voice; it becomes reusable once the hardware drains it.
    pub fn release(&mut self, id: VoiceId) -> bool {
        self.pool.release(id)
    }

    /// The active voice behind `id`.
    pub fn voice(&self, id: VoiceId) -> Option<&Voice<VoiceOf<B>>> {
        self.pool.voice(id)
    }

    /// The active voice behind `id`, mutably.
    pub fn voice_mut(&mut self, id: VoiceId) -> Option<&mut Voice<VoiceOf<B>>> {
        self.pool.voice_mut(id)
    }

    /// Pool partition sizes and counters.
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Renders the current output device listing.
    ///
    /// Returns `None` (with a warning) when there is no engine or no device.
    pub fn list_devices(&self) -> Option<String> {
        if !self.session.has_engine() {
            tracing::warn!("No audio engine, cannot list devices");
            return None;
        }
        let catalog = DeviceCatalog::enumerate(&self.backend, self.event_callback.as_ref());
        if catalog.is_empty() {
            tracing::warn!("No audio devices found");
            return None;
        }
        Some(catalog.render_listing())
    }

    /// Destroys every voice and tears down the output session and meter.
    ///
    /// Safe to call repeatedly and on a session that never initialized.
    pub fn shutdown(&mut self) {
        self.release_hardware();
        self.session.shutdown();
    }

    /// Destroys the voices and closes the meter display.
    fn release_hardware(&mut self) {
        if self.pool.capacity() > 0 {
            self.pool.destroy_all();
        }
        self.meter.release();
    }
}

impl<B: AudioBackend> Drop for SoundHardware<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! Restart signalling and re-initialization pacing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::event::{emit, EventCallback, SessionEvent};
use crate::hardware::CriticalErrorHandler;

/// Lock-free "needs restart" flag shared with the hardware error callback.
///
/// The callback side only ever calls [`set`](Self::set); the owner thread
/// consumes the flag with [`take`](Self::take) during its tick.
#[derive(Debug, Clone, Default)]
pub struct RestartFlag(Arc<AtomicBool>);

impl RestartFlag {
    /// Creates a cleared flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the session as needing a restart.
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns whether a restart was requested, clearing the request.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    /// Returns whether a restart is pending without clearing it.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Builds a critical error handler that logs, notifies and sets this flag.
    ///
    /// The handler never touches session state; it may run on any thread.
    pub fn handler(&self, events: Option<EventCallback>) -> CriticalErrorHandler {
        let flag = self.clone();
        Arc::new(move |error| {
            tracing::warn!(error = %error, "Critical audio engine error, restart scheduled");
            emit(
                events.as_ref(),
                SessionEvent::CriticalError {
                    reason: error.to_string(),
                },
            );
            flag.set();
        })
    }
}

/// Paces re-initialization attempts of a session that is down.
#[derive(Debug, Clone)]
pub struct Watchdog {
    flag: RestartFlag,
    last_attempt: Option<Instant>,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog {
    /// Creates a watchdog with no recorded attempt.
    pub fn new() -> Self {
        Self {
            flag: RestartFlag::new(),
            last_attempt: None,
        }
    }

    /// The restart flag observed by this watchdog.
    pub fn flag(&self) -> &RestartFlag {
        &self.flag
    }

    /// Records an initialization attempt made at `now`.
    pub fn record_attempt(&mut self, now: Instant) {
        self.last_attempt = Some(now);
    }

    /// Time of the last recorded attempt.
    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }

    /// Returns `true` if at least `cooldown` has passed since the last attempt.
    ///
    /// With no attempt recorded yet an attempt is always due.
    pub fn should_attempt(&self, now: Instant, cooldown: Duration) -> bool {
        self.last_attempt
            .map_or(true, |last| now.saturating_duration_since(last) >= cooldown)
    }
}

//! Fixed-capacity pool of hardware voices.
//!
//! Every slot is in exactly one of three states:
//!
//! ```text
//!            allocate                 release (request_stop)
//!   Free ───────────────▶ Active ───────────────────────────▶ Zombie
//!    ▲                                                           │
//!    └──────────── reclaim: flush, !is_playing ◀─────────────────┘
//! ```
//!
//! Stopping a hardware voice is asynchronous, so a released voice is parked as
//! a zombie until the hardware reports it idle. [`VoicePool::reclaim`] polls
//! the zombies once per tick.
//!
//! The free list keeps its order (allocation removes in place, reclamation
//! appends), and the zombie list does not (reclamation swap-removes). The
//! allocation tie-break depends on the free-list order.

use std::sync::Arc;

use crate::event::{emit, EventCallback, SessionEvent};
use crate::hardware::{AudioFormat, HardwareVoice, SoundSample};
use crate::AllocationFailure;

/// Handle to an allocated voice.
///
/// Handles carry the pool generation; handles issued before the pool was
/// rebuilt (after a session restart) are rejected instead of aliasing a new voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId {
    index: u32,
    generation: u32,
}

impl VoiceId {
    /// Slot index within the pool.
    #[must_use]
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// Membership of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Eligible for allocation.
    Free,
    /// Assigned to a caller.
    Active,
    /// Stop requested, hardware not yet idle.
    Zombie,
}

/// One slot of the pool: a hardware voice plus what is bound to it.
#[derive(Debug)]
pub struct Voice<V> {
    hardware: V,
    state: SlotState,
    format: Option<AudioFormat>,
    leadin: Option<Arc<SoundSample>>,
    looping: Option<Arc<SoundSample>>,
}

impl<V: HardwareVoice> Voice<V> {
    fn new(hardware: V) -> Self {
        Self {
            hardware,
            state: SlotState::Free,
            format: None,
            leadin: None,
            looping: None,
        }
    }

    /// A slot that was never bound accepts any format; otherwise the retained format must match.
    fn is_compatible(&self, format: &AudioFormat) -> bool {
        self.format.map_or(true, |retained| retained == *format)
    }

    /// Current slot state.
    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Format the slot was last bound with.
    pub fn format(&self) -> Option<&AudioFormat> {
        self.format.as_ref()
    }

    /// Bound lead-in sample.
    pub fn leadin(&self) -> Option<&Arc<SoundSample>> {
        self.leadin.as_ref()
    }

    /// Bound looping sample, if any.
    pub fn looping(&self) -> Option<&Arc<SoundSample>> {
        self.looping.as_ref()
    }

    /// Whether the hardware reports the channel as rendering.
    pub fn is_playing(&self) -> bool {
        self.hardware.is_playing()
    }

    /// Starts playback of the bound buffers.
    pub fn start(&mut self) {
        self.hardware.start();
    }

    /// The underlying hardware voice.
    pub fn hardware(&self) -> &V {
        &self.hardware
    }

    /// The underlying hardware voice, for driving playback parameters.
    pub fn hardware_mut(&mut self) -> &mut V {
        &mut self.hardware
    }
}

/// Counters and partition sizes of a [`VoicePool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of slots.
    pub capacity: usize,
    /// Slots in the free set.
    pub free: usize,
    /// Slots assigned to callers.
    pub active: usize,
    /// Slots waiting for the hardware to go idle.
    pub zombie: usize,
    /// Zombie polls that found the voice still playing.
    pub draining_observations: u64,
    /// Allocations that found no usable slot.
    pub exhausted_allocations: u64,
    /// Allocations whose looping sample was dropped for a format mismatch.
    pub format_mismatches: u64,
    /// Binds that changed a slot's retained format.
    pub reconfigurations: u64,
}

/// Result of one [`VoicePool::reclaim`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    /// Zombies moved back to the free set.
    pub reclaimed: usize,
    /// Zombies still reported as playing.
    pub draining: usize,
}

/// Fixed-capacity table of voice slots partitioned into free, active and zombie sets.
///
/// The pool is driven by a single owner; it has no internal locking.
pub struct VoicePool<V> {
    slots: Vec<Voice<V>>,
    free: Vec<usize>,
    zombies: Vec<usize>,
    generation: u32,
    draining_observations: u64,
    exhausted_allocations: u64,
    format_mismatches: u64,
    reconfigurations: u64,
    event_callback: Option<EventCallback>,
}

impl<V: std::fmt::Debug> std::fmt::Debug for VoicePool<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoicePool")
            .field("slots", &self.slots)
            .field("free", &self.free)
            .field("zombies", &self.zombies)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl<V> Default for VoicePool<V> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            zombies: Vec::new(),
            generation: 0,
            draining_observations: 0,
            exhausted_allocations: 0,
            format_mismatches: 0,
            reconfigurations: 0,
            event_callback: None,
        }
    }
}

impl<V: HardwareVoice> VoicePool<V> {
    /// Creates a pool with every given voice in the free set.
    pub fn new(voices: impl IntoIterator<Item = V>) -> Self {
        let mut pool = Self::default();
        pool.rebuild(voices);
        pool
    }

    /// Sets the callback receiving advisory events.
    pub fn set_event_callback(&mut self, callback: Option<EventCallback>) {
        self.event_callback = callback;
    }

    /// Replaces every slot with the given voices, all free.
    ///
    /// Existing voices are destroyed and outstanding handles become stale.
    pub fn rebuild(&mut self, voices: impl IntoIterator<Item = V>) {
        self.destroy_all();
        self.slots.extend(voices.into_iter().map(Voice::new));
        self.free.extend(0..self.slots.len());
    }

    /// Destroys every voice, leaving an empty pool.
    ///
    /// Outstanding handles become stale.
    pub fn destroy_all(&mut self) {
        for voice in self.slots.drain(..) {
            voice.hardware.destroy();
        }
        self.free.clear();
        self.zombies.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    /// Allocates a voice for `leadin`, optionally chained with `looping`.
    ///
    /// A looping sample whose codec or channel count differs from the lead-in
    /// is dropped with a warning and the voice plays the lead-in only.
    ///
    /// Among free slots the hardware reports idle, the first one whose retained
    /// format matches the lead-in wins; if none matches, the last idle free
    /// slot scanned is used and reconfigured.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationFailure::MissingLeadin`] without a lead-in,
    /// [`AllocationFailure::Exhausted`] when no free slot is idle and
    /// [`AllocationFailure::BindFailed`] when the hardware rejects the bind.
    /// None of these touch pool membership.
    pub fn allocate(
        &mut self,
        leadin: Option<&Arc<SoundSample>>,
        looping: Option<&Arc<SoundSample>>,
    ) -> Result<VoiceId, AllocationFailure> {
        let Some(leadin) = leadin else {
            return Err(AllocationFailure::MissingLeadin);
        };

        let looping = match looping {
            Some(looping) if !leadin.format().same_layout(looping.format()) => {
                tracing::warn!(
                    leadin = leadin.name(),
                    looping = looping.name(),
                    "Leadin/looping format mismatch, dropping loop"
                );
                self.format_mismatches += 1;
                emit(
                    self.event_callback.as_ref(),
                    SessionEvent::FormatMismatch {
                        leadin: leadin.name().to_string(),
                        looping: looping.name().to_string(),
                    },
                );
                None
            }
            other => other,
        };

        let format = *leadin.format();
        let mut candidate = None;
        for (position, &slot) in self.free.iter().enumerate() {
            let voice = &self.slots[slot];
            if voice.hardware.is_playing() {
                continue;
            }
            candidate = Some(position);
            if voice.is_compatible(&format) {
                break;
            }
        }

        let Some(position) = candidate else {
            self.exhausted_allocations += 1;
            tracing::debug!(
                free = self.free.len(),
                zombies = self.zombies.len(),
                "No voice available"
            );
            emit(self.event_callback.as_ref(), SessionEvent::PoolExhausted);
            return Err(AllocationFailure::Exhausted);
        };

        let slot = self.free[position];
        let voice = &mut self.slots[slot];
        if let Err(e) = voice
            .hardware
            .bind(&format, leadin, looping.map(|sample| &**sample))
        {
            tracing::warn!(slot, error = %e, "Failed to bind voice");
            return Err(AllocationFailure::BindFailed);
        }

        if voice.format.is_some_and(|retained| retained != format) {
            self.reconfigurations += 1;
        }
        voice.format = Some(format);
        voice.leadin = Some(Arc::clone(leadin));
        voice.looping = looping.cloned();
        voice.state = SlotState::Active;
        self.free.remove(position);

        Ok(VoiceId {
            index: u32::try_from(slot).unwrap_or(u32::MAX),
            generation: self.generation,
        })
    }

    /// Requests a stop and parks the voice as a zombie.
    ///
    /// The slot is not allocatable again until [`reclaim`](Self::reclaim)
    /// observes the hardware idle. Returns `false` (and does nothing) for a
    /// stale handle or a voice that is not active.
    pub fn release(&mut self, id: VoiceId) -> bool {
        let Some(slot) = self.active_slot(id) else {
            tracing::warn!(?id, "Release of a voice that is not active");
            return false;
        };

        let voice = &mut self.slots[slot];
        voice.hardware.request_stop();
        voice.state = SlotState::Zombie;
        self.zombies.push(slot);
        true
    }

    /// Polls every zombie: flushes it and frees it if the hardware reports it idle.
    ///
    /// Zombies still playing stay parked and bump the draining counter.
    pub fn reclaim(&mut self) -> ReclaimReport {
        let mut report = ReclaimReport::default();
        let mut i = 0;
        while i < self.zombies.len() {
            let slot = self.zombies[i];
            let voice = &mut self.slots[slot];
            voice.hardware.flush_buffers();
            if voice.hardware.is_playing() {
                self.draining_observations += 1;
                report.draining += 1;
                i += 1;
            } else {
                voice.state = SlotState::Free;
                voice.leadin = None;
                voice.looping = None;
                self.free.push(slot);
                // The last zombie now sits at `i`; visit it before moving on.
                self.zombies.swap_remove(i);
                report.reclaimed += 1;
            }
        }

        if report.draining > 0 {
            tracing::trace!(draining = report.draining, "Zombie voices still playing");
        }
        report
    }

    /// Returns the active voice behind `id`.
    pub fn voice(&self, id: VoiceId) -> Option<&Voice<V>> {
        self.active_slot(id).map(|slot| &self.slots[slot])
    }

    /// Returns the active voice behind `id`, mutably.
    pub fn voice_mut(&mut self, id: VoiceId) -> Option<&mut Voice<V>> {
        self.active_slot(id).map(|slot| &mut self.slots[slot])
    }

    fn active_slot(&self, id: VoiceId) -> Option<usize> {
        if id.generation != self.generation {
            return None;
        }
        let slot = id.index();
        self.slots
            .get(slot)
            .filter(|voice| voice.state == SlotState::Active)
            .map(|_| slot)
    }
}

impl<V> VoicePool<V> {
    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots in the free set.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Number of zombie slots.
    pub fn zombie_count(&self) -> usize {
        self.zombies.len()
    }

    /// Number of active slots.
    pub fn active_count(&self) -> usize {
        self.slots.len() - self.free.len() - self.zombies.len()
    }

    /// State of slot `index`.
    pub fn slot_state(&self, index: usize) -> Option<SlotState> {
        self.slots.get(index).map(|voice| voice.state)
    }

    /// Slot indices of the free set, in allocation scan order.
    pub fn free_slots(&self) -> &[usize] {
        &self.free
    }

    /// Slot indices of the zombie set.
    pub fn zombie_slots(&self) -> &[usize] {
        &self.zombies
    }

    /// Partition sizes and diagnostic counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity(),
            free: self.free_count(),
            active: self.active_count(),
            zombie: self.zombie_count(),
            draining_observations: self.draining_observations,
            exhausted_allocations: self.exhausted_allocations,
            format_mismatches: self.format_mismatches,
            reconfigurations: self.reconfigurations,
        }
    }

    /// Verifies that every slot is in exactly one set and the lists agree with slot states.
    ///
    /// # Errors
    ///
    /// Returns a description of the first inconsistency found.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut seen = vec![false; self.slots.len()];
        for (list, expected) in [(&self.free, SlotState::Free), (&self.zombies, SlotState::Zombie)] {
            for &slot in list {
                let Some(voice) = self.slots.get(slot) else {
                    return Err(format!("slot {slot} out of range"));
                };
                if std::mem::replace(&mut seen[slot], true) {
                    return Err(format!("slot {slot} listed twice"));
                }
                if voice.state != expected {
                    return Err(format!(
                        "slot {slot} is {:?} but listed as {expected:?}",
                        voice.state
                    ));
                }
            }
        }
        for (slot, voice) in self.slots.iter().enumerate() {
            if !seen[slot] && voice.state != SlotState::Active {
                return Err(format!("slot {slot} is {:?} but in no list", voice.state));
            }
        }
        Ok(())
    }
}

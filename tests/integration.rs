//! Integration tests for voice-session.
//!
//! Everything runs against the in-memory `MockBackend`; tests that need real
//! audio hardware are marked with `#[ignore]` and should be run manually.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use voice_session::{
    AllocationFailure, AudioDevice, AudioFormat, Codec, CpalDeviceEnumerator, DeviceCatalog,
    MockBackend, MockHandle, SessionConfig, SessionEvent, SlotState, SoundHardware, SoundSample,
};

const F1: AudioFormat = AudioFormat::new(Codec::Pcm, 2, 44_100);
const F2: AudioFormat = AudioFormat::new(Codec::Adpcm, 1, 22_050);

fn hardware_with(config: SessionConfig) -> (SoundHardware<MockBackend>, MockHandle) {
    let backend = MockBackend::new();
    let handle = backend.handle();
    let mut hardware = SoundHardware::new(backend, config);
    hardware.init().unwrap();
    (hardware, handle)
}

fn hardware(capacity: usize) -> (SoundHardware<MockBackend>, MockHandle) {
    hardware_with(SessionConfig {
        voice_capacity: capacity,
        ..Default::default()
    })
}

fn record_events(hardware: &mut SoundHardware<MockBackend>) -> Arc<Mutex<Vec<SessionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    hardware.on_event(move |e| sink.lock().unwrap().push(e));
    events
}

#[test]
fn test_release_then_tick_returns_voice_to_free() {
    let (mut hw, handle) = hardware(4);
    let a = SoundSample::shared("a", F1);

    let id = hw.allocate(Some(&a), None).unwrap();
    hw.voice_mut(id).unwrap().start();
    let stats = hw.stats();
    assert_eq!((stats.active, stats.free), (1, 3));

    assert!(hw.release(id));
    let stats = hw.stats();
    assert_eq!((stats.zombie, stats.free, stats.active), (1, 3, 0));

    handle.set_playing(id.index(), false);
    hw.tick().unwrap();
    let stats = hw.stats();
    assert_eq!((stats.zombie, stats.free), (0, 4));
    hw.pool().check_invariants().unwrap();
}

#[test]
fn test_mismatched_loop_is_dropped_with_warning() {
    let (mut hw, handle) = hardware(4);
    let events = record_events(&mut hw);
    let leadin = SoundSample::shared("door_open", F1);
    let looping = SoundSample::shared("door_hum", F2);

    let id = hw.allocate(Some(&leadin), Some(&looping)).unwrap();

    let voice = hw.voice(id).unwrap();
    assert_eq!(voice.leadin().unwrap().name(), "door_open");
    assert!(voice.looping().is_none());
    assert_eq!(handle.voice(id.index()).unwrap().looping, None);
    assert_eq!(hw.stats().format_mismatches, 1);
    assert!(events.lock().unwrap().contains(&SessionEvent::FormatMismatch {
        leadin: "door_open".to_string(),
        looping: "door_hum".to_string(),
    }));
}

#[test]
fn test_exhaustion_leaves_partition_untouched() {
    let (mut hw, handle) = hardware(2);
    let events = record_events(&mut hw);
    let s = SoundSample::shared("s", F1);

    let a = hw.allocate(Some(&s), None).unwrap();
    let b = hw.allocate(Some(&s), None).unwrap();
    hw.voice_mut(a).unwrap().start();
    hw.voice_mut(b).unwrap().start();
    hw.release(a);
    let before = hw.stats();

    assert_eq!(
        hw.allocate(Some(&s), None),
        Err(AllocationFailure::Exhausted)
    );

    let after = hw.stats();
    assert_eq!((after.free, after.active, after.zombie), (before.free, before.active, before.zombie));
    assert_eq!(hw.pool().zombie_slots(), &[a.index()]);
    assert!(handle.voice(a.index()).unwrap().playing);
    assert!(events.lock().unwrap().contains(&SessionEvent::PoolExhausted));
}

#[test]
fn test_allocate_never_hands_out_a_playing_slot() {
    let (mut hw, handle) = hardware(3);
    let s = SoundSample::shared("s", F1);
    // Hardware reports slot 0 busy although it is in the free set.
    handle.set_playing(0, true);

    let id = hw.allocate(Some(&s), None).unwrap();
    assert_ne!(id.index(), 0);
}

#[test]
fn test_reclaim_is_idempotent() {
    let (mut hw, handle) = hardware(4);
    let s = SoundSample::shared("s", F1);
    let ids: Vec<_> = (0..3).map(|_| hw.allocate(Some(&s), None).unwrap()).collect();
    for &id in &ids {
        hw.voice_mut(id).unwrap().start();
        hw.release(id);
    }
    handle.set_playing(ids[1].index(), false);

    hw.tick().unwrap();
    let first = (hw.pool().free_slots().to_vec(), hw.pool().zombie_slots().to_vec());
    hw.tick().unwrap();
    let second = (hw.pool().free_slots().to_vec(), hw.pool().zombie_slots().to_vec());
    assert_eq!(first, second);
    assert_eq!(first.1.len(), 2);
}

#[test]
fn test_selected_device_round_trips_to_master() {
    let backend = MockBackend::new();
    let handle = backend.handle();
    let speakers = AudioDevice::new("{0.0.0}.{speakers}", "Speakers");
    let headset = AudioDevice::new("{0.0.0}.{headset}", "Headset");
    handle.set_devices(Some(speakers.clone()), vec![speakers, headset]);

    let catalog = DeviceCatalog::enumerate(&backend, None);
    let config = SessionConfig {
        preferred_device: Some(2),
        ..Default::default()
    };
    let mut hw = SoundHardware::new(backend, config);
    hw.init().unwrap();

    assert_eq!(handle.master_device().as_ref(), Some(&catalog.get(2).unwrap().id));
    assert_eq!(hw.session().device().unwrap().name, "Headset");
}

#[test]
fn test_meter_toggle_takes_effect_next_tick() {
    let (mut hw, handle) = hardware(4);
    handle.set_levels(&[0.3, 0.4], &[0.6, 0.7]);

    let report = hw.tick().unwrap();
    assert!(!report.meter_read);
    assert!(!handle.meter_enabled());
    assert_eq!(handle.meter_reads(), 0);

    hw.config_mut().show_level_meter = true;
    let report = hw.tick().unwrap();
    assert!(report.meter_read);
    assert!(handle.meter_enabled());
    assert_eq!(hw.meter().rms(), &[0.3, 0.4]);
    assert_eq!(hw.meter().peak(), &[0.6, 0.7]);

    hw.config_mut().show_level_meter = false;
    hw.tick().unwrap();
    assert!(!handle.meter_enabled());
    assert_eq!(handle.meter_reads(), 1);
}

#[test]
fn test_critical_error_reinitializes_after_cooldown_only() {
    let backend = MockBackend::new();
    let handle = backend.handle();
    let mut hw = SoundHardware::new(backend, SessionConfig::default());
    let events = record_events(&mut hw);
    let start = Instant::now();
    hw.tick_at(start).unwrap();
    assert!(hw.is_initialized());

    // The hardware reports the error from its own thread.
    let remote = handle.clone();
    std::thread::spawn(move || assert!(remote.fire_critical_error("device removed")))
        .join()
        .unwrap();

    let report = hw.tick_at(start + Duration::from_millis(100)).unwrap();
    assert!(report.restarted);
    assert!(!report.reinit_attempted);
    assert!(!handle.engine_alive());

    for ms in [200, 500, 999] {
        let report = hw.tick_at(start + Duration::from_millis(ms)).unwrap();
        assert!(!report.reinit_attempted, "retried at {ms}ms");
    }
    assert_eq!(handle.engine_attempts().len(), 1);

    let report = hw.tick_at(start + Duration::from_millis(1000)).unwrap();
    assert!(report.reinit_attempted);
    assert!(hw.is_initialized());
    assert_eq!(handle.engine_attempts().len(), 2);
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, SessionEvent::CriticalError { .. })));
}

#[test]
fn test_persistent_failure_retries_once_per_cooldown() {
    let backend = MockBackend::new();
    let handle = backend.handle();
    handle.set_fail_master(true);
    let config = SessionConfig {
        instrumented_engine: false,
        ..Default::default()
    };
    let mut hw = SoundHardware::new(backend, config);
    let start = Instant::now();

    for ms in (0..3000).step_by(100) {
        hw.tick_at(start + Duration::from_millis(ms)).unwrap();
    }

    // Attempts at 0, 1000 and 2000 ms.
    assert_eq!(handle.engine_attempts().len(), 3);
    assert!(!hw.is_initialized());
}

#[test]
fn test_stale_handle_after_restart_is_rejected() {
    let (mut hw, handle) = hardware(4);
    let s = SoundSample::shared("s", F1);
    let id = hw.allocate(Some(&s), None).unwrap();

    hw.restart_flag().set();
    let start = Instant::now() + Duration::from_secs(5);
    hw.tick_at(start).unwrap();
    assert!(hw.is_initialized());
    assert!(handle.voice(id.index()).is_some());

    assert!(!hw.release(id));
    assert!(hw.voice(id).is_none());
    assert_eq!(hw.pool().slot_state(id.index()), Some(SlotState::Free));
}

#[test]
fn test_shutdown_order() {
    let (mut hw, handle) = hardware(4);
    hw.shutdown();

    let log = handle.log();
    let teardown: Vec<_> = log.iter().skip_while(|e| **e != "voices_destroy").copied().collect();
    assert_eq!(
        teardown,
        vec![
            "voices_destroy",
            "unregister_handler",
            "submix_destroy",
            "master_detach_effects",
            "master_destroy",
            "engine_release",
        ]
    );
    assert!(handle.voice(0).unwrap().destroyed);
    assert!(!hw.meter().is_open());
}

#[test]
fn test_mute_forces_silence_every_tick() {
    let (mut hw, handle) = hardware(4);
    hw.config_mut().volume_db = -6.0;
    hw.tick().unwrap();
    assert!((handle.last_gain().unwrap() - 0.501_187).abs() < 1e-4);

    hw.config_mut().muted = true;
    hw.tick().unwrap();
    hw.tick().unwrap();
    let gains = handle.gains();
    assert_eq!(&gains[gains.len() - 2..], &[0.0, 0.0]);
}

#[test]
fn test_enumeration_failure_reports_no_devices() {
    let backend = MockBackend::new();
    let handle = backend.handle();
    handle.set_enumeration_error(Some("service stopped"));
    let mut hw = SoundHardware::new(backend, SessionConfig::default());
    let events = record_events(&mut hw);

    assert!(hw.init().is_err());
    assert!(!hw.is_initialized());

    let events = events.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::EnumerationFailed { .. })));
    assert!(events.contains(&SessionEvent::NoDevicesFound));
}

#[test]
#[ignore = "requires audio hardware"]
fn test_cpal_catalog_lists_default_first() {
    let catalog = DeviceCatalog::enumerate(&CpalDeviceEnumerator::new(), None);
    assert!(!catalog.is_empty());
    println!("{}", catalog.render_listing());
}

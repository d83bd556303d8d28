//! Simulated game loop example.
//!
//! Drives a `SoundHardware` on the mock backend at ~60 ticks per second:
//! starts and releases voices, lets the "hardware" drain them, pulls the
//! device out from under the session halfway through and watches it recover.
//!
//! Run with: RUST_LOG=info cargo run --example voice_session

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::watch;
use voice_session::{
    AudioFormat, Codec, MockBackend, SessionConfig, SoundHardware, SoundSample,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt::init();

    let backend = MockBackend::new();
    let handle = backend.handle();

    let config = SessionConfig {
        show_level_meter: true,
        voice_capacity: 8,
        ..Default::default()
    };
    let mut hardware = SoundHardware::new(backend, config);
    hardware.on_event(|e| tracing::info!(?e, "session event"));
    hardware.init()?;

    if let Some(listing) = hardware.list_devices() {
        println!("Output devices:\n{listing}");
    }

    let stereo = AudioFormat::new(Codec::Pcm, 2, 44_100);
    let footstep = SoundSample::shared("footstep", stereo);
    let engine_start = SoundSample::shared("engine_start", stereo);
    let engine_loop = SoundSample::shared("engine_loop", AudioFormat::new(Codec::Adpcm, 2, 44_100));

    let mut playing = VecDeque::new();
    let mut interval = tokio::time::interval(Duration::from_millis(16));

    for frame in 0..180u32 {
        interval.tick().await;

        if frame % 4 == 0 {
            let (leadin, looping) = if frame % 12 == 0 {
                (&engine_start, Some(&engine_loop))
            } else {
                (&footstep, None)
            };
            match hardware.allocate(Some(leadin), looping) {
                Ok(id) => {
                    if let Some(voice) = hardware.voice_mut(id) {
                        voice.start();
                    }
                    playing.push_back(id);
                }
                Err(e) => tracing::debug!(frame, error = %e, "Sound dropped"),
            }
        }
        if frame % 6 == 0 {
            if let Some(id) = playing.pop_front() {
                hardware.release(id);
            }
        }
        if frame % 20 == 0 {
            handle.drain_all();
        }
        if frame == 90 {
            handle.fire_critical_error("device unplugged");
        }

        let level = (frame % 30) as f32 / 30.0;
        handle.set_levels(&[level * 0.5, level * 0.4], &[level, level * 0.8]);

        let report = hardware.tick()?;
        if report.restarted || report.reinit_attempted {
            println!("frame {frame}: {report:?}");
        }
    }

    println!("Pool after game loop: {:?}", hardware.stats());

    // Hand the loop over to the async driver for half a second.
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let _ = stop_tx.send(true);
    });
    hardware.run(Duration::from_millis(16), stop_rx).await?;

    hardware.shutdown();
    println!("Final pool: {:?}", hardware.stats());

    Ok(())
}

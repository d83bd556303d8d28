//! Level meter: per-channel RMS and held peaks read from the master endpoint.
//!
//! The meter keeps the displayed values itself and pushes them to a
//! display-agnostic [`MeterDisplay`] every tick. Peaks are held for the
//! configured duration, then decay by [`PEAK_DECAY`] per tick until a louder
//! reading replaces them.

use std::time::Instant;

use crate::config::{SessionConfig, DEFAULT_METER_POSITION};
use crate::hardware::{EndpointDetails, MasterEndpoint, MeterLevels, MAX_METER_CHANNELS};

/// Multiplicative per-tick decay applied to a peak after its hold expires.
pub const PEAK_DECAY: f32 = 0.9;

/// Speaker names in channel-mask bit order.
const CHANNEL_NAMES: [&str; 11] = ["L", "R", "C", "S", "Lb", "Rb", "Lf", "Rf", "Cb", "Ls", "Rs"];

/// Screen placement of the meter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterGeometry {
    /// Left edge.
    pub left: f32,
    /// Top edge.
    pub top: f32,
    /// Width of one channel bar.
    pub width: f32,
    /// Height of the bars.
    pub height: f32,
}

impl Default for MeterGeometry {
    fn default() -> Self {
        Self::parse(DEFAULT_METER_POSITION)
    }
}

impl MeterGeometry {
    /// Parses `"left top width height"`.
    ///
    /// Fields are read in order until the first one that fails to parse; that
    /// field and every later one keep their built-in defaults (100, 100, 20, 200).
    ///
    /// ```
    /// use voice_session::MeterGeometry;
    ///
    /// let g = MeterGeometry::parse("10 20 oops 40");
    /// assert_eq!((g.left, g.top, g.width, g.height), (10.0, 20.0, 20.0, 200.0));
    /// ```
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let mut fields = [100.0, 100.0, 20.0, 200.0];
        for (field, token) in fields.iter_mut().zip(s.split_whitespace()) {
            match token.parse::<f32>() {
                Ok(value) => *field = value,
                Err(_) => break,
            }
        }
        let [left, top, width, height] = fields;
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// One tick's worth of meter output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterFrame<'a> {
    /// Placement; `width` already spans every displayed channel.
    pub geometry: MeterGeometry,
    /// RMS value per channel.
    pub rms: &'a [f32],
    /// Displayed (held or decaying) peak per channel.
    pub peak: &'a [f32],
}

/// Destination for meter output, e.g. an on-screen graph.
pub trait MeterDisplay {
    /// Allocates display resources for `channels` bars with the given labels.
    fn open(&mut self, channels: usize, labels: &[&'static str]);

    /// Shows or hides the display.
    fn set_enabled(&mut self, enabled: bool);

    /// Draws a frame.
    fn draw(&mut self, frame: &MeterFrame<'_>);

    /// Releases display resources.
    fn close(&mut self);
}

/// A display that shows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMeterDisplay;

impl MeterDisplay for NullMeterDisplay {
    fn open(&mut self, _channels: usize, _labels: &[&'static str]) {}

    fn set_enabled(&mut self, _enabled: bool) {}

    fn draw(&mut self, _frame: &MeterFrame<'_>) {}

    fn close(&mut self) {}
}

/// A display that emits every frame as a `trace` event.
#[derive(Debug, Default, Clone)]
pub struct LogMeterDisplay {
    labels: Vec<&'static str>,
}

impl MeterDisplay for LogMeterDisplay {
    fn open(&mut self, _channels: usize, labels: &[&'static str]) {
        self.labels = labels.to_vec();
    }

    fn set_enabled(&mut self, _enabled: bool) {}

    fn draw(&mut self, frame: &MeterFrame<'_>) {
        tracing::trace!(
            channels = ?self.labels,
            rms = ?frame.rms,
            peak = ?frame.peak,
            "level meter"
        );
    }

    fn close(&mut self) {
        self.labels.clear();
    }
}

/// Derives bar labels from a speaker channel mask, skipping unset bits.
#[must_use]
pub fn channel_labels(channel_mask: u32) -> Vec<&'static str> {
    CHANNEL_NAMES
        .iter()
        .enumerate()
        .filter(|(bit, _)| channel_mask & (1 << bit) != 0)
        .map(|(_, name)| *name)
        .collect()
}

/// Per-channel RMS/peak state feeding a [`MeterDisplay`].
pub struct LevelMeter {
    display: Box<dyn MeterDisplay + Send>,
    open: bool,
    channels: usize,
    rms: [f32; MAX_METER_CHANNELS],
    peak: [f32; MAX_METER_CHANNELS],
    peak_expiry: [Option<Instant>; MAX_METER_CHANNELS],
}

impl std::fmt::Debug for LevelMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelMeter")
            .field("open", &self.open)
            .field("channels", &self.channels)
            .field("rms", &self.rms())
            .field("peak", &self.peak())
            .finish_non_exhaustive()
    }
}

impl LevelMeter {
    /// Creates a closed meter drawing to `display`.
    pub fn new(display: Box<dyn MeterDisplay + Send>) -> Self {
        Self {
            display,
            open: false,
            channels: 0,
            rms: [0.0; MAX_METER_CHANNELS],
            peak: [0.0; MAX_METER_CHANNELS],
            peak_expiry: [None; MAX_METER_CHANNELS],
        }
    }

    /// Resets all readings and opens the display for the endpoint's channels.
    ///
    /// Called on every successful session initialization.
    pub fn reset(&mut self, endpoint: EndpointDetails) {
        if self.open {
            self.display.close();
        }
        self.channels = usize::from(endpoint.channels).min(MAX_METER_CHANNELS);
        self.rms = [0.0; MAX_METER_CHANNELS];
        self.peak = [0.0; MAX_METER_CHANNELS];
        self.peak_expiry = [None; MAX_METER_CHANNELS];
        self.display
            .open(self.channels, &channel_labels(endpoint.channel_mask));
        self.display.set_enabled(false);
        self.open = true;
    }

    /// Releases the display.
    pub fn release(&mut self) {
        if self.open {
            self.display.close();
            self.open = false;
        }
    }

    /// Whether the display is open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Number of channels being metered (at most [`MAX_METER_CHANNELS`]).
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Last RMS values, one per metered channel.
    pub fn rms(&self) -> &[f32] {
        &self.rms[..self.channels]
    }

    /// Displayed peak values, one per metered channel.
    pub fn peak(&self) -> &[f32] {
        &self.peak[..self.channels]
    }

    /// Runs one meter tick against `master`.
    ///
    /// With the meter disabled in `config`, the metering effect is switched off
    /// and nothing is read. Returns `true` if levels were read.
    pub fn tick<M: MasterEndpoint>(
        &mut self,
        master: &mut M,
        config: &SessionConfig,
        now: Instant,
    ) -> bool {
        if !self.open {
            return false;
        }

        let enabled = config.show_level_meter;
        self.display.set_enabled(enabled);
        master.set_level_meter_enabled(enabled);
        if !enabled {
            return false;
        }

        let mut levels = MeterLevels::with_channels(self.channels);
        master.read_levels(&mut levels);

        for (peak, expiry) in self.peak[..self.channels]
            .iter_mut()
            .zip(&self.peak_expiry[..self.channels])
        {
            if expiry.map_or(true, |at| at < now) {
                *peak *= PEAK_DECAY;
            }
        }

        let mut geometry = MeterGeometry::parse(&config.meter_position);
        geometry.width *= self.channels as f32;

        for i in 0..self.channels {
            self.rms[i] = levels.rms[i];
            if levels.peak[i] >= self.peak[i] {
                self.peak[i] = levels.peak[i];
                self.peak_expiry[i] = Some(now + config.meter_peak_hold);
            }
        }

        self.display.draw(&MeterFrame {
            geometry,
            rms: &self.rms[..self.channels],
            peak: &self.peak[..self.channels],
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceId;
    use crate::hardware::{AudioBackend, AudioEngine, EngineMode};
    use crate::{MockBackend, MockHandle, MockMaster};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct Recorded {
        opened: Option<(usize, Vec<&'static str>)>,
        enabled: Option<bool>,
        frames: Vec<(MeterGeometry, Vec<f32>, Vec<f32>)>,
        closed: usize,
    }

    #[derive(Clone, Default)]
    struct RecordingDisplay(Arc<Mutex<Recorded>>);

    impl MeterDisplay for RecordingDisplay {
        fn open(&mut self, channels: usize, labels: &[&'static str]) {
            self.0.lock().unwrap().opened = Some((channels, labels.to_vec()));
        }

        fn set_enabled(&mut self, enabled: bool) {
            self.0.lock().unwrap().enabled = Some(enabled);
        }

        fn draw(&mut self, frame: &MeterFrame<'_>) {
            self.0.lock().unwrap().frames.push((
                frame.geometry,
                frame.rms.to_vec(),
                frame.peak.to_vec(),
            ));
        }

        fn close(&mut self) {
            self.0.lock().unwrap().closed += 1;
        }
    }

    fn setup(channels: u16, mask: u32) -> (LevelMeter, RecordingDisplay, MockMaster, MockHandle) {
        let mut backend = MockBackend::new();
        let handle = backend.handle();
        handle.set_output(channels, mask);
        let mut engine = backend.create_engine(EngineMode::Standard).unwrap();
        let master = engine
            .create_master(44_100, &DeviceId::new("mock-speakers"))
            .unwrap();

        let display = RecordingDisplay::default();
        let mut meter = LevelMeter::new(Box::new(display.clone()));
        meter.reset(master.details());
        (meter, display, master, handle)
    }

    fn enabled_config() -> SessionConfig {
        SessionConfig {
            show_level_meter: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_geometry_defaults_and_partial_parse() {
        assert_eq!(
            MeterGeometry::default(),
            MeterGeometry {
                left: 100.0,
                top: 100.0,
                width: 20.0,
                height: 200.0
            }
        );
        let g = MeterGeometry::parse("5 6 7 8");
        assert_eq!((g.left, g.top, g.width, g.height), (5.0, 6.0, 7.0, 8.0));
        let g = MeterGeometry::parse("5");
        assert_eq!((g.left, g.top, g.width, g.height), (5.0, 100.0, 20.0, 200.0));
        assert_eq!(MeterGeometry::parse("garbage"), MeterGeometry::default());
        assert_eq!(MeterGeometry::parse(""), MeterGeometry::default());
    }

    #[test]
    fn test_channel_labels_follow_mask() {
        assert_eq!(channel_labels(0b11), vec!["L", "R"]);
        // 5.1: FL FR FC LFE BL BR
        assert_eq!(
            channel_labels(0b11_1111),
            vec!["L", "R", "C", "S", "Lb", "Rb"]
        );
        assert_eq!(channel_labels(0b101), vec!["L", "C"]);
    }

    #[test]
    fn test_reset_opens_display_with_labels() {
        let (meter, display, _master, _) = setup(2, 0b11);
        let recorded = display.0.lock().unwrap();
        assert_eq!(recorded.opened, Some((2, vec!["L", "R"])));
        assert_eq!(recorded.enabled, Some(false));
        assert!(meter.is_open());
    }

    #[test]
    fn test_disabled_meter_reads_nothing() {
        let (mut meter, display, mut master, handle) = setup(2, 0b11);
        handle.set_levels(&[0.5, 0.5], &[0.9, 0.9]);

        let read = meter.tick(&mut master, &SessionConfig::default(), Instant::now());

        assert!(!read);
        assert_eq!(handle.meter_reads(), 0);
        assert!(!handle.meter_enabled());
        assert!(display.0.lock().unwrap().frames.is_empty());
    }

    #[test]
    fn test_enabled_meter_reads_and_draws() {
        let (mut meter, display, mut master, handle) = setup(2, 0b11);
        handle.set_levels(&[0.25, 0.5], &[0.75, 1.0]);

        let config = SessionConfig {
            meter_position: "10 10 30 100".to_string(),
            ..enabled_config()
        };
        assert!(meter.tick(&mut master, &config, Instant::now()));

        assert!(handle.meter_enabled());
        assert_eq!(meter.rms(), &[0.25, 0.5]);
        assert_eq!(meter.peak(), &[0.75, 1.0]);
        let recorded = display.0.lock().unwrap();
        let (geometry, rms, peak) = &recorded.frames[0];
        assert!((geometry.width - 60.0).abs() < f32::EPSILON);
        assert_eq!(rms, &vec![0.25, 0.5]);
        assert_eq!(peak, &vec![0.75, 1.0]);
    }

    #[test]
    fn test_peak_holds_then_decays() {
        let (mut meter, _display, mut master, handle) = setup(1, 0b1);
        let config = enabled_config();
        let start = Instant::now();

        handle.set_levels(&[0.1], &[1.0]);
        meter.tick(&mut master, &config, start);
        handle.set_levels(&[0.1], &[0.2]);

        // Within hold time the peak stays.
        meter.tick(&mut master, &config, start + Duration::from_millis(500));
        assert!((meter.peak()[0] - 1.0).abs() < f32::EPSILON);

        // After expiry it decays once per tick.
        meter.tick(&mut master, &config, start + Duration::from_millis(1001));
        assert!((meter.peak()[0] - 0.9).abs() < 1e-6);
        meter.tick(&mut master, &config, start + Duration::from_millis(1002));
        assert!((meter.peak()[0] - 0.81).abs() < 1e-6);
    }

    #[test]
    fn test_louder_reading_replaces_decayed_peak() {
        let (mut meter, _display, mut master, handle) = setup(1, 0b1);
        let config = enabled_config();
        let start = Instant::now();

        handle.set_levels(&[0.0], &[0.5]);
        meter.tick(&mut master, &config, start);
        handle.set_levels(&[0.0], &[0.46]);
        // 0.5 decays to 0.45, then 0.46 >= 0.45 takes over with a fresh hold.
        let later = start + Duration::from_millis(1500);
        meter.tick(&mut master, &config, later);
        assert!((meter.peak()[0] - 0.46).abs() < 1e-6);

        meter.tick(&mut master, &config, later + Duration::from_millis(999));
        assert!((meter.peak()[0] - 0.46).abs() < 1e-6);
    }

    #[test]
    fn test_channel_count_is_capped() {
        let (mut meter, display, mut master, handle) = setup(12, 0xFFF);
        handle.set_levels(&[0.1; 8], &[0.2; 8]);

        meter.tick(&mut master, &enabled_config(), Instant::now());

        assert_eq!(meter.channels(), MAX_METER_CHANNELS);
        assert_eq!(display.0.lock().unwrap().frames[0].1.len(), MAX_METER_CHANNELS);
    }

    #[test]
    fn test_toggle_enables_on_next_tick() {
        let (mut meter, _display, mut master, handle) = setup(2, 0b11);
        let mut config = SessionConfig::default();
        meter.tick(&mut master, &config, Instant::now());
        assert_eq!(handle.meter_reads(), 0);

        config.show_level_meter = true;
        meter.tick(&mut master, &config, Instant::now());
        assert_eq!(handle.meter_reads(), 1);
    }

    #[test]
    fn test_release_closes_display_once() {
        let (mut meter, display, _master, _) = setup(2, 0b11);
        meter.release();
        meter.release();
        assert_eq!(display.0.lock().unwrap().closed, 1);
        assert!(!meter.is_open());
    }

    #[test]
    fn test_closed_meter_skips_tick() {
        let mut meter = LevelMeter::new(Box::new(NullMeterDisplay));
        let mut backend = MockBackend::new();
        let handle = backend.handle();
        let mut engine = backend.create_engine(EngineMode::Standard).unwrap();
        let mut master = engine
            .create_master(44_100, &DeviceId::new("mock-speakers"))
            .unwrap();

        assert!(!meter.tick(&mut master, &enabled_config(), Instant::now()));
        assert_eq!(handle.meter_reads(), 0);
    }
}

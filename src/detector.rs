//! Throttle pedal calibration
//!
//! Detects up to two potentiometers and determines their min/max readings,
//! whether they read low to high or high to low, and whether the second one
//! is the inverse of the first.
//!
//! A run walks through the phases in order: wait for the released pedal to
//! settle, sample it, wait for the pressed pedal to settle, sample it. The
//! operator holds the pedal in place during each phase.

use log::{info, warn};

use crate::config::DetectorConfig;
use crate::device::Clock;
use crate::throttle::{Channel, PotentiometerReader};
use crate::Error;

/// Externally visible calibration phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionState {
    /// Idle, the last result is valid
    DoNothing,
    /// Two channels, waiting for the released pedal to settle
    DetectBothMinWait,
    /// Two channels, sampling the released pedal
    DetectBothMinCalibrate,
    /// Two channels, waiting for the pressed pedal to settle
    DetectBothMaxWait,
    /// Two channels, sampling the pressed pedal
    DetectBothMaxCalibrate,
    /// One channel, waiting for the released pedal to settle
    DetectMinWait,
    /// One channel, sampling the released pedal
    DetectMinCalibrate,
    /// One channel, waiting for the pressed pedal to settle
    DetectMaxWait,
    /// One channel, sampling the pressed pedal
    DetectMaxCalibrate,
}

/// Calibration of a single potentiometer
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelCalibration {
    /// Lowest reading seen
    pub min: u16,
    /// Highest reading seen
    pub max: u16,
    /// Reading decreases as the pedal is pressed
    pub high_low: bool,
}

/// Outcome of a completed calibration run
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CalibrationResult {
    /// Number of potentiometers detected, 0 before the first run
    pub potentiometer_count: u8,
    /// First potentiometer
    pub throttle1: ChannelCalibration,
    /// Second potentiometer, zeroed if not present
    pub throttle2: ChannelCalibration,
    /// Second potentiometer moves against the first
    pub throttle2_inverse: bool,
    /// Readings stayed within tolerance and both pedal positions differed
    pub consistent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Reading([u16; 2]);

// Statistics of one sampling window
#[derive(Debug, Clone, Copy, PartialEq)]
struct Window {
    min: [u16; 2],
    max: [u16; 2],
    sum: [u32; 2],
    count: u32,
}

impl Window {
    fn new(r: Reading) -> Self {
        Window {
            min: r.0,
            max: r.0,
            sum: [u32::from(r.0[0]), u32::from(r.0[1])],
            count: 1,
        }
    }

    fn push(&mut self, r: Reading) {
        for ch in 0..2 {
            self.min[ch] = self.min[ch].min(r.0[ch]);
            self.max[ch] = self.max[ch].max(r.0[ch]);
            self.sum[ch] = self.sum[ch].saturating_add(u32::from(r.0[ch]));
        }
        self.count = self.count.saturating_add(1);
    }

    fn mean(&self, ch: usize) -> u16 {
        (self.sum[ch] / self.count) as u16
    }

    fn spread(&self, ch: usize) -> u16 {
        self.max[ch] - self.min[ch]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    DoNothing,
    MinWait { since: u32, reference: Reading },
    MinCalibrate { since: u32, window: Window },
    MaxWait { since: u32, reference: Reading, rest: Window },
    MaxCalibrate { since: u32, window: Window, rest: Window },
}

/// Auto-calibration of a throttle pedal
pub struct ThrottleDetector<T, C> {
    throttle: T,
    clock: C,
    config: DetectorConfig,
    phase: Phase,
    both: bool,
    result: CalibrationResult,
}

impl<T: PotentiometerReader, C: Clock> ThrottleDetector<T, C> {
    /// Creates an idle detector
    pub fn new(throttle: T, clock: C, config: DetectorConfig) -> Self {
        ThrottleDetector {
            throttle,
            clock,
            config,
            phase: Phase::DoNothing,
            both: false,
            result: CalibrationResult::default(),
        }
    }

    /// Starts a calibration run
    ///
    /// Whether a second potentiometer is wired is decided here, once per run.
    pub fn detect(&mut self) -> Result<(), Error> {
        if self.phase != Phase::DoNothing {
            warn!("throttle detector: calibration already in progress");
            return Err(Error::CalibrationInProgress);
        }

        self.both = self.throttle2_provided();
        info!(
            "throttle detector: starting with {} potentiometer(s)",
            if self.both { 2 } else { 1 }
        );
        self.enter_min_wait();
        Ok(())
    }

    /// Restarts the released pedal phase
    pub fn detect_min(&mut self) {
        if self.phase == Phase::DoNothing {
            self.both = self.throttle2_provided();
        }
        self.enter_min_wait();
    }

    /// Jumps straight to the pressed pedal phase
    ///
    /// The released pedal position is taken from the current run if it has
    /// sampled one, otherwise from the last completed run with the same
    /// wiring, otherwise from the pedal as it reads now.
    pub fn detect_max(&mut self) {
        if self.phase == Phase::DoNothing {
            self.both = self.throttle2_provided();
        }

        let reading = self.read();
        let rest = match self.phase {
            Phase::MaxWait { rest, .. } | Phase::MaxCalibrate { rest, .. } => rest,
            Phase::MinCalibrate { window, .. } => {
                self.display_calibrated_values(true, &window);
                window
            }
            Phase::DoNothing | Phase::MinWait { .. } => self
                .last_rest()
                .unwrap_or_else(|| Window::new(reading)),
        };

        self.phase = Phase::MaxWait {
            since: self.clock.ms(),
            reference: reading,
            rest,
        };
        info!("throttle detector: press the pedal fully and hold it");
    }

    // Released pedal position of the last completed run
    fn last_rest(&self) -> Option<Window> {
        let r = &self.result;
        let channels = if self.both { 2 } else { 1 };
        if r.potentiometer_count != channels {
            return None;
        }

        let released = |c: &ChannelCalibration| if c.high_low { c.max } else { c.min };
        Some(Window::new(Reading([
            released(&r.throttle1),
            released(&r.throttle2),
        ])))
    }

    /// Advances the calibration by one sample
    pub fn handle_tick(&mut self) {
        if self.phase == Phase::DoNothing {
            return;
        }

        let reading = self.read();
        let now = self.clock.ms();

        let phase = self.phase;
        self.phase = match phase {
            Phase::DoNothing => Phase::DoNothing,
            Phase::MinWait { since, reference } => self.min_wait(since, reference, reading, now),
            Phase::MinCalibrate { since, window } => {
                self.min_calibrate(since, window, reading, now)
            }
            Phase::MaxWait {
                since,
                reference,
                rest,
            } => self.max_wait(since, reference, rest, reading, now),
            Phase::MaxCalibrate {
                since,
                window,
                rest,
            } => self.max_calibrate(since, window, rest, reading, now),
        };
    }

    fn min_wait(&self, since: u32, reference: Reading, reading: Reading, now: u32) -> Phase {
        if self.deviates(reading, reference) {
            return Phase::MinWait {
                since: now,
                reference: reading,
            };
        }

        if now.wrapping_sub(since) >= self.config.wait_ms {
            Phase::MinCalibrate {
                since: now,
                window: Window::new(reading),
            }
        } else {
            Phase::MinWait { since, reference }
        }
    }

    fn min_calibrate(&self, since: u32, mut window: Window, reading: Reading, now: u32) -> Phase {
        window.push(reading);

        if now.wrapping_sub(since) < self.config.calibrate_ms {
            return Phase::MinCalibrate { since, window };
        }

        self.display_calibrated_values(true, &window);
        info!("throttle detector: press the pedal fully and hold it");
        Phase::MaxWait {
            since: now,
            reference: reading,
            rest: window,
        }
    }

    fn max_wait(
        &self,
        since: u32,
        reference: Reading,
        rest: Window,
        reading: Reading,
        now: u32,
    ) -> Phase {
        // the pedal has to leave the rest position before the dwell counts
        let at_rest = diff(reading.0[0], rest.mean(0)) <= self.config.tolerance();

        if at_rest || self.deviates(reading, reference) {
            return Phase::MaxWait {
                since: now,
                reference: reading,
                rest,
            };
        }

        if now.wrapping_sub(since) >= self.config.wait_ms {
            Phase::MaxCalibrate {
                since: now,
                window: Window::new(reading),
                rest,
            }
        } else {
            Phase::MaxWait {
                since,
                reference,
                rest,
            }
        }
    }

    fn max_calibrate(
        &mut self,
        since: u32,
        mut window: Window,
        rest: Window,
        reading: Reading,
        now: u32,
    ) -> Phase {
        window.push(reading);

        if now.wrapping_sub(since) < self.config.calibrate_ms {
            return Phase::MaxCalibrate {
                since,
                window,
                rest,
            };
        }

        self.display_calibrated_values(false, &window);
        self.result = self.evaluate(&rest, &window);
        self.log_result();
        Phase::DoNothing
    }

    fn evaluate(&self, rest: &Window, pressed: &Window) -> CalibrationResult {
        let tolerance = self.config.tolerance();
        let channels = if self.both { 2 } else { 1 };

        let mut result = CalibrationResult {
            potentiometer_count: channels as u8,
            consistent: true,
            ..CalibrationResult::default()
        };

        for ch in 0..channels {
            let calibration = ChannelCalibration {
                min: rest.min[ch].min(pressed.min[ch]),
                max: rest.max[ch].max(pressed.max[ch]),
                high_low: pressed.mean(ch) < rest.mean(ch),
            };

            let steady = rest.spread(ch) <= tolerance && pressed.spread(ch) <= tolerance;
            let moved = diff(pressed.mean(ch), rest.mean(ch)) > tolerance;
            if !(steady && moved) {
                warn!(
                    "throttle detector: throttle{} readings inconsistent (rest spread {}, pressed spread {}, travel {})",
                    ch + 1,
                    rest.spread(ch),
                    pressed.spread(ch),
                    diff(pressed.mean(ch), rest.mean(ch))
                );
                result.consistent = false;
            }

            if ch == 0 {
                result.throttle1 = calibration;
            } else {
                result.throttle2 = calibration;
            }
        }

        if self.both {
            result.throttle2_inverse = result.throttle1.high_low != result.throttle2.high_low;
        }

        result
    }

    fn display_calibrated_values(&self, min_pedal: bool, window: &Window) {
        let position = if min_pedal { "released" } else { "pressed" };

        info!(
            "throttle detector: {} pedal, throttle1 {}-{} (avg {})",
            position,
            window.min[0],
            window.max[0],
            window.mean(0)
        );
        if self.both {
            info!(
                "throttle detector: {} pedal, throttle2 {}-{} (avg {})",
                position,
                window.min[1],
                window.max[1],
                window.mean(1)
            );
        }
    }

    fn log_result(&self) {
        let r = &self.result;

        info!(
            "throttle detector: done, {} potentiometer(s), throttle1 {}-{} high-low {}",
            r.potentiometer_count, r.throttle1.min, r.throttle1.max, r.throttle1.high_low
        );
        if r.potentiometer_count == 2 {
            info!(
                "throttle detector: throttle2 {}-{} high-low {} inverse {}",
                r.throttle2.min, r.throttle2.max, r.throttle2.high_low, r.throttle2_inverse
            );
        }
        if !r.consistent {
            warn!("throttle detector: calibration inconsistent, run it again");
        }
    }

    fn enter_min_wait(&mut self) {
        let reading = self.read();
        self.phase = Phase::MinWait {
            since: self.clock.ms(),
            reference: reading,
        };
        info!("throttle detector: release the pedal and keep it still");
    }

    fn deviates(&self, a: Reading, b: Reading) -> bool {
        let tolerance = self.config.tolerance();
        diff(a.0[0], b.0[0]) > tolerance || (self.both && diff(a.0[1], b.0[1]) > tolerance)
    }

    fn read(&mut self) -> Reading {
        let first = self.throttle.read(Channel::First);
        let second = if self.both {
            self.throttle.read(Channel::Second)
        } else {
            0
        };
        Reading([first, second])
    }

    // A grounded input means nothing is wired to it
    fn throttle2_provided(&mut self) -> bool {
        self.throttle.read(Channel::Second) > self.config.grounded_threshold
    }

    /// Current phase
    pub fn state(&self) -> DetectionState {
        match (self.phase, self.both) {
            (Phase::DoNothing, _) => DetectionState::DoNothing,
            (Phase::MinWait { .. }, true) => DetectionState::DetectBothMinWait,
            (Phase::MinCalibrate { .. }, true) => DetectionState::DetectBothMinCalibrate,
            (Phase::MaxWait { .. }, true) => DetectionState::DetectBothMaxWait,
            (Phase::MaxCalibrate { .. }, true) => DetectionState::DetectBothMaxCalibrate,
            (Phase::MinWait { .. }, false) => DetectionState::DetectMinWait,
            (Phase::MinCalibrate { .. }, false) => DetectionState::DetectMinCalibrate,
            (Phase::MaxWait { .. }, false) => DetectionState::DetectMaxWait,
            (Phase::MaxCalibrate { .. }, false) => DetectionState::DetectMaxCalibrate,
        }
    }

    /// Latest completed calibration
    pub fn result(&self) -> &CalibrationResult {
        &self.result
    }

    /// Number of potentiometers found by the last run
    pub fn potentiometer_count(&self) -> u8 {
        self.result.potentiometer_count
    }

    /// First potentiometer reads high to low
    pub fn is_throttle1_high_low(&self) -> bool {
        self.result.throttle1.high_low
    }

    /// Second potentiometer reads high to low
    pub fn is_throttle2_high_low(&self) -> bool {
        self.result.throttle2.high_low
    }

    /// Second potentiometer moves against the first
    pub fn is_throttle2_inverse(&self) -> bool {
        self.result.throttle2_inverse
    }

    /// Lowest reading of the first potentiometer
    pub fn throttle1_min(&self) -> u16 {
        self.result.throttle1.min
    }

    /// Highest reading of the first potentiometer
    pub fn throttle1_max(&self) -> u16 {
        self.result.throttle1.max
    }

    /// Lowest reading of the second potentiometer
    pub fn throttle2_min(&self) -> u16 {
        self.result.throttle2.min
    }

    /// Highest reading of the second potentiometer
    pub fn throttle2_max(&self) -> u16 {
        self.result.throttle2.max
    }
}

fn diff(a: u16, b: u16) -> u16 {
    if a > b {
        a - b
    } else {
        b - a
    }
}

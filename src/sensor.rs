// Electrometer - LoRa telemetry protocol stack
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Calibrated sensor sources
//!
//! Every sensor is polled through [`SensorSource`]. Which calibration runs
//! behind it is decided when the source is constructed:
//!
//! - [`FixedVoltage`]: constant mains voltage, no hardware read
//! - [`LinearCurrent`]: `intercept + slope * sigma` over a sliding window of
//!   raw ADC samples
//! - [`RmsCurrent`]: energy-monitor RMS over a burst of ADC samples with
//!   DC offset tracking
//!
//! Raw pin reads are an external concern behind [`AnalogInput`].

use std::collections::VecDeque;
use std::time::Duration;

/// Raw analog-to-digital pin read
pub trait AnalogInput {
    /// Read one raw ADC sample
    fn read(&mut self) -> u16;
}

impl<A: AnalogInput + ?Sized> AnalogInput for Box<A> {
    fn read(&mut self) -> u16 {
        (**self).read()
    }
}

/// A sensor that yields one calibrated reading per poll
pub trait SensorSource {
    /// Take one calibrated reading
    fn calibrated_value(&mut self) -> f64;
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    fn calibrated_value(&mut self) -> f64 {
        (**self).calibrated_value()
    }
}

impl<S: SensorSource + ?Sized> SensorSource for &mut S {
    fn calibrated_value(&mut self) -> f64 {
        (**self).calibrated_value()
    }
}

/// Default mains voltage reported by [`FixedVoltage`]
pub const DEFAULT_MAINS_VOLTAGE: f64 = 230.0;

/// Voltage source that reports a constant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedVoltage {
    volts: f64,
}

impl FixedVoltage {
    /// Create a source reporting `volts`
    pub fn new(volts: f64) -> Self {
        Self { volts }
    }
}

impl Default for FixedVoltage {
    fn default() -> Self {
        Self::new(DEFAULT_MAINS_VOLTAGE)
    }
}

impl SensorSource for FixedVoltage {
    fn calibrated_value(&mut self) -> f64 {
        self.volts
    }
}

/// Sliding-window mean and standard deviation of raw samples
#[derive(Debug, Clone)]
pub struct RunningStatistics {
    window: VecDeque<f64>,
    capacity: usize,
}

impl RunningStatistics {
    /// Create statistics over the last `capacity` samples (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a sample, evicting the oldest when full
    pub fn input(&mut self, value: f64) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(value);
    }

    /// Mean of the window, 0 when empty
    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    /// Population standard deviation of the window, 0 when empty
    pub fn sigma(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .window
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
            / self.window.len() as f64;
        variance.sqrt()
    }

    /// Number of samples currently held
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Check if no samples are held
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

/// Calibration for [`LinearCurrent`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearCalibration {
    /// Amps per unit of raw standard deviation
    pub slope: f64,
    /// Offset in amps
    pub intercept: f64,
    /// Mains frequency; the statistics window spans 40 cycles
    pub line_frequency_hz: f64,
}

impl Default for LinearCalibration {
    fn default() -> Self {
        Self {
            slope: 0.0052,
            intercept: 0.0,
            line_frequency_hz: 50.0,
        }
    }
}

impl LinearCalibration {
    /// Length of the statistics window in seconds
    pub fn window(&self) -> Duration {
        Duration::from_secs_f64(40.0 / self.line_frequency_hz)
    }

    /// Statistics window expressed in samples taken every `interval`
    pub fn window_samples(&self, interval: Duration) -> usize {
        if interval.is_zero() {
            return 1;
        }
        (self.window().as_secs_f64() / interval.as_secs_f64())
            .round()
            .max(1.0) as usize
    }
}

/// Current source calibrated linearly against the spread of raw samples
#[derive(Debug)]
pub struct LinearCurrent<A> {
    input: A,
    stats: RunningStatistics,
    calibration: LinearCalibration,
}

impl<A: AnalogInput> LinearCurrent<A> {
    /// Create a source polled every `sample_interval`
    pub fn new(input: A, calibration: LinearCalibration, sample_interval: Duration) -> Self {
        Self {
            input,
            stats: RunningStatistics::new(calibration.window_samples(sample_interval)),
            calibration,
        }
    }

    /// Current calibration
    pub fn calibration(&self) -> &LinearCalibration {
        &self.calibration
    }
}

impl<A: AnalogInput> SensorSource for LinearCurrent<A> {
    fn calibrated_value(&mut self) -> f64 {
        let raw = self.input.read();
        self.stats.input(f64::from(raw));
        let amps = self.calibration.intercept + self.calibration.slope * self.stats.sigma();
        log::trace!("raw={} current={:.3}A", raw, amps);
        amps
    }
}

/// Calibration for [`RmsCurrent`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RmsCalibration {
    /// Current transformer calibration constant
    pub ical: f64,
    /// ADC supply voltage in millivolts
    pub supply_millivolts: f64,
    /// ADC resolution in counts
    pub adc_counts: u32,
    /// Samples per reading
    pub samples: usize,
}

impl Default for RmsCalibration {
    fn default() -> Self {
        Self {
            ical: 111.1,
            supply_millivolts: 3300.0,
            adc_counts: 4096,
            samples: 1480,
        }
    }
}

impl RmsCalibration {
    /// Amps per filtered ADC count
    pub fn ratio(&self) -> f64 {
        self.ical * (self.supply_millivolts / 1000.0) / f64::from(self.adc_counts)
    }
}

/// Energy-monitor RMS current source
///
/// Each reading takes a burst of samples, tracks the DC bias with a slow
/// low-pass filter and returns the RMS of the remaining AC component.
#[derive(Debug)]
pub struct RmsCurrent<A> {
    input: A,
    calibration: RmsCalibration,
    offset: f64,
}

impl<A: AnalogInput> RmsCurrent<A> {
    /// Create a source with the bias estimate at mid-scale
    pub fn new(input: A, calibration: RmsCalibration) -> Self {
        Self {
            input,
            offset: f64::from(calibration.adc_counts >> 1),
            calibration,
        }
    }

    /// Current DC bias estimate in ADC counts
    pub fn offset(&self) -> f64 {
        self.offset
    }
}

impl<A: AnalogInput> SensorSource for RmsCurrent<A> {
    fn calibrated_value(&mut self) -> f64 {
        let samples = self.calibration.samples.max(1);
        let mut sum_sq = 0.0;
        for _ in 0..samples {
            let sample = f64::from(self.input.read());
            self.offset += (sample - self.offset) / 1024.0;
            let filtered = sample - self.offset;
            sum_sq += filtered * filtered;
        }
        let irms = self.calibration.ratio() * (sum_sq / samples as f64).sqrt();
        log::trace!("irms={:.3}A offset={:.1}", irms, self.offset);
        irms
    }
}

/// Replays a fixed sequence of readings, repeating the last one
#[derive(Debug, Clone)]
pub struct SequenceSource {
    values: Vec<f64>,
    position: usize,
}

impl SequenceSource {
    /// Create a source from `values`; an empty list reads as 0
    pub fn new(values: impl Into<Vec<f64>>) -> Self {
        Self {
            values: values.into(),
            position: 0,
        }
    }

    /// Number of readings taken so far
    pub fn reads(&self) -> usize {
        self.position
    }
}

impl SensorSource for SequenceSource {
    fn calibrated_value(&mut self) -> f64 {
        let value = self
            .values
            .get(self.position)
            .or_else(|| self.values.last())
            .copied()
            .unwrap_or(0.0);
        self.position += 1;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Square {
        mid: u16,
        amplitude: u16,
        high: bool,
    }

    impl AnalogInput for Square {
        fn read(&mut self) -> u16 {
            self.high = !self.high;
            if self.high {
                self.mid + self.amplitude
            } else {
                self.mid - self.amplitude
            }
        }
    }

    struct Constant(u16);

    impl AnalogInput for Constant {
        fn read(&mut self) -> u16 {
            self.0
        }
    }

    #[test]
    fn test_fixed_voltage() {
        let mut source = FixedVoltage::default();
        assert_eq!(source.calibrated_value(), 230.0);
        let mut source = FixedVoltage::new(240.0);
        assert_eq!(source.calibrated_value(), 240.0);
    }

    #[test]
    fn test_running_statistics() {
        let mut stats = RunningStatistics::new(4);
        assert_eq!(stats.sigma(), 0.0);
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.input(v);
        }
        // Only the last four samples remain: 5, 5, 7, 9
        assert_eq!(stats.len(), 4);
        assert_relative_eq!(stats.mean(), 6.5);
        assert_relative_eq!(stats.sigma(), 2.75f64.sqrt());
    }

    #[test]
    fn test_linear_window_samples() {
        let calibration = LinearCalibration::default();
        assert_relative_eq!(calibration.window().as_secs_f64(), 0.8);
        assert_eq!(calibration.window_samples(Duration::from_millis(200)), 4);
        assert_eq!(calibration.window_samples(Duration::from_secs(5)), 1);
    }

    #[test]
    fn test_linear_current_constant_input_is_intercept() {
        let calibration = LinearCalibration {
            intercept: 0.1,
            ..Default::default()
        };
        let mut source = LinearCurrent::new(Constant(2000), calibration, Duration::from_millis(200));
        for _ in 0..5 {
            assert_relative_eq!(source.calibrated_value(), 0.1);
        }
    }

    #[test]
    fn test_linear_current_scales_spread() {
        let input = Square {
            mid: 2000,
            amplitude: 100,
            high: false,
        };
        let mut source =
            LinearCurrent::new(input, LinearCalibration::default(), Duration::from_millis(200));
        let mut value = 0.0;
        for _ in 0..4 {
            value = source.calibrated_value();
        }
        assert_relative_eq!(value, 0.0052 * 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rms_current_zero_at_bias() {
        let mut source = RmsCurrent::new(Constant(2048), RmsCalibration::default());
        assert_relative_eq!(source.calibrated_value(), 0.0);
    }

    #[test]
    fn test_rms_current_square_wave() {
        let input = Square {
            mid: 2048,
            amplitude: 100,
            high: false,
        };
        let calibration = RmsCalibration::default();
        let mut source = RmsCurrent::new(input, calibration);
        let irms = source.calibrated_value();
        assert_relative_eq!(irms, 100.0 * calibration.ratio(), epsilon = 0.05);
    }

    #[test]
    fn test_sequence_source_repeats_last() {
        let mut source = SequenceSource::new(vec![1.0, 2.0]);
        assert_eq!(source.calibrated_value(), 1.0);
        assert_eq!(source.calibrated_value(), 2.0);
        assert_eq!(source.calibrated_value(), 2.0);
        assert_eq!(source.reads(), 3);

        let mut empty = SequenceSource::new(Vec::new());
        assert_eq!(empty.calibrated_value(), 0.0);
    }
}

//! Simulated current clamp
//!
//! Produces raw 12-bit ADC readings of a mains-frequency sine centred on the
//! ADC midpoint, with Gaussian noise. Readings are taken at an arbitrary
//! phase of the waveform, which is what a slow sampler sees of a 50 Hz
//! signal.

use anyhow::{Context, Result};
use electrometer::{AnalogInput, LinearCalibration};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use std::f64::consts::{PI, SQRT_2};

/// Full scale of the 12-bit ADC
pub const ADC_MAX: u16 = 4095;

/// Simulated analog input of a current clamp
#[derive(Debug)]
pub struct SimulatedClamp {
    rng: StdRng,
    midpoint: f64,
    amplitude: f64,
    noise: Normal<f64>,
}

impl SimulatedClamp {
    /// Clamp whose linear calibration reads back `amps`
    ///
    /// The standard deviation of `A sin(phase)` over a uniform phase is
    /// `A / sqrt(2)`, so the amplitude is chosen to make
    /// `slope * sigma == amps`.
    pub fn for_current(
        amps: f64,
        calibration: &LinearCalibration,
        noise_counts: f64,
        seed: Option<u64>,
    ) -> Result<Self> {
        if calibration.slope <= 0.0 {
            anyhow::bail!("calibration slope must be positive");
        }
        let sigma = (amps - calibration.intercept).max(0.0) / calibration.slope;
        let noise = Normal::new(0.0, noise_counts.max(0.0))
            .with_context(|| format!("invalid noise level: {}", noise_counts))?;
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            rng,
            midpoint: f64::from(ADC_MAX + 1) / 2.0,
            amplitude: sigma * SQRT_2,
            noise,
        })
    }
}

impl AnalogInput for SimulatedClamp {
    fn read(&mut self) -> u16 {
        let phase = self.rng.gen_range(0.0..2.0 * PI);
        let value =
            self.midpoint + self.amplitude * phase.sin() + self.noise.sample(&mut self.rng);
        let raw = value.round().clamp(0.0, f64::from(ADC_MAX)) as u16;
        tracing::trace!("adc raw={}", raw);
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use electrometer::{LinearCurrent, SensorSource};
    use std::time::Duration;

    #[test]
    fn test_readings_stay_in_range() {
        let calibration = LinearCalibration::default();
        let mut clamp = SimulatedClamp::for_current(100.0, &calibration, 50.0, Some(7)).unwrap();
        for _ in 0..1000 {
            assert!(clamp.read() <= ADC_MAX);
        }
    }

    #[test]
    fn test_calibrated_current_tracks_target() {
        let calibration = LinearCalibration::default();
        let clamp = SimulatedClamp::for_current(1.5, &calibration, 0.0, Some(42)).unwrap();
        let mut source = LinearCurrent::new(clamp, calibration, Duration::from_millis(1));

        let mut last = 0.0;
        for _ in 0..4000 {
            last = source.calibrated_value();
        }
        assert!((last - 1.5).abs() < 0.3, "current {last}");
    }

    #[test]
    fn test_seeded_clamp_is_deterministic() {
        let calibration = LinearCalibration::default();
        let mut a = SimulatedClamp::for_current(0.5, &calibration, 5.0, Some(1)).unwrap();
        let mut b = SimulatedClamp::for_current(0.5, &calibration, 5.0, Some(1)).unwrap();
        let ra: Vec<u16> = (0..32).map(|_| a.read()).collect();
        let rb: Vec<u16> = (0..32).map(|_| b.read()).collect();
        assert_eq!(ra, rb);
    }

    #[test]
    fn test_rejects_bad_calibration() {
        let calibration = LinearCalibration {
            slope: 0.0,
            ..Default::default()
        };
        assert!(SimulatedClamp::for_current(1.0, &calibration, 0.0, None).is_err());
    }
}

// Electrometer - LoRa telemetry protocol stack
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Windowed sensor aggregation
//!
//! The [`WindowAggregator`] polls a set of sensor sources on a fixed cadence
//! for a fixed real-time window and reduces each quantity to its mean.
//!
//! ```text
//!            tick: read all sources, sleep(sample_interval)
//!           ┌──────┐
//!           ▼      │
//! begin ─► Sampling ─┘ ── elapsed >= duration ──► Done ─► means()
//! ```
//!
//! All quantities share one clock and one cadence, so every mean in a window
//! is computed over the same number of samples.

use crate::clock::Clock;
use crate::error::{AggregationError, Result};
use crate::sensor::SensorSource;
use std::time::Duration;

/// Default window duration
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Default delay between two samples
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

/// Window timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Total sampling time per window
    pub duration: Duration,
    /// Delay between consecutive samples
    pub sample_interval: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_WINDOW,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }
}

impl WindowConfig {
    /// Create a window configuration
    pub fn new(duration: Duration, sample_interval: Duration) -> Self {
        Self {
            duration,
            sample_interval,
        }
    }

    /// Samples a full window will take, assuming reads are instantaneous
    pub fn expected_samples(&self) -> u32 {
        if self.sample_interval.is_zero() {
            return 0;
        }
        let interval = self.sample_interval.as_nanos();
        let n = (self.duration.as_nanos() + interval - 1) / interval;
        n.min(u32::MAX as u128) as u32
    }

    /// Reject a zero sample interval, which would spin without sleeping
    pub fn validate(&self) -> Result<()> {
        if self.sample_interval.is_zero() {
            return Err(AggregationError::InvalidWindow(
                "sample_interval must be greater than zero".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

/// Aggregator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// Window open, samples are being taken
    Sampling,
    /// Window elapsed, means are available
    Done,
}

/// Running sum of one quantity
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accumulator {
    running_sum: f64,
    sample_count: u32,
}

impl Accumulator {
    /// Add one sample
    pub fn add(&mut self, value: f64) {
        self.running_sum += value;
        self.sample_count += 1;
    }

    /// Number of samples taken
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Mean of the samples
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::EmptyAggregation`] if no sample was taken.
    pub fn mean(&self) -> Result<f64> {
        if self.sample_count == 0 {
            return Err(AggregationError::EmptyAggregation.into());
        }
        Ok(self.running_sum / f64::from(self.sample_count))
    }
}

/// Result of one completed window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSummary {
    /// One mean per source, in source order
    pub means: Vec<f64>,
    /// Samples taken per source
    pub sample_count: u32,
    /// Real time the window lasted
    pub elapsed: Duration,
}

/// Time-windowed mean of several sensor quantities
#[derive(Debug, Clone)]
pub struct WindowAggregator {
    config: WindowConfig,
    accumulators: Vec<Accumulator>,
    started_at: Option<Duration>,
    state: WindowState,
}

impl WindowAggregator {
    /// Create an aggregator tracking `quantities` values per tick
    pub fn new(config: WindowConfig, quantities: usize) -> Self {
        Self {
            config,
            accumulators: vec![Accumulator::default(); quantities],
            started_at: None,
            state: WindowState::Sampling,
        }
    }

    /// Window configuration
    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Current state
    pub fn state(&self) -> WindowState {
        self.state
    }

    /// Open a fresh window at `now`, discarding previous samples
    pub fn begin(&mut self, now: Duration) {
        self.accumulators
            .iter_mut()
            .for_each(|acc| *acc = Accumulator::default());
        self.started_at = Some(now);
        self.state = WindowState::Sampling;
    }

    /// Check the clock and close the window once `duration` has elapsed
    pub fn poll(&mut self, now: Duration) -> WindowState {
        if self.state == WindowState::Sampling {
            let start = *self.started_at.get_or_insert(now);
            if now.saturating_sub(start) >= self.config.duration {
                self.state = WindowState::Done;
            }
        }
        self.state
    }

    /// Record one tick; `values` is matched to quantities by position
    pub fn record(&mut self, values: &[f64]) {
        debug_assert_eq!(values.len(), self.accumulators.len());
        for (acc, value) in self.accumulators.iter_mut().zip(values) {
            acc.add(*value);
        }
    }

    /// Samples taken in the current window
    pub fn sample_count(&self) -> u32 {
        self.accumulators
            .first()
            .map(Accumulator::sample_count)
            .unwrap_or(0)
    }

    /// Mean of every quantity
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::EmptyAggregation`] if the window holds no
    /// samples.
    pub fn means(&self) -> Result<Vec<f64>> {
        if self.accumulators.is_empty() || self.sample_count() == 0 {
            return Err(AggregationError::EmptyAggregation.into());
        }
        self.accumulators.iter().map(Accumulator::mean).collect()
    }

    /// Run one full window, blocking on `clock` between samples
    ///
    /// Sources are read in order on every tick. The window is checked before
    /// each tick, so a zero-length window yields
    /// [`AggregationError::EmptyAggregation`].
    pub fn run<C, S>(&mut self, clock: &mut C, sources: &mut [S]) -> Result<WindowSummary>
    where
        C: Clock + ?Sized,
        S: SensorSource,
    {
        self.config.validate()?;
        if sources.len() != self.accumulators.len() {
            self.accumulators = vec![Accumulator::default(); sources.len()];
        }

        let start = clock.now();
        self.begin(start);
        let mut values = vec![0.0; sources.len()];

        while self.poll(clock.now()) == WindowState::Sampling {
            for (slot, source) in values.iter_mut().zip(sources.iter_mut()) {
                *slot = source.calibrated_value();
            }
            self.record(&values);
            clock.sleep(self.config.sample_interval);
        }

        let summary = WindowSummary {
            means: self.means()?,
            sample_count: self.sample_count(),
            elapsed: clock.now().saturating_sub(start),
        };
        log::debug!(
            "window closed: {} samples in {:?}, means {:?}",
            summary.sample_count,
            summary.elapsed,
            summary.means
        );
        Ok(summary)
    }
}

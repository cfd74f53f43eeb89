// Electrometer Station - Node and gateway control loops
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Metering node control loop
//!
//! One [`NodeSession::operate`] call is one transmission:
//!
//! ```text
//! current ─┐
//!          ├─► WindowAggregator ─► {deviceID, current, voltage} ─► encrypt ─► radio
//! voltage ─┘      (5 s window)
//! ```
//!
//! # Example
//!
//! ```rust
//! use electrometer::sensor::SequenceSource;
//! use electrometer::{FixedVoltage, ManualClock, MemoryRadio};
//! use electrometer_station::{NodeConfig, NodeSession};
//!
//! let config = NodeConfig::with_device_id("X1").with_key("K");
//! let mut node = NodeSession::new(
//!     config,
//!     MemoryRadio::new(),
//!     ManualClock::new(),
//!     SequenceSource::new(vec![0.5]),
//!     FixedVoltage::default(),
//! )
//! .unwrap();
//!
//! let cycle = node.operate().unwrap();
//! assert!(cycle.encrypted);
//! assert_eq!(cycle.envelope.get("deviceID"), Some("X1"));
//! ```

use crate::config::NodeConfig;
use crate::error::Result;
use electrometer::record::KeyValueRecord;
use electrometer::{
    CipherService, Clock, RadioTransport, SensorSource, TelemetryEnvelope, WindowAggregator,
};

/// Outcome of one node cycle
#[derive(Debug, Clone, PartialEq)]
pub struct NodeCycle {
    /// Envelope built from the window means
    pub envelope: TelemetryEnvelope,
    /// Bytes handed to the radio
    pub payload_len: usize,
    /// Whether the payload was encrypted
    pub encrypted: bool,
    /// Samples per quantity in the window
    pub samples: u32,
    /// Window mean current in amps, before rounding
    pub current: f64,
    /// Window mean voltage in volts, before rounding
    pub voltage: f64,
}

impl NodeCycle {
    /// Apparent power in watts
    pub fn power(&self) -> f64 {
        self.current * self.voltage
    }
}

/// Node counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Cycles attempted
    pub cycles: u64,
    /// Packets sent encrypted
    pub sent_encrypted: u64,
    /// Packets sent in the clear
    pub sent_plaintext: u64,
    /// Cycles that ended in an error
    pub failures: u64,
}

/// Node role: sample, aggregate, encrypt, transmit
pub struct NodeSession<R, C, I, V> {
    config: NodeConfig,
    radio: R,
    clock: C,
    current: I,
    voltage: V,
    cipher: CipherService,
    aggregator: WindowAggregator,
    stats: NodeStats,
}

impl<R, C, I, V> NodeSession<R, C, I, V>
where
    R: RadioTransport,
    C: Clock,
    I: SensorSource,
    V: SensorSource,
{
    /// Create a session; the configuration is validated first
    pub fn new(config: NodeConfig, radio: R, clock: C, current: I, voltage: V) -> Result<Self> {
        config.validate()?;

        let cipher = match &config.encryption_key {
            Some(key) => CipherService::with_key(config.cipher_mode, key),
            None => CipherService::new(config.cipher_mode),
        };
        if !cipher.is_ready() {
            log::warn!("no encryption key configured, node will transmit plaintext");
        }
        log::info!(
            "node {} on {} ({} Hz), window {:?}",
            config.device_id,
            config.band,
            config.band.frequency_hz(),
            config.window.duration
        );

        Ok(Self {
            aggregator: WindowAggregator::new(config.window, 2),
            config,
            radio,
            clock,
            current,
            voltage,
            cipher,
            stats: NodeStats::default(),
        })
    }

    /// Run one full cycle
    ///
    /// # Errors
    ///
    /// Returns the aggregation, cipher or radio error of this cycle. The
    /// session stays usable.
    pub fn operate(&mut self) -> Result<NodeCycle> {
        self.stats.cycles += 1;
        let result = self.cycle();
        match &result {
            Ok(cycle) if cycle.encrypted => self.stats.sent_encrypted += 1,
            Ok(_) => self.stats.sent_plaintext += 1,
            Err(_) => self.stats.failures += 1,
        }
        result
    }

    fn cycle(&mut self) -> Result<NodeCycle> {
        let summary = {
            let mut sources: [&mut dyn SensorSource; 2] = [&mut self.current, &mut self.voltage];
            self.aggregator.run(&mut self.clock, &mut sources)?
        };

        let (current, voltage) = (summary.means[0], summary.means[1]);
        log::debug!("power: {:.1} W", current * voltage);
        let envelope = self.build_envelope(current, voltage)?;
        let wire = envelope.serialize();

        let (payload, encrypted) = if self.cipher.is_ready() {
            (self.cipher.encrypt(wire.as_bytes())?, true)
        } else {
            log::warn!("sending plaintext payload");
            (wire.into_bytes(), false)
        };

        self.radio.send(&payload)?;
        log::info!(
            "sent {} bytes ({}): {}",
            payload.len(),
            if encrypted { "encrypted" } else { "plaintext" },
            envelope
        );

        Ok(NodeCycle {
            envelope,
            payload_len: payload.len(),
            encrypted,
            samples: summary.sample_count,
            current,
            voltage,
        })
    }

    fn build_envelope(&self, current: f64, voltage: f64) -> Result<TelemetryEnvelope> {
        let mut envelope = TelemetryEnvelope::new();
        envelope.push(KeyValueRecord::new("deviceID", self.config.device_id.as_str())?);
        envelope.push(KeyValueRecord::number(
            "current",
            current,
            self.config.current_precision,
        )?);
        envelope.push(KeyValueRecord::number(
            "voltage",
            voltage,
            self.config.voltage_precision,
        )?);
        Ok(envelope)
    }

    /// Run `cycles` cycles, logging failures and carrying on
    pub fn run(&mut self, cycles: u64) -> &NodeStats {
        for _ in 0..cycles {
            if let Err(e) = self.operate() {
                log::error!("node cycle failed: {}", e);
            }
        }
        &self.stats
    }

    /// Cycle until the process is stopped
    pub fn run_forever(&mut self) -> ! {
        loop {
            if let Err(e) = self.operate() {
                log::error!("node cycle failed: {}", e);
            }
        }
    }

    /// Session configuration
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Counters so far
    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    /// Whether payloads are encrypted
    pub fn is_encrypting(&self) -> bool {
        self.cipher.is_ready()
    }

    /// Radio handle
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Mutable radio handle
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Clock handle
    pub fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use electrometer::sensor::SequenceSource;
    use electrometer::{
        CipherMode, ErrorKind, FixedVoltage, ManualClock, MemoryRadio, WindowConfig,
    };
    use std::time::Duration;

    fn session(
        config: NodeConfig,
        currents: Vec<f64>,
    ) -> NodeSession<MemoryRadio, ManualClock, SequenceSource, FixedVoltage> {
        NodeSession::new(
            config,
            MemoryRadio::new(),
            ManualClock::new(),
            SequenceSource::new(currents),
            FixedVoltage::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_record_order_and_format() {
        let mut node = session(NodeConfig::with_device_id("X1"), vec![0.482]);
        let cycle = node.operate().unwrap();

        assert!(!cycle.encrypted);
        assert_eq!(cycle.samples, 25);
        assert_eq!(
            cycle.envelope.serialize(),
            "deviceID=X1&current=0.482&voltage=230.00"
        );
        let sent = node.radio_mut().pop_outgoing().unwrap();
        assert_eq!(sent, b"deviceID=X1&current=0.482&voltage=230.00");
        assert_eq!(node.stats().sent_plaintext, 1);
    }

    #[test]
    fn test_window_mean_is_sent() {
        let config = NodeConfig::with_device_id("X1").with_window(WindowConfig::new(
            Duration::from_millis(600),
            Duration::from_millis(200),
        ));
        let mut node = session(config, vec![1.0, 2.0, 3.0]);
        let cycle = node.operate().unwrap();

        assert_eq!(cycle.samples, 3);
        let current = cycle.envelope.records()[1].as_f64().unwrap();
        assert_relative_eq!(current, 2.0);
        assert_eq!(node.clock().now(), Duration::from_millis(600));
    }

    #[test]
    fn test_cycle_reports_power() {
        let mut node = session(NodeConfig::with_device_id("X1"), vec![0.5]);
        let cycle = node.operate().unwrap();

        assert_relative_eq!(cycle.current, 0.5);
        assert_relative_eq!(cycle.voltage, 230.0);
        assert_relative_eq!(cycle.power(), 115.0);
    }

    #[test]
    fn test_encrypted_payload_decrypts() {
        let config = NodeConfig::with_device_id("X1").with_key("K");
        let mut node = session(config, vec![1.0]);
        assert!(node.is_encrypting());

        let cycle = node.operate().unwrap();
        assert!(cycle.encrypted);

        let payload = node.radio_mut().pop_outgoing().unwrap();
        assert_eq!(payload.len(), cycle.payload_len);
        assert_ne!(payload, cycle.envelope.serialize().into_bytes());

        let cipher = CipherService::with_key(CipherMode::Ctr, "K");
        let plaintext = cipher.decrypt(&payload).unwrap();
        assert_eq!(
            TelemetryEnvelope::parse_bytes(&plaintext).unwrap(),
            cycle.envelope
        );
    }

    #[test]
    fn test_radio_failure_then_recovery() {
        let mut node = session(NodeConfig::with_device_id("X1"), vec![1.0]);
        let mut radio = MemoryRadio::new();
        radio.close();
        let mut node_down = NodeSession::new(
            NodeConfig::with_device_id("X1"),
            radio,
            ManualClock::new(),
            SequenceSource::new(vec![1.0]),
            FixedVoltage::default(),
        )
        .unwrap();

        let err = node_down.operate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportUnavailable);
        let stats = node_down.run(2);
        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.failures, 3);

        let stats = node.run(2);
        assert_eq!(stats.sent_plaintext, 2);
        assert_eq!(node.radio().pending_outgoing(), 2);
    }

    #[test]
    fn test_zero_window_is_reported() {
        let config = NodeConfig::with_device_id("X1").with_window(WindowConfig::new(
            Duration::ZERO,
            Duration::from_millis(200),
        ));
        let mut node = session(config, vec![1.0]);
        let err = node.operate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyAggregation);
        assert_eq!(node.radio().pending_outgoing(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = NodeSession::new(
            NodeConfig::with_device_id(""),
            MemoryRadio::new(),
            ManualClock::new(),
            SequenceSource::new(vec![1.0]),
            FixedVoltage::default(),
        );
        assert!(result.is_err());
    }
}

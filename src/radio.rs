// Electrometer - LoRa telemetry protocol stack
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Radio transport abstraction
//!
//! The LoRa chip driver lives outside this crate. Sessions talk to it through
//! [`RadioTransport`]; in-memory implementations here stand in for it in
//! tests and simulations.

use crate::error::{Result, TelemetryError, TransportError};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Largest payload carried by one LoRa packet
pub const MAX_RADIO_PAYLOAD: usize = 255;

/// Regional LoRa frequency plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoraBand {
    /// 433 MHz
    #[default]
    Asia,
    /// 868 MHz
    Europe,
    /// 915 MHz
    NorthAmerica,
}

impl LoraBand {
    /// Carrier frequency in Hz
    pub fn frequency_hz(&self) -> u64 {
        match self {
            LoraBand::Asia => 433_000_000,
            LoraBand::Europe => 868_000_000,
            LoraBand::NorthAmerica => 915_000_000,
        }
    }
}

impl fmt::Display for LoraBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoraBand::Asia => write!(f, "asia"),
            LoraBand::Europe => write!(f, "europe"),
            LoraBand::NorthAmerica => write!(f, "north-america"),
        }
    }
}

impl FromStr for LoraBand {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "asia" => Ok(LoraBand::Asia),
            "europe" => Ok(LoraBand::Europe),
            "north-america" | "northamerica" => Ok(LoraBand::NorthAmerica),
            other => Err(TelemetryError::Config(format!("unknown LoRa band: {other}"))),
        }
    }
}

/// Statistics about radio usage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RadioMetrics {
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Packets handed to the radio
    pub packets_sent: u64,
    /// Packets received
    pub packets_received: u64,
    /// Packets lost on air (simulated transports only)
    pub packets_lost: u64,
}

/// Packet radio link
pub trait RadioTransport {
    /// Transmit one packet
    fn send(&mut self, payload: &[u8]) -> Result<()>;

    /// Wait up to `timeout` for one packet; `None` if nothing arrived
    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Check if the radio is usable
    fn is_available(&self) -> bool;

    /// Usage statistics
    fn metrics(&self) -> RadioMetrics;
}

impl<R: RadioTransport + ?Sized> RadioTransport for Box<R> {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        (**self).send(payload)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        (**self).receive(timeout)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn metrics(&self) -> RadioMetrics {
        (**self).metrics()
    }
}

/// Reject payloads larger than one radio packet
pub fn check_payload_size(payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_RADIO_PAYLOAD {
        return Err(TransportError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_RADIO_PAYLOAD,
        }
        .into());
    }
    Ok(())
}

/// In-memory radio for tests and local simulation
#[derive(Debug)]
pub struct MemoryRadio {
    /// Outgoing packets
    tx_buffer: VecDeque<Vec<u8>>,
    /// Incoming packets
    rx_buffer: VecDeque<Vec<u8>>,
    /// Maximum queued packets per direction
    max_buffer_size: usize,
    /// Whether the radio is up
    is_open: bool,
    metrics: RadioMetrics,
}

impl MemoryRadio {
    /// Create a new memory radio
    pub fn new() -> Self {
        Self::with_buffer_size(64)
    }

    /// Create with custom queue size
    pub fn with_buffer_size(max_size: usize) -> Self {
        Self {
            tx_buffer: VecDeque::with_capacity(max_size),
            rx_buffer: VecDeque::with_capacity(max_size),
            max_buffer_size: max_size,
            is_open: true,
            metrics: RadioMetrics::default(),
        }
    }

    /// Queue a packet as if it had been received on air
    pub fn push_incoming(&mut self, payload: Vec<u8>) {
        self.rx_buffer.push_back(payload);
    }

    /// Take the oldest transmitted packet
    pub fn pop_outgoing(&mut self) -> Option<Vec<u8>> {
        self.tx_buffer.pop_front()
    }

    /// Number of transmitted packets not yet delivered
    pub fn pending_outgoing(&self) -> usize {
        self.tx_buffer.len()
    }

    /// Number of received packets not yet read
    pub fn pending_incoming(&self) -> usize {
        self.rx_buffer.len()
    }

    /// Deliver every transmitted packet to `other`
    pub fn transfer_to(&mut self, other: &mut MemoryRadio) {
        while let Some(packet) = self.tx_buffer.pop_front() {
            other.rx_buffer.push_back(packet);
        }
    }

    /// Take the radio down; later calls fail with `Unavailable`
    pub fn close(&mut self) {
        self.is_open = false;
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.is_open {
            return Err(TransportError::Unavailable {
                reason: "radio is closed".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl Default for MemoryRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioTransport for MemoryRadio {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;
        check_payload_size(payload)?;

        if self.tx_buffer.len() >= self.max_buffer_size {
            return Err(TransportError::BufferFull.into());
        }

        self.tx_buffer.push_back(payload.to_vec());
        self.metrics.bytes_sent += payload.len() as u64;
        self.metrics.packets_sent += 1;
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;

        let packet = self.rx_buffer.pop_front();
        if let Some(ref p) = packet {
            self.metrics.bytes_received += p.len() as u64;
            self.metrics.packets_received += 1;
        }
        Ok(packet)
    }

    fn is_available(&self) -> bool {
        self.is_open
    }

    fn metrics(&self) -> RadioMetrics {
        self.metrics.clone()
    }
}

/// A node radio and a gateway radio tuned to the same channel
#[derive(Debug, Default)]
pub struct RadioLink {
    /// Transmitting side
    pub node: MemoryRadio,
    /// Receiving side
    pub gateway: MemoryRadio,
}

impl RadioLink {
    /// Create a new link
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver everything the node sent to the gateway
    pub fn transfer(&mut self) {
        self.node.transfer_to(&mut self.gateway);
    }
}

/// Radio that drops a fraction of transmitted packets
#[derive(Debug)]
pub struct LossyRadio {
    inner: MemoryRadio,
    loss_rate: f32,
    rng_state: u64,
}

impl LossyRadio {
    /// Create a lossy radio with given loss rate (0.0-1.0)
    pub fn new(loss_rate: f32) -> Self {
        Self {
            inner: MemoryRadio::new(),
            loss_rate: loss_rate.clamp(0.0, 1.0),
            rng_state: 12345,
        }
    }

    /// Underlying memory radio
    pub fn inner_mut(&mut self) -> &mut MemoryRadio {
        &mut self.inner
    }

    /// Simple PRNG for deterministic testing
    fn next_random(&mut self) -> f32 {
        self.rng_state = self.rng_state.wrapping_mul(1103515245).wrapping_add(12345);
        ((self.rng_state >> 16) & 0x7fff) as f32 / 32767.0
    }
}

impl RadioTransport for LossyRadio {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        if self.next_random() < self.loss_rate {
            // Lost on air: the sender cannot tell
            self.inner.metrics.bytes_sent += payload.len() as u64;
            self.inner.metrics.packets_sent += 1;
            self.inner.metrics.packets_lost += 1;
            return Ok(());
        }
        self.inner.send(payload)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.inner.receive(timeout)
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    fn metrics(&self) -> RadioMetrics {
        self.inner.metrics()
    }
}

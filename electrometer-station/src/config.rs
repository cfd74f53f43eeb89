// Electrometer Station - Node and gateway control loops
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration types for node and gateway sessions

use crate::error::{Result, StationError};
use electrometer::cipher::BLOCK_SIZE;
use electrometer::radio::MAX_RADIO_PAYLOAD;
use electrometer::record::KeyValueRecord;
use electrometer::relay::{check_relay_safe, DEFAULT_RELAY_HOST, RELAY_PATH};
use electrometer::{CipherMode, LoraBand, WindowConfig};
use std::fmt;
use std::time::Duration;

/// Device identifier flashed on the reference node
pub const DEFAULT_DEVICE_ID: &str = "QB5ckYt0CS7Yc7swMKPu";

/// Analog pin of the current clamp
pub const DEFAULT_CURRENT_PIN: u8 = 36;

/// Analog pin of the voltage sensor
pub const DEFAULT_VOLTAGE_PIN: u8 = 37;

/// Widest reading accounted for when sizing the payload
const WIDEST_READING: f64 = -99_999_999.0;

fn redact(key: &Option<String>) -> &'static str {
    match key {
        Some(k) if !k.is_empty() => "<redacted>",
        _ => "<none>",
    }
}

/// Node-level configuration
#[derive(Clone, PartialEq)]
pub struct NodeConfig {
    /// Value of the `deviceID` record
    pub device_id: String,

    /// Analog pin of the current sensor
    pub current_pin: u8,

    /// Analog pin of the voltage sensor
    pub voltage_pin: u8,

    /// Pre-shared key; `None` sends plaintext
    pub encryption_key: Option<String>,

    /// Cipher mode, must match the gateway
    pub cipher_mode: CipherMode,

    /// Radio band
    pub band: LoraBand,

    /// Sampling window
    pub window: WindowConfig,

    /// Decimals of the `current` record
    pub current_precision: usize,

    /// Decimals of the `voltage` record
    pub voltage_precision: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID.to_string(),
            current_pin: DEFAULT_CURRENT_PIN,
            voltage_pin: DEFAULT_VOLTAGE_PIN,
            encryption_key: None,
            cipher_mode: CipherMode::default(),
            band: LoraBand::default(),
            window: WindowConfig::default(),
            current_precision: 3,
            voltage_precision: 2,
        }
    }
}

impl fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConfig")
            .field("device_id", &self.device_id)
            .field("current_pin", &self.current_pin)
            .field("voltage_pin", &self.voltage_pin)
            .field("encryption_key", &redact(&self.encryption_key))
            .field("cipher_mode", &self.cipher_mode)
            .field("band", &self.band)
            .field("window", &self.window)
            .field("current_precision", &self.current_precision)
            .field("voltage_precision", &self.voltage_precision)
            .finish()
    }
}

impl NodeConfig {
    /// Create a configuration for a given device
    pub fn with_device_id(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            ..Default::default()
        }
    }

    /// Set the pre-shared key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    /// Set the sampling window
    pub fn with_window(mut self, window: WindowConfig) -> Self {
        self.window = window;
        self
    }

    /// Largest payload one transmission can take on air, padding included
    pub fn max_payload_len(&self) -> usize {
        let reading = |key: &str, precision: usize| {
            key.len() + 1 + format!("{:.*}", precision, WIDEST_READING).len()
        };
        let plain = "deviceID".len()
            + 1
            + self.device_id.len()
            + 1
            + reading("current", self.current_precision)
            + 1
            + reading("voltage", self.voltage_precision);

        let keyed = self.encryption_key.as_deref().map_or(false, |k| !k.is_empty());
        if keyed && self.cipher_mode == CipherMode::Ecb {
            (plain + BLOCK_SIZE - 1) / BLOCK_SIZE * BLOCK_SIZE
        } else {
            plain
        }
    }

    /// Check the configuration before a session starts
    pub fn validate(&self) -> Result<()> {
        if self.device_id.is_empty() {
            return Err(StationError::InvalidConfig(
                "device_id must not be empty".to_string(),
            ));
        }
        KeyValueRecord::new("deviceID", self.device_id.as_str())?;
        check_relay_safe(&self.device_id)?;
        let payload_len = self.max_payload_len();
        if payload_len > MAX_RADIO_PAYLOAD {
            return Err(StationError::InvalidConfig(format!(
                "device_id of {} bytes gives payloads up to {} bytes, radio limit is {}",
                self.device_id.len(),
                payload_len,
                MAX_RADIO_PAYLOAD
            )));
        }
        if self.current_pin == self.voltage_pin {
            return Err(StationError::InvalidConfig(format!(
                "current and voltage sensors share pin {}",
                self.current_pin
            )));
        }
        self.window.validate()?;
        Ok(())
    }
}

/// Gateway-level configuration
#[derive(Clone, PartialEq)]
pub struct GatewayConfig {
    /// Backend host name
    pub relay_host: String,

    /// Backend path
    pub relay_path: String,

    /// Backend port
    pub relay_port: u16,

    /// Pre-shared key; `None` accepts plaintext
    pub encryption_key: Option<String>,

    /// Cipher mode, must match the nodes
    pub cipher_mode: CipherMode,

    /// Radio band
    pub band: LoraBand,

    /// How long one cycle waits for a packet
    pub receive_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            relay_host: DEFAULT_RELAY_HOST.to_string(),
            relay_path: RELAY_PATH.to_string(),
            relay_port: 443,
            encryption_key: None,
            cipher_mode: CipherMode::default(),
            band: LoraBand::default(),
            receive_timeout: Duration::from_secs(1),
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("relay_host", &self.relay_host)
            .field("relay_path", &self.relay_path)
            .field("relay_port", &self.relay_port)
            .field("encryption_key", &redact(&self.encryption_key))
            .field("cipher_mode", &self.cipher_mode)
            .field("band", &self.band)
            .field("receive_timeout", &self.receive_timeout)
            .finish()
    }
}

impl GatewayConfig {
    /// Create a configuration relaying to `host`
    pub fn with_relay_host(host: impl Into<String>) -> Self {
        Self {
            relay_host: host.into(),
            ..Default::default()
        }
    }

    /// Set the pre-shared key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    /// Check the configuration before a session starts
    pub fn validate(&self) -> Result<()> {
        if self.relay_host.is_empty() {
            return Err(StationError::InvalidConfig(
                "relay_host must not be empty".to_string(),
            ));
        }
        if !self.relay_path.starts_with('/') {
            return Err(StationError::InvalidConfig(format!(
                "relay_path must start with '/': {}",
                self.relay_path
            )));
        }
        if self.relay_port == 0 {
            return Err(StationError::InvalidConfig(
                "relay_port must not be 0".to_string(),
            ));
        }
        check_relay_safe(&self.relay_host)?;
        check_relay_safe(&self.relay_path)?;
        Ok(())
    }
}

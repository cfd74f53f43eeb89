//! Configuration file for the electrometer binary
//!
//! Loads `electrometer.toml` with an environment override for the key:
//!
//! ```toml
//! [radio]
//! band = "europe"
//! bind = "0.0.0.0:1700"
//! peer = "127.0.0.1:1701"
//! cipher_mode = "ctr"
//! encryption_key = "shared-secret"
//!
//! [node]
//! device_id = "QB5ckYt0CS7Yc7swMKPu"
//! window_ms = 5000
//! sample_interval_ms = 200
//!
//! [gateway]
//! relay_host = "electrometer.netlify.app"
//!
//! [logging]
//! level = "info"
//! verbose = ["node", "relay"]
//! ```
//!
//! Every table and field is optional.

use anyhow::{Context, Result};
use electrometer::{CipherMode, LoraBand, WindowConfig};
use electrometer_station::{
    GatewayConfig, NodeConfig, DEFAULT_CURRENT_PIN, DEFAULT_DEVICE_ID, DEFAULT_VOLTAGE_PIN,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding `radio.encryption_key`
pub const KEY_ENV: &str = "ELECTROMETER_KEY";

/// Components that can be switched to debug logging
pub const COMPONENTS: &[(&str, &[&str])] = &[
    ("node", &["electrometer_station::node"]),
    ("gateway", &["electrometer_station::gateway"]),
    ("sensor", &["electrometer::sensor", "electrometer_cli::sim"]),
    ("aggregator", &["electrometer::aggregator"]),
    ("cipher", &["electrometer::cipher"]),
    ("radio", &["electrometer::radio", "electrometer_cli::udp_radio"]),
    ("relay", &["electrometer::relay"]),
    ("backend", &["electrometer_cli::backend"]),
];

/// Complete binary configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub radio: RadioSection,
    pub node: NodeSection,
    pub gateway: GatewaySection,
    pub logging: LoggingSection,

    /// Set when the key came from [`KEY_ENV`]
    #[serde(skip)]
    pub key_from_env: bool,
}

/// Radio link shared by both roles
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioSection {
    pub band: String,
    pub bind: String,
    pub peer: String,
    pub cipher_mode: String,
    pub encryption_key: Option<String>,
}

impl Default for RadioSection {
    fn default() -> Self {
        Self {
            band: LoraBand::default().to_string(),
            bind: "0.0.0.0:1700".to_string(),
            peer: "127.0.0.1:1701".to_string(),
            cipher_mode: CipherMode::default().to_string(),
            encryption_key: None,
        }
    }
}

impl std::fmt::Debug for RadioSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadioSection")
            .field("band", &self.band)
            .field("bind", &self.bind)
            .field("peer", &self.peer)
            .field("cipher_mode", &self.cipher_mode)
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Metering node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub device_id: String,
    pub current_pin: u8,
    pub voltage_pin: u8,
    pub window_ms: u64,
    pub sample_interval_ms: u64,
    pub mains_voltage: f64,
}

impl Default for NodeSection {
    fn default() -> Self {
        let window = WindowConfig::default();
        Self {
            device_id: DEFAULT_DEVICE_ID.to_string(),
            current_pin: DEFAULT_CURRENT_PIN,
            voltage_pin: DEFAULT_VOLTAGE_PIN,
            window_ms: window.duration.as_millis() as u64,
            sample_interval_ms: window.sample_interval.as_millis() as u64,
            mains_voltage: electrometer::sensor::DEFAULT_MAINS_VOLTAGE,
        }
    }
}

/// Relaying gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    pub relay_host: String,
    pub relay_path: String,
    pub relay_port: u16,
    pub tls: bool,
    pub receive_timeout_ms: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        let defaults = GatewayConfig::default();
        Self {
            relay_host: defaults.relay_host,
            relay_path: defaults.relay_path,
            relay_port: defaults.relay_port,
            tls: true,
            receive_timeout_ms: defaults.receive_timeout.as_millis() as u64,
        }
    }
}

/// Log output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub verbose: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            verbose: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    ///
    /// Environment variables override config file values:
    /// - ELECTROMETER_KEY: pre-shared radio key
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_key_override(path, std::env::var(KEY_ENV).ok())
    }

    /// Load `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let mut config = Self::default();
            config.apply_key_override(std::env::var(KEY_ENV).ok());
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration, replacing the key with `key_override` if given
    pub fn load_with_key_override(path: &Path, key_override: Option<String>) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: AppConfig = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.apply_key_override(key_override);
        config.validate()?;

        Ok(config)
    }

    fn apply_key_override(&mut self, key_override: Option<String>) {
        if let Some(key) = key_override.filter(|k| !k.is_empty()) {
            self.radio.encryption_key = Some(key);
            self.key_from_env = true;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.band()?;
        self.cipher_mode()?;

        self.radio
            .bind
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid radio bind address: {}", self.radio.bind))?;
        self.radio
            .peer
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid radio peer address: {}", self.radio.peer))?;

        if self.gateway.receive_timeout_ms == 0 {
            anyhow::bail!("gateway.receive_timeout_ms must be greater than 0");
        }
        if !self.node.mains_voltage.is_finite() || self.node.mains_voltage <= 0.0 {
            anyhow::bail!(
                "Invalid node.mains_voltage: {} (must be positive)",
                self.node.mains_voltage
            );
        }

        for component in &self.logging.verbose {
            if !COMPONENTS.iter().any(|(name, _)| *name == component.as_str()) {
                anyhow::bail!("Unknown logging component: {}", component);
            }
        }

        self.node_config()?
            .validate()
            .context("Invalid [node] section")?;
        self.gateway_config()?
            .validate()
            .context("Invalid [gateway] section")?;

        Ok(())
    }

    /// Radio band
    pub fn band(&self) -> Result<LoraBand> {
        Ok(self.radio.band.parse()?)
    }

    /// Cipher mode shared by both roles
    pub fn cipher_mode(&self) -> Result<CipherMode> {
        Ok(self.radio.cipher_mode.parse()?)
    }

    /// Sampling window of the node
    pub fn window(&self) -> WindowConfig {
        WindowConfig::new(
            Duration::from_millis(self.node.window_ms),
            Duration::from_millis(self.node.sample_interval_ms),
        )
    }

    /// Session configuration for the node role
    pub fn node_config(&self) -> Result<NodeConfig> {
        Ok(NodeConfig {
            device_id: self.node.device_id.clone(),
            current_pin: self.node.current_pin,
            voltage_pin: self.node.voltage_pin,
            encryption_key: self.radio.encryption_key.clone(),
            cipher_mode: self.cipher_mode()?,
            band: self.band()?,
            window: self.window(),
            ..NodeConfig::default()
        })
    }

    /// Session configuration for the gateway role
    pub fn gateway_config(&self) -> Result<GatewayConfig> {
        Ok(GatewayConfig {
            relay_host: self.gateway.relay_host.clone(),
            relay_path: self.gateway.relay_path.clone(),
            relay_port: self.gateway.relay_port,
            encryption_key: self.radio.encryption_key.clone(),
            cipher_mode: self.cipher_mode()?,
            band: self.band()?,
            receive_timeout: Duration::from_millis(self.gateway.receive_timeout_ms),
        })
    }

    /// Log filter directives for the verbose components
    pub fn verbose_directives(&self) -> Vec<String> {
        COMPONENTS
            .iter()
            .filter(|(name, _)| self.logging.verbose.iter().any(|v| v.as_str() == *name))
            .flat_map(|(_, targets)| targets.iter().map(|t| format!("{t}=debug")))
            .collect()
    }
}

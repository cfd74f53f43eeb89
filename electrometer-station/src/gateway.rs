// Electrometer Station - Node and gateway control loops
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Relaying gateway control loop
//!
//! The [`GatewaySession`] waits for one radio packet per cycle, opens it and
//! forwards its records to the backend as a `GET` query string.
//!
//! # Example
//!
//! ```rust
//! use electrometer::{CipherMode, CipherService, MemoryHttpClient, MemoryRadio};
//! use electrometer_station::{GatewayConfig, GatewayCycle, GatewaySession};
//!
//! let mut radio = MemoryRadio::new();
//! let cipher = CipherService::with_key(CipherMode::Ctr, "K");
//! radio.push_incoming(cipher.encrypt(b"deviceID=X1&current=1.0").unwrap());
//!
//! let config = GatewayConfig::default().with_key("K");
//! let mut gateway = GatewaySession::new(config, radio, MemoryHttpClient::new()).unwrap();
//!
//! assert!(matches!(gateway.operate().unwrap(), GatewayCycle::Relayed { .. }));
//! assert_eq!(
//!     gateway.http().last().unwrap().target(),
//!     "/.netlify/functions/server?deviceID=X1&current=1.0"
//! );
//! assert_eq!(gateway.operate().unwrap(), GatewayCycle::Idle);
//! ```

use crate::config::GatewayConfig;
use crate::error::Result;
use electrometer::{CipherService, HttpClient, RadioTransport, RelayRequest, TelemetryEnvelope};

/// Outcome of one gateway cycle
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCycle {
    /// No packet arrived within the receive timeout
    Idle,
    /// A packet arrived but held no records
    Empty,
    /// Records forwarded to the backend
    Relayed {
        /// Records received
        envelope: TelemetryEnvelope,
        /// Bytes written to the backend
        bytes_sent: usize,
    },
    /// Backend unreachable; the sample is lost
    Dropped {
        /// Records that could not be forwarded
        envelope: TelemetryEnvelope,
    },
}

/// Gateway counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayStats {
    /// Packets received
    pub received: u64,
    /// Cycles without a packet
    pub idle: u64,
    /// Packets without records
    pub empty: u64,
    /// Envelopes forwarded
    pub relayed: u64,
    /// Envelopes lost to relay failures
    pub dropped: u64,
    /// Packets that failed to decrypt or parse
    pub malformed: u64,
}

/// Gateway role: receive, decrypt, parse, relay
pub struct GatewaySession<R, H> {
    config: GatewayConfig,
    radio: R,
    http: H,
    cipher: CipherService,
    stats: GatewayStats,
}

impl<R, H> GatewaySession<R, H>
where
    R: RadioTransport,
    H: HttpClient,
{
    /// Create a session; the configuration is validated first
    pub fn new(config: GatewayConfig, radio: R, http: H) -> Result<Self> {
        config.validate()?;

        let cipher = match &config.encryption_key {
            Some(key) => CipherService::with_key(config.cipher_mode, key),
            None => CipherService::new(config.cipher_mode),
        };
        if !cipher.is_ready() {
            log::warn!("no encryption key configured, gateway will accept plaintext");
        }
        log::info!(
            "gateway on {} ({} Hz), relaying to {}{}",
            config.band,
            config.band.frequency_hz(),
            config.relay_host,
            config.relay_path
        );

        Ok(Self {
            config,
            radio,
            http,
            cipher,
            stats: GatewayStats::default(),
        })
    }

    /// Run one receive-and-relay cycle
    ///
    /// # Errors
    ///
    /// Radio failures and payloads that do not decrypt or parse are returned,
    /// as are records holding spaces or control characters, which cannot be
    /// placed in the request line.
    /// Relay failures are not errors: they yield [`GatewayCycle::Dropped`].
    pub fn operate(&mut self) -> Result<GatewayCycle> {
        let payload = match self.radio.receive(self.config.receive_timeout)? {
            Some(payload) => payload,
            None => {
                log::info!("Nothing to send!");
                self.stats.idle += 1;
                return Ok(GatewayCycle::Idle);
            }
        };
        self.stats.received += 1;

        let envelope = match self.open(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.stats.malformed += 1;
                return Err(e);
            }
        };

        if envelope.is_empty() {
            log::info!("Nothing to send!");
            self.stats.empty += 1;
            return Ok(GatewayCycle::Empty);
        }

        let request = match RelayRequest::from_envelope(
            self.config.relay_host.as_str(),
            self.config.relay_path.as_str(),
            &envelope,
        ) {
            Ok(request) => request,
            Err(e) => {
                self.stats.malformed += 1;
                return Err(e.into());
            }
        };
        match self.http.get(&request) {
            Ok(bytes_sent) => {
                log::info!("relayed {} records: {}", envelope.len(), request.target());
                self.stats.relayed += 1;
                Ok(GatewayCycle::Relayed {
                    envelope,
                    bytes_sent,
                })
            }
            Err(e) => {
                log::warn!("relay failed, dropping sample: {}", e);
                self.stats.dropped += 1;
                Ok(GatewayCycle::Dropped { envelope })
            }
        }
    }

    fn open(&self, payload: &[u8]) -> Result<TelemetryEnvelope> {
        let plaintext = if self.cipher.is_ready() {
            self.cipher.decrypt(payload)?
        } else {
            log::warn!("accepting plaintext payload");
            payload.to_vec()
        };
        Ok(TelemetryEnvelope::parse_bytes(&plaintext)?)
    }

    /// Run `cycles` cycles, logging failures and carrying on
    pub fn run(&mut self, cycles: u64) -> &GatewayStats {
        for _ in 0..cycles {
            if let Err(e) = self.operate() {
                log::error!("gateway cycle failed: {}", e);
            }
        }
        &self.stats
    }

    /// Cycle until the process is stopped
    pub fn run_forever(&mut self) -> ! {
        loop {
            if let Err(e) = self.operate() {
                log::error!("gateway cycle failed: {}", e);
            }
        }
    }

    /// Session configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Counters so far
    pub fn stats(&self) -> &GatewayStats {
        &self.stats
    }

    /// Radio handle
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Mutable radio handle
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// HTTP client handle
    pub fn http(&self) -> &H {
        &self.http
    }

    /// Mutable HTTP client handle
    pub fn http_mut(&mut self) -> &mut H {
        &mut self.http
    }
}

// Electrometer Station - Node and gateway control loops
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Electrometer Station - Node and gateway control loops
//!
//! Wires the `electrometer` protocol stack into the two device roles.
//!
//! ## Overview
//!
//! A **node** samples a current clamp and a voltage sensor over a fixed
//! window, encrypts the means and transmits them by radio. A **gateway**
//! receives those packets and relays their records to an HTTP backend.
//! Both roles are single-threaded loops; every cycle either completes or
//! returns an error, and the `run*` helpers log the error and carry on.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────── Node ──────────────┐          ┌──────────── Gateway ────────────┐
//! │ SensorSource x2                  │          │                                 │
//! │      │                           │   LoRa   │ RadioTransport::receive         │
//! │ WindowAggregator ─► Envelope ─►  │ ───────► │      │                          │
//! │ CipherService ─► RadioTransport  │          │ CipherService ─► Envelope       │
//! └──────────────────────────────────┘          │      │                          │
//!                                               │ HttpClient::get ─► backend      │
//!                                               └─────────────────────────────────┘
//! ```
//!
//! All collaborators (radio, clock, sensors, HTTP) are owned by the session
//! as type parameters, so tests run both roles in memory.

mod config;
mod error;
mod gateway;
mod node;

// Public API
pub use config::{
    GatewayConfig, NodeConfig, DEFAULT_CURRENT_PIN, DEFAULT_DEVICE_ID, DEFAULT_VOLTAGE_PIN,
};
pub use error::{Result, StationError};
pub use gateway::{GatewayCycle, GatewaySession, GatewayStats};
pub use node::{NodeCycle, NodeSession, NodeStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

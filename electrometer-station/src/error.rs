// Electrometer Station - Node and gateway control loops
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for station sessions

use electrometer::{ErrorKind, TelemetryError};
use thiserror::Error;

/// Main error type for station operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StationError {
    /// Failure in the telemetry stack (codec, cipher, window, transport)
    #[error("{0}")]
    Telemetry(#[from] TelemetryError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StationError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StationError::Telemetry(e) => e.kind(),
            StationError::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }
}

/// Result type alias for station operations
pub type Result<T> = std::result::Result<T, StationError>;

// Electrometer - LoRa telemetry protocol stack
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for the telemetry stack
//!
//! Every failure in the core is recoverable: callers log it and skip the
//! current cycle. [`TelemetryError::kind`] collapses the nested errors into
//! a flat [`ErrorKind`] for callers that only need to branch on the category.

use thiserror::Error;

/// Result type alias for telemetry operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Main error type for telemetry operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TelemetryError {
    /// Wire codec error
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Payload encryption error
    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    /// Sensor aggregation error
    #[error("Aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    /// Radio or HTTP collaborator error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Flat error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Cipher used before a key was supplied
    NotInitialized,
    /// Wire fragment without a required delimiter, or not text
    MalformedRecord,
    /// Record key/value contains a reserved delimiter
    InvalidRecord,
    /// Window closed without a single sample
    EmptyAggregation,
    /// Radio or HTTP collaborator failed
    TransportUnavailable,
    /// Ciphertext cannot be decrypted in the configured mode
    InvalidCiphertext,
    /// Configuration rejected
    InvalidConfig,
}

impl TelemetryError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            TelemetryError::Codec(CodecError::InvalidRecord { .. }) => ErrorKind::InvalidRecord,
            TelemetryError::Codec(_) => ErrorKind::MalformedRecord,
            TelemetryError::Cipher(CipherError::NotInitialized) => ErrorKind::NotInitialized,
            TelemetryError::Cipher(CipherError::BlockAlignment { .. }) => {
                ErrorKind::InvalidCiphertext
            }
            TelemetryError::Aggregation(AggregationError::EmptyAggregation) => {
                ErrorKind::EmptyAggregation
            }
            TelemetryError::Aggregation(AggregationError::InvalidWindow(_)) => {
                ErrorKind::InvalidConfig
            }
            TelemetryError::Transport(_) => ErrorKind::TransportUnavailable,
            TelemetryError::Config(_) => ErrorKind::InvalidConfig,
        }
    }
}

/// Errors from the key-value wire codec
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Fragment is missing its `=` separator
    #[error("Malformed record at offset {offset}: {reason}")]
    MalformedRecord { offset: usize, reason: String },

    /// Key or value contains a reserved delimiter
    #[error("Invalid record {key:?}: {reason}")]
    InvalidRecord { key: String, reason: String },

    /// Payload bytes are not UTF-8 text
    #[error("Payload is not valid UTF-8 (first bad byte at {valid_up_to})")]
    InvalidUtf8 { valid_up_to: usize },

    /// Text cannot be placed in an HTTP request line
    #[error("Unsafe character {found:?} at offset {offset} in relay request")]
    UnsafeForRelay { offset: usize, found: char },
}

/// Errors from the payload cipher
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CipherError {
    /// No key has been supplied yet
    #[error("Cipher context not initialized")]
    NotInitialized,

    /// Block mode ciphertext is not a whole number of blocks
    #[error("Ciphertext length {len} is not a multiple of the {block}-byte block size")]
    BlockAlignment { len: usize, block: usize },
}

/// Errors from windowed sensor aggregation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    /// The window produced zero samples
    #[error("Aggregation window produced no samples")]
    EmptyAggregation,

    /// Window parameters are unusable
    #[error("Invalid window: {0}")]
    InvalidWindow(String),
}

/// Errors from the radio link or the HTTP relay
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Transport is closed or not connected
    #[error("Transport unavailable: {reason}")]
    Unavailable { reason: String },

    /// Payload does not fit in one radio packet
    #[error("Payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// Send queue is full
    #[error("Send buffer full")]
    BufferFull,

    /// I/O failure in the underlying socket
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::Codec(CodecError::MalformedRecord {
            offset: 8,
            reason: "missing '='".to_string(),
        });
        let msg = format!("{}", err);
        assert!(msg.contains("Malformed"));
        assert!(msg.contains("offset 8"));
    }

    #[test]
    fn test_error_conversion() {
        let cipher_err = CipherError::NotInitialized;
        let err: TelemetryError = cipher_err.into();
        assert!(matches!(err, TelemetryError::Cipher(_)));
        assert_eq!(err.kind(), ErrorKind::NotInitialized);
    }

    #[test]
    fn test_error_kinds() {
        let utf8: TelemetryError = CodecError::InvalidUtf8 { valid_up_to: 0 }.into();
        assert_eq!(utf8.kind(), ErrorKind::MalformedRecord);

        let unsafe_text: TelemetryError = CodecError::UnsafeForRelay {
            offset: 3,
            found: '\r',
        }
        .into();
        assert_eq!(unsafe_text.kind(), ErrorKind::MalformedRecord);

        let empty: TelemetryError = AggregationError::EmptyAggregation.into();
        assert_eq!(empty.kind(), ErrorKind::EmptyAggregation);

        let io: TelemetryError =
            TransportError::from(std::io::Error::new(std::io::ErrorKind::Other, "down")).into();
        assert_eq!(io.kind(), ErrorKind::TransportUnavailable);
    }
}

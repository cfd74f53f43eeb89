//! # Electrometer - LoRa telemetry for a mains current meter
//!
//! Core protocol stack shared by the metering node and the relaying gateway.
//!
//! ## Key Features
//!
//! - **Key-value envelope**: `deviceID=X1&current=1.0&voltage=230.0`, the
//!   same text on the radio and in the backend query string
//! - **Symmetric cipher**: AES-128 in CTR (default) or ECB mode with a
//!   pre-shared key
//! - **Windowed aggregation**: fixed-cadence sampling reduced to per-quantity
//!   means over a real-time window
//! - **Pluggable collaborators**: radio, HTTP client, clock and sensors are
//!   traits, with in-memory doubles for tests
//!
//! ## Quick Start
//!
//! ```rust
//! use electrometer::{CipherMode, CipherService, TelemetryEnvelope};
//!
//! // Node side: build and encrypt
//! let envelope = TelemetryEnvelope::from_pairs([
//!     ("deviceID", "X1"),
//!     ("current", "1.0"),
//!     ("voltage", "230.0"),
//! ])
//! .unwrap();
//! let cipher = CipherService::with_key(CipherMode::Ctr, "K");
//! let payload = cipher.encrypt(envelope.serialize().as_bytes()).unwrap();
//!
//! // Gateway side: decrypt and parse
//! let plaintext = cipher.decrypt(&payload).unwrap();
//! let received = TelemetryEnvelope::parse_bytes(&plaintext).unwrap();
//! assert_eq!(received.get("current"), Some("1.0"));
//! assert_eq!(received, envelope);
//! ```
//!
//! ## Modules
//!
//! - [`record`]: Single key-value field
//! - [`envelope`]: Ordered record list and its wire text
//! - [`cipher`]: Payload encryption
//! - [`sensor`]: Sensor sources and calibration
//! - [`clock`]: Time source for sampling windows
//! - [`aggregator`]: Windowed mean of sensor readings
//! - [`radio`]: Packet radio abstraction
//! - [`relay`]: HTTP relay to the backend

// Modules
pub mod aggregator;
pub mod cipher;
pub mod clock;
pub mod envelope;
pub mod error;
pub mod radio;
pub mod record;
pub mod relay;
pub mod sensor;

// Re-exports for convenient access
pub use aggregator::{WindowAggregator, WindowConfig, WindowState, WindowSummary};
pub use cipher::{CipherKey, CipherMode, CipherService};
pub use clock::{Clock, ManualClock, SystemClock};
pub use envelope::TelemetryEnvelope;
pub use error::{ErrorKind, Result, TelemetryError};
pub use radio::{LoraBand, MemoryRadio, RadioLink, RadioMetrics, RadioTransport};
pub use record::KeyValueRecord;
#[cfg(feature = "tls")]
pub use relay::TlsHttpClient;
pub use relay::{HttpClient, MemoryHttpClient, RelayRequest, TcpHttpClient};
pub use sensor::{
    AnalogInput, FixedVoltage, LinearCalibration, LinearCurrent, RmsCalibration, RmsCurrent,
    SensorSource,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_basic_roundtrip() {
        let mut envelope = TelemetryEnvelope::new();
        envelope.push(KeyValueRecord::new("deviceID", "X1").unwrap());
        envelope.push(KeyValueRecord::number("current", 1.0, 1).unwrap());

        let cipher = CipherService::with_key(CipherMode::Ecb, "secret");
        let payload = cipher.encrypt(envelope.serialize().as_bytes()).unwrap();
        assert_eq!(payload.len() % cipher::BLOCK_SIZE, 0);

        let decoded = TelemetryEnvelope::parse_bytes(&cipher.decrypt(&payload).unwrap()).unwrap();
        assert_eq!(decoded.serialize(), "deviceID=X1&current=1.0");
    }
}

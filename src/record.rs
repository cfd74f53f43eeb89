//! Key-value telemetry records
//!
//! A [`KeyValueRecord`] is one named field of a telemetry transmission. The
//! wire codec has no escaping, so the delimiter characters are rejected when
//! a record is built instead of being ambiguous at parse time:
//!
//! - keys may not contain [`KEY_VALUE_SEPARATOR`] or [`RECORD_SEPARATOR`]
//! - values may not contain [`RECORD_SEPARATOR`]
//! - neither may contain NUL, which ECB padding strips from the tail

use crate::error::{CodecError, Result};
use std::fmt;

/// Separator between a key and its value (`key=value`)
pub const KEY_VALUE_SEPARATOR: char = '=';

/// Separator between records (`a=1&b=2`)
pub const RECORD_SEPARATOR: char = '&';

/// Decimal places used when formatting sensor readings
pub const DEFAULT_PRECISION: usize = 2;

/// A single named telemetry field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyValueRecord {
    key: String,
    value: String,
}

impl KeyValueRecord {
    /// Create a record, rejecting delimiter characters
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let value = value.into();

        if key.contains(KEY_VALUE_SEPARATOR) || key.contains(RECORD_SEPARATOR) {
            return Err(CodecError::InvalidRecord {
                key,
                reason: "key contains '=' or '&'".to_string(),
            }
            .into());
        }
        if key.contains('\0') || value.contains('\0') {
            return Err(CodecError::InvalidRecord {
                key,
                reason: "record contains NUL".to_string(),
            }
            .into());
        }
        if value.contains(RECORD_SEPARATOR) {
            return Err(CodecError::InvalidRecord {
                key,
                reason: "value contains '&'".to_string(),
            }
            .into());
        }

        Ok(Self { key, value })
    }

    /// Create a record holding a number formatted with `precision` decimals
    pub fn number(key: impl Into<String>, value: f64, precision: usize) -> Result<Self> {
        Self::new(key, format!("{:.*}", precision, value))
    }

    /// Record key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Record value as text
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Value parsed as a float, if it is numeric
    pub fn as_f64(&self) -> Option<f64> {
        self.value.parse().ok()
    }

    /// Consume the record into its parts
    pub fn into_parts(self) -> (String, String) {
        (self.key, self.value)
    }
}

impl fmt::Display for KeyValueRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.key, KEY_VALUE_SEPARATOR, self.value)
    }
}

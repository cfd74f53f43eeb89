// Electrometer - LoRa telemetry protocol stack
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Telemetry envelope and its wire codec
//!
//! # Wire Format
//!
//! ```text
//! key1=value1&key2=value2&...&keyN=valueN
//! ```
//!
//! No escaping, no trailing separator. Record order is significant and is
//! preserved across a serialize/parse round trip. The same text doubles as
//! the query string of the relay request.

use crate::error::{CodecError, Result};
use crate::record::{KeyValueRecord, KEY_VALUE_SEPARATOR, RECORD_SEPARATOR};
use std::fmt;
use std::str::FromStr;

/// Ordered set of telemetry records for one transmission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryEnvelope {
    records: Vec<KeyValueRecord>,
}

impl TelemetryEnvelope {
    /// Create an empty envelope
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an envelope from already validated records
    pub fn from_records(records: Vec<KeyValueRecord>) -> Self {
        Self { records }
    }

    /// Build an envelope from `(key, value)` pairs, validating each one
    pub fn from_pairs<K, V, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let records = pairs
            .into_iter()
            .map(|(k, v)| KeyValueRecord::new(k, v))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { records })
    }

    /// Append a record
    pub fn push(&mut self, record: KeyValueRecord) {
        self.records.push(record);
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the envelope carries no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in wire order
    pub fn records(&self) -> &[KeyValueRecord] {
        &self.records
    }

    /// Iterate over records in wire order
    pub fn iter(&self) -> std::slice::Iter<'_, KeyValueRecord> {
        self.records.iter()
    }

    /// Value of the first record with the given key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.records
            .iter()
            .find(|r| r.key() == key)
            .map(|r| r.value())
    }

    /// Serialize to wire text
    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(self.wire_len());
        for (i, record) in self.records.iter().enumerate() {
            if i > 0 {
                out.push(RECORD_SEPARATOR);
            }
            out.push_str(record.key());
            out.push(KEY_VALUE_SEPARATOR);
            out.push_str(record.value());
        }
        out
    }

    /// Length of the serialized text in bytes
    pub fn wire_len(&self) -> usize {
        let fields: usize = self
            .records
            .iter()
            .map(|r| r.key().len() + 1 + r.value().len())
            .sum();
        fields + self.records.len().saturating_sub(1)
    }

    /// Parse wire text
    ///
    /// The number of `&` delimiters bounds the record count. Each fragment
    /// must contain `=`; the first `=` splits key from value, so values may
    /// themselves contain `=`. An empty text yields an empty envelope.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MalformedRecord`] when a fragment has no `=`.
    pub fn parse(text: &str) -> Result<Self> {
        let capacity = text.matches(RECORD_SEPARATOR).count() + 1;
        let mut records = Vec::with_capacity(capacity);
        let mut index = 0;

        while index < text.len() && records.len() < capacity {
            let rest = &text[index..];
            let fragment_end = rest.find(RECORD_SEPARATOR).unwrap_or(rest.len());
            let fragment = &rest[..fragment_end];

            let key_end = fragment.find(KEY_VALUE_SEPARATOR).ok_or_else(|| {
                CodecError::MalformedRecord {
                    offset: index,
                    reason: format!("fragment {:?} has no '='", fragment),
                }
            })?;

            let key = &fragment[..key_end];
            let value = &fragment[key_end + 1..];
            records.push(KeyValueRecord::new(key, value)?);

            index += fragment_end + 1;
        }

        Ok(Self { records })
    }

    /// Parse a received payload, which must be UTF-8 text
    pub fn parse_bytes(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload).map_err(|e| CodecError::InvalidUtf8 {
            valid_up_to: e.valid_up_to(),
        })?;
        Self::parse(text)
    }
}

impl fmt::Display for TelemetryEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl FromStr for TelemetryEnvelope {
    type Err = crate::error::TelemetryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl<'a> IntoIterator for &'a TelemetryEnvelope {
    type Item = &'a KeyValueRecord;
    type IntoIter = std::slice::Iter<'a, KeyValueRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

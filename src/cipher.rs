// Electrometer - LoRa telemetry protocol stack
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Payload cipher
//!
//! AES-128 applied to serialized envelopes before they go on air. Both ends
//! of a link must run the same [`CipherMode`]:
//!
//! - [`CipherMode::Ctr`]: keystream XOR with a fixed IV shared by every
//!   device. Any payload length. Encrypt and decrypt are one transform.
//! - [`CipherMode::Ecb`]: independent 16-byte blocks. Plaintext is zero
//!   padded to a block multiple; decrypt strips every trailing zero byte,
//!   so payloads ending in NUL do not round-trip. Records never hold NUL.
//!
//! Key material shorter than 16 bytes is zero padded, longer is truncated.

use crate::error::{CipherError, Result};
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};
use std::fmt;
use std::str::FromStr;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Cipher block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Key size in bytes (AES-128)
pub const KEY_SIZE: usize = 16;

/// Initialization vector shared by both ends of the link
pub const SHARED_IV: [u8; BLOCK_SIZE] = *b"1234567890ABCDEF";

/// Block cipher mode used on the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CipherMode {
    /// Electronic codebook, one block at a time
    ///
    /// Trailing NUL bytes are lost on decrypt.
    Ecb,
    /// Counter mode keystream
    #[default]
    Ctr,
}

impl fmt::Display for CipherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherMode::Ecb => write!(f, "ecb"),
            CipherMode::Ctr => write!(f, "ctr"),
        }
    }
}

impl FromStr for CipherMode {
    type Err = crate::error::TelemetryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ecb" => Ok(CipherMode::Ecb),
            "ctr" => Ok(CipherMode::Ctr),
            other => Err(crate::error::TelemetryError::Config(format!(
                "unknown cipher mode: {other}"
            ))),
        }
    }
}

/// Fixed-width AES key
#[derive(Clone, PartialEq, Eq)]
pub struct CipherKey([u8; KEY_SIZE]);

impl CipherKey {
    /// Derive a key from raw material; `None` when the material is empty
    pub fn from_bytes(material: &[u8]) -> Option<Self> {
        if material.is_empty() {
            return None;
        }
        let mut key = [0u8; KEY_SIZE];
        let n = material.len().min(KEY_SIZE);
        key[..n].copy_from_slice(&material[..n]);
        Some(Self(key))
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CipherKey(<redacted>)")
    }
}

/// Symmetric payload cipher with a readiness flag
#[derive(Debug, Clone)]
pub struct CipherService {
    mode: CipherMode,
    key: Option<CipherKey>,
    iv: [u8; BLOCK_SIZE],
}

impl CipherService {
    /// Create a service with no key; it stays unready until [`initialize`](Self::initialize)
    pub fn new(mode: CipherMode) -> Self {
        Self {
            mode,
            key: None,
            iv: SHARED_IV,
        }
    }

    /// Create a service keyed from `key`; an empty key leaves it unready
    pub fn with_key(mode: CipherMode, key: impl AsRef<[u8]>) -> Self {
        let mut service = Self::new(mode);
        service.initialize(key);
        service
    }

    /// Set the active key and reset the IV
    ///
    /// An empty key is ignored and the previous state is kept.
    pub fn initialize(&mut self, key: impl AsRef<[u8]>) {
        if let Some(key) = CipherKey::from_bytes(key.as_ref()) {
            self.key = Some(key);
            self.iv = SHARED_IV;
        }
    }

    /// Whether a key has been supplied
    pub fn is_ready(&self) -> bool {
        self.key.is_some()
    }

    /// Configured mode
    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    /// Encrypt a payload
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::NotInitialized`] if no key has been supplied.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let key = self.active_key()?;
        let mut data = plaintext.to_vec();
        match self.mode {
            CipherMode::Ctr => self.apply_keystream(key, &mut data),
            CipherMode::Ecb => {
                let padded = (data.len() + BLOCK_SIZE - 1) / BLOCK_SIZE * BLOCK_SIZE;
                data.resize(padded, 0);
                let cipher = Aes128::new(GenericArray::from_slice(key.as_bytes()));
                for block in data.chunks_mut(BLOCK_SIZE) {
                    cipher.encrypt_block(GenericArray::from_mut_slice(block));
                }
            }
        }
        Ok(data)
    }

    /// Decrypt a payload produced by [`encrypt`](Self::encrypt) with the same key
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::NotInitialized`] if no key has been supplied,
    /// or [`CipherError::BlockAlignment`] for a truncated ECB payload.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let key = self.active_key()?;
        let mut data = ciphertext.to_vec();
        match self.mode {
            CipherMode::Ctr => self.apply_keystream(key, &mut data),
            CipherMode::Ecb => {
                if data.len() % BLOCK_SIZE != 0 {
                    return Err(CipherError::BlockAlignment {
                        len: data.len(),
                        block: BLOCK_SIZE,
                    }
                    .into());
                }
                let cipher = Aes128::new(GenericArray::from_slice(key.as_bytes()));
                for block in data.chunks_mut(BLOCK_SIZE) {
                    cipher.decrypt_block(GenericArray::from_mut_slice(block));
                }
                let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
                data.truncate(end);
            }
        }
        Ok(data)
    }

    /// Re-initialize with `key` (when non-empty), then encrypt
    pub fn encrypt_with(&mut self, plaintext: &[u8], key: impl AsRef<[u8]>) -> Result<Vec<u8>> {
        self.initialize(key);
        self.encrypt(plaintext)
    }

    /// Re-initialize with `key` (when non-empty), then decrypt
    pub fn decrypt_with(&mut self, ciphertext: &[u8], key: impl AsRef<[u8]>) -> Result<Vec<u8>> {
        self.initialize(key);
        self.decrypt(ciphertext)
    }

    fn active_key(&self) -> Result<&CipherKey> {
        self.key
            .as_ref()
            .ok_or_else(|| CipherError::NotInitialized.into())
    }

    // Counter mode is an involution: the same call encrypts and decrypts.
    fn apply_keystream(&self, key: &CipherKey, data: &mut [u8]) {
        let mut stream = Aes128Ctr::new(
            GenericArray::from_slice(key.as_bytes()),
            GenericArray::from_slice(&self.iv),
        );
        stream.apply_keystream(data);
    }
}

impl Default for CipherService {
    fn default() -> Self {
        Self::new(CipherMode::default())
    }
}

//! Encrypted request envelope: base64 AES-CBC ciphertext carrying a JSON
//! [`FeatureRecord`].
//!
//! Deployed clients encrypt with PKCS#7 padding, but the server side has
//! always removed padding with a byte-marker heuristic rather than PKCS#7
//! unpadding: every trailing `0x00` is stripped, then every trailing `0x01`,
//! and so on up to `0x0F`. The heuristic is kept as-is for wire
//! compatibility. It is lossy for plaintexts that legitimately end in a
//! control byte; a JSON object always ends in `}`, so well-formed payloads
//! are unaffected.

use std::fmt;

use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use tracing::debug;

use crate::record::{FeatureRecord, SchemaError};

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Highest byte value treated as a padding marker.
const MAX_PAD_MARKER: u8 = 0x0F;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    #[error("envelope is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("ciphertext length {0} is not a positive multiple of 16")]
    MalformedCiphertext(usize),
    #[error("decryption failed")]
    Decryption,
    #[error("decrypted payload is not a JSON object: {0}")]
    InvalidPayload(String),
    #[error("payload schema error: {0}")]
    PayloadSchema(#[from] SchemaError),
}

/// Pre-shared key and IV, distributed to clients out of band.
#[derive(Clone)]
pub struct SharedSecret {
    key: Vec<u8>,
    iv: [u8; BLOCK_SIZE],
}

impl SharedSecret {
    /// Build from raw key bytes (16, 24 or 32 bytes selects AES-128/192/256)
    /// and a 16-byte IV.
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, EnvelopeError> {
        if !matches!(key.len(), 16 | 24 | 32) {
            return Err(EnvelopeError::InvalidKey(format!(
                "key must be 16, 24 or 32 bytes, got {}",
                key.len()
            )));
        }
        let iv: [u8; BLOCK_SIZE] = iv.try_into().map_err(|_| {
            EnvelopeError::InvalidKey(format!("iv must be 16 bytes, got {}", iv.len()))
        })?;
        Ok(Self {
            key: key.to_vec(),
            iv,
        })
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecret")
            .field("key_bits", &(self.key.len() * 8))
            .finish_non_exhaustive()
    }
}

/// Block-aligned ciphertext received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Wrap raw ciphertext, rejecting empty or non-block-aligned input.
    pub fn new(ciphertext: Vec<u8>) -> Result<Self, EnvelopeError> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(EnvelopeError::MalformedCiphertext(ciphertext.len()));
        }
        Ok(Self { ciphertext })
    }

    /// Decode the base64 `data` field of a request.
    pub fn from_base64(data: &str) -> Result<Self, EnvelopeError> {
        let bytes = STANDARD.decode(data.trim())?;
        Self::new(bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.ciphertext)
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}

/// Symmetric cipher for the request envelope. Stateless and deterministic.
#[derive(Debug, Clone)]
pub struct PayloadCipher {
    secret: SharedSecret,
}

impl PayloadCipher {
    pub fn new(secret: SharedSecret) -> Self {
        Self { secret }
    }

    /// Decrypt an envelope into a validated [`FeatureRecord`].
    pub fn decrypt(&self, envelope: &EncryptedEnvelope) -> Result<FeatureRecord, EnvelopeError> {
        let plaintext = self.decrypt_blocks(envelope.ciphertext())?;
        let body = strip_pad_markers(&plaintext);
        debug!(
            ciphertext_len = envelope.ciphertext().len(),
            body_len = body.len(),
            "decrypted envelope"
        );

        let text =
            std::str::from_utf8(body).map_err(|e| EnvelopeError::InvalidPayload(e.to_string()))?;
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| EnvelopeError::InvalidPayload(e.to_string()))?;
        if !value.is_object() {
            return Err(EnvelopeError::InvalidPayload(format!(
                "expected an object, got {}",
                json_kind(&value)
            )));
        }
        Ok(FeatureRecord::from_json(value)?)
    }

    /// Client-side counterpart of [`decrypt`](Self::decrypt): JSON-encode and
    /// encrypt with PKCS#7 padding, as deployed clients do.
    pub fn encrypt(&self, record: &FeatureRecord) -> Result<EncryptedEnvelope, EnvelopeError> {
        let json = serde_json::to_vec(record)
            .map_err(|e| EnvelopeError::InvalidPayload(e.to_string()))?;
        let ciphertext = self.encrypt_bytes(&json)?;
        EncryptedEnvelope::new(ciphertext)
    }

    fn decrypt_blocks(&self, ciphertext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        let (key, iv) = (self.secret.key.as_slice(), &self.secret.iv[..]);
        let result = match key.len() {
            16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(invalid_length)?
                .decrypt_padded_vec_mut::<NoPadding>(ciphertext),
            24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
                .map_err(invalid_length)?
                .decrypt_padded_vec_mut::<NoPadding>(ciphertext),
            _ => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(invalid_length)?
                .decrypt_padded_vec_mut::<NoPadding>(ciphertext),
        };
        result.map_err(|_| EnvelopeError::Decryption)
    }

    fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        let (key, iv) = (self.secret.key.as_slice(), &self.secret.iv[..]);
        let ciphertext = match key.len() {
            16 => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(invalid_length)?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            24 => cbc::Encryptor::<Aes192>::new_from_slices(key, iv)
                .map_err(invalid_length)?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            _ => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(invalid_length)?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        };
        Ok(ciphertext)
    }
}

/// Remove trailing padding markers: all trailing `0x00`, then all trailing
/// `0x01`, ..., then all trailing `0x0F`.
pub fn strip_pad_markers(mut bytes: &[u8]) -> &[u8] {
    for marker in 0..=MAX_PAD_MARKER {
        while let Some((&last, rest)) = bytes.split_last() {
            if last != marker {
                break;
            }
            bytes = rest;
        }
    }
    bytes
}

fn invalid_length(e: aes::cipher::InvalidLength) -> EnvelopeError {
    EnvelopeError::InvalidKey(e.to_string())
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

//! Symmetric cipher used for consumer secrets and token values.
//!
//! Every opaque string handed out by Grantforge (consumer secrets and all
//! token values) is AES-128-GCM ciphertext under the owning consumer's
//! [`EncryptionKey`], rendered as lowercase hex:
//!
//! ```text
//! hex( nonce[12] || ciphertext || tag[16] )
//! ```
//!
//! The helpers here are plain functions over a key; there is no shared
//! cipher state.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::Aes128Gcm;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of an encryption key in bytes (AES-128).
pub const KEY_LEN: usize = 16;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Error type for cipher operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// The key material is not a 32-character hex string.
    #[error("invalid encryption key: {message}")]
    InvalidKey { message: String },

    /// The ciphertext is not hex or is too short to hold a nonce and tag.
    #[error("malformed ciphertext: {message}")]
    MalformedCiphertext { message: String },

    /// The cipher refused to encrypt the plaintext.
    #[error("encryption failed")]
    Encryption,

    /// Authentication failed: wrong key or tampered ciphertext.
    #[error("decryption failed")]
    Decryption,

    /// The decrypted bytes are not valid UTF-8.
    #[error("decrypted value is not valid UTF-8")]
    InvalidUtf8,
}

/// A consumer's symmetric encryption key.
///
/// Displayed and parsed as 32 lowercase hex characters. The key bytes are
/// zeroed on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Wrap raw key bytes.
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a key from its 32-character hex form.
    pub fn from_hex(encoded: &str) -> Result<Self, CipherError> {
        let bytes = hex::decode(encoded).map_err(|e| CipherError::InvalidKey {
            message: format!("not hex: {}", e),
        })?;
        let bytes: [u8; KEY_LEN] =
            bytes
                .try_into()
                .map_err(|v: Vec<u8>| CipherError::InvalidKey {
                    message: format!("expected {} bytes, got {}", KEY_LEN, v.len()),
                })?;
        Ok(Self(bytes))
    }

    /// Derive a fresh key for the given consumer key.
    ///
    /// The consumer key is hashed together with 32 random bytes, so two
    /// derivations for the same consumer key yield different keys.
    pub fn derive(consumer_key: &str) -> Self {
        let mut salt = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut salt);

        let mut hasher = Sha256::new();
        hasher.update(consumer_key.as_bytes());
        hasher.update(salt);
        let digest = hasher.finalize();
        salt.zeroize();

        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&digest[..KEY_LEN]);
        Self(bytes)
    }

    /// The raw key bytes.
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// The 32-character hex form of the key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

/// Encrypt `plaintext` under `key`, returning hex ciphertext.
pub fn encrypt(plaintext: &str, key: &EncryptionKey) -> Result<String, CipherError> {
    let cipher = Aes128Gcm::new(GenericArray::from_slice(key.as_bytes()));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = GenericArray::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| CipherError::Encryption)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(hex::encode(sealed))
}

/// Decrypt hex ciphertext produced by [`encrypt`].
pub fn decrypt(ciphertext: &str, key: &EncryptionKey) -> Result<String, CipherError> {
    let sealed = hex::decode(ciphertext).map_err(|e| CipherError::MalformedCiphertext {
        message: format!("not hex: {}", e),
    })?;
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(CipherError::MalformedCiphertext {
            message: format!(
                "expected at least {} bytes, got {}",
                NONCE_LEN + TAG_LEN,
                sealed.len()
            ),
        });
    }

    let cipher = Aes128Gcm::new(GenericArray::from_slice(key.as_bytes()));
    let (nonce, body) = sealed.split_at(NONCE_LEN);
    let plaintext = cipher
        .decrypt(GenericArray::from_slice(nonce), body)
        .map_err(|_| CipherError::Decryption)?;

    String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
}

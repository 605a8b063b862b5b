//! Symmetric encryption of token payloads.
//!
//! Pure functions: a payload string goes in, hex ciphertext comes out, and
//! back. The default algorithm and IV are process-wide constants established
//! at startup; callers may override both per call.

use std::sync::LazyLock;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Aes256Gcm, Nonce,
};
use rand::prelude::*;

use crate::error::CipherError;

/// Length in bytes of the initialization vector (an AES-GCM nonce).
pub const IV_LEN: usize = 12;

// Computed once at startup, immutable afterwards, shared by every token this
// process packs. Reuse across tokens is a deliberate simplification.
static DEFAULT_IV: LazyLock<[u8; IV_LEN]> = LazyLock::new(|| {
    let mut iv = [0u8; IV_LEN];
    thread_rng().fill(&mut iv);
    iv
});

/// The process-wide default IV.
///
/// Random per process: when more than one process verifies the same tokens,
/// configure a shared IV explicitly instead.
pub fn default_iv() -> [u8; IV_LEN] {
    *DEFAULT_IV
}

/// Cipher algorithms for token payload encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    #[default]
    Aes256Gcm,
    Aes128Gcm,
}

impl Algorithm {
    /// The exact key length the algorithm requires, in bytes.
    pub fn key_len(&self) -> usize {
        match self {
            Algorithm::Aes256Gcm => 32,
            Algorithm::Aes128Gcm => 16,
        }
    }
}

/// Encrypt `plaintext` under `key` and `iv`, returning hex ciphertext.
pub fn encrypt(
    key: &[u8],
    plaintext: &str,
    algorithm: Algorithm,
    iv: &[u8; IV_LEN],
) -> Result<String, CipherError> {
    let ciphertext = match algorithm {
        Algorithm::Aes256Gcm => Aes256Gcm::new_from_slice(key)
            .map_err(|_| CipherError::KeyLength)?
            .encrypt(Nonce::from_slice(iv), plaintext.as_bytes()),
        Algorithm::Aes128Gcm => Aes128Gcm::new_from_slice(key)
            .map_err(|_| CipherError::KeyLength)?
            .encrypt(Nonce::from_slice(iv), plaintext.as_bytes()),
    }
    .map_err(|_| CipherError::Encrypt)?;

    Ok(hex::encode(ciphertext))
}

/// Decrypt hex `ciphertext` produced by [`encrypt`].
///
/// Fails if the ciphertext was produced under a different key, algorithm, or
/// IV, or is not valid hex.
pub fn decrypt(
    key: &[u8],
    ciphertext: &str,
    algorithm: Algorithm,
    iv: &[u8; IV_LEN],
) -> Result<String, CipherError> {
    let raw = hex::decode(ciphertext).map_err(|_| CipherError::Encoding)?;

    let plaintext = match algorithm {
        Algorithm::Aes256Gcm => Aes256Gcm::new_from_slice(key)
            .map_err(|_| CipherError::KeyLength)?
            .decrypt(Nonce::from_slice(iv), raw.as_ref()),
        Algorithm::Aes128Gcm => Aes128Gcm::new_from_slice(key)
            .map_err(|_| CipherError::KeyLength)?
            .decrypt(Nonce::from_slice(iv), raw.as_ref()),
    }
    .map_err(|_| CipherError::Decrypt)?;

    String::from_utf8(plaintext).map_err(|_| CipherError::Decrypt)
}

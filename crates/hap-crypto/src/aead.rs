//! ChaCha20-Poly1305 session envelope (§4.2).
//!
//! Unlike a typical AEAD wrapper (the teacher's `aead.rs` generates a fresh
//! random nonce per call), HAP-BLE carries no per-fragment nonce on the
//! wire: each direction reconstructs its nonce from a `u64` counter that
//! starts at 0 and increments by one per fragment, encoded little-endian and
//! zero-padded to the cipher's 12-byte nonce size.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

/// A 32-byte ChaCha20-Poly1305 key that zeroizes on drop and never prints
/// its contents, even in debug output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(Error::Core(hap_ble_core::Error::Invalid(format!(
                "session key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            ))));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionKey").field(&"[REDACTED]").finish()
    }
}

/// A one-direction encrypt or decrypt endpoint: a fixed key plus the
/// monotonic fragment counter that derives each fragment's nonce.
#[derive(Debug, Clone)]
pub struct DirectionalKey {
    key: SessionKey,
    counter: u64,
}

impl DirectionalKey {
    pub fn new(key: SessionKey) -> Self {
        Self { key, counter: 0 }
    }

    /// Number of fragments successfully processed in this direction so far.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    fn nonce_for(counter: u64) -> Nonce {
        let mut bytes = [0u8; NONCE_SIZE];
        bytes[..8].copy_from_slice(&counter.to_le_bytes());
        Nonce::clone_from_slice(&bytes)
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.key.0))
    }

    /// Encrypt one fragment under the current counter, then advance it.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Vec<u8> {
        let nonce = Self::nonce_for(self.counter);
        let ciphertext = self
            .cipher()
            .encrypt(&nonce, Payload { msg: plaintext, aad: b"" })
            .expect("ChaCha20-Poly1305 encryption is infallible for valid key/nonce sizes");
        self.counter += 1;
        ciphertext
    }

    /// Decrypt one fragment under the current counter. Advances the counter
    /// only on success: a failure means the session must be torn down and
    /// the counter is no longer meaningful.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Self::nonce_for(self.counter);
        let plaintext = self
            .cipher()
            .decrypt(&nonce, Payload { msg: ciphertext, aad: b"" })
            .map_err(|_| Error::DecryptionFailed)?;
        self.counter += 1;
        Ok(plaintext)
    }
}

/// The pair of directional keys negotiated by a successful pair-verify
/// (§3, `SessionKeys`). `write` encrypts requests; `read` decrypts responses.
#[derive(Debug, Clone)]
pub struct SessionCipher {
    pub write: DirectionalKey,
    pub read: DirectionalKey,
}

impl SessionCipher {
    pub fn new(write_key: SessionKey, read_key: SessionKey) -> Self {
        Self { write: DirectionalKey::new(write_key), read: DirectionalKey::new(read_key) }
    }
}

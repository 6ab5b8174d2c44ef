//! # HAP-BLE Session Cipher
//!
//! The symmetric AEAD envelope applied per GATT fragment after PDU framing
//! (§4.2), plus the labeled HKDF expansion that turns a pair-verify shared
//! secret into the pairing's directional keys (§4.4).

pub mod aead;
pub mod error;
pub mod key_derivation;

pub use aead::{DirectionalKey, SessionCipher, SessionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{Error, Result};
pub use key_derivation::{derive_session_keys, HkdfSha512Deriver, KeyDeriver};

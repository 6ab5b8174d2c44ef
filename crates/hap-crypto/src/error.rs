//! Session cipher errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// AEAD authentication failed on a fragment. Fatal for the session: the
    /// caller must tear the session down, the counters are no longer trusted.
    #[error("decryption failed")]
    DecryptionFailed,

    #[error(transparent)]
    Core(#[from] hap_ble_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

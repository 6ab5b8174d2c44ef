//! GATT transport errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("characteristic has no decryption session but one was required")]
    NoSession,

    #[error("response reassembly exceeded {0} reads without completing")]
    ReassemblyBoundExceeded(usize),

    #[error(transparent)]
    Pdu(#[from] hap_ble_pdu::Error),

    #[error(transparent)]
    Crypto(#[from] hap_ble_crypto::Error),

    #[error(transparent)]
    Core(#[from] hap_ble_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

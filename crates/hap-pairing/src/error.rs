//! Top-level error taxonomy surfaced across the upward API (§7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// No advertisement or GATT peer was reachable within `DISCOVER_TIMEOUT`.
    #[error("accessory not found")]
    AccessoryNotFound,

    /// Connect failure, link drop mid-operation, or a GATT error that
    /// exhausted its retry budget.
    #[error("accessory disconnected: {0}")]
    AccessoryDisconnected(String),

    /// AEAD authentication failure on any fragment.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Pair-verify / pair-pairings returned `kTLVError_Authentication`.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Pair-setup failed.
    #[error("pairing error: {0}")]
    Pairing(String),

    /// Pair-pairings response `State != M2`.
    #[error("invalid error: {0}")]
    Invalid(String),

    /// Pair-pairings returned an unrecognized error code.
    #[error("unknown error: {0}")]
    Unknown(String),

    /// tid mismatch, impossible control byte.
    #[error("protocol desync: {0}")]
    ProtocolDesync(String),

    #[error("malformed PDU: {0}")]
    MalformedPdu(String),

    #[error(transparent)]
    Gatt(#[from] hap_ble_gatt::Error),

    #[error(transparent)]
    Crypto(#[from] hap_ble_crypto::Error),

    #[error(transparent)]
    Tlv8(#[from] hap_ble_tlv8::Error),

    #[error(transparent)]
    Core(#[from] hap_ble_core::Error),
}

impl From<hap_ble_pdu::Error> for Error {
    fn from(err: hap_ble_pdu::Error) -> Self {
        match err {
            hap_ble_pdu::Error::ProtocolDesync(msg) => Error::ProtocolDesync(msg),
            hap_ble_pdu::Error::MalformedPdu(msg) => Error::MalformedPdu(msg),
            hap_ble_pdu::Error::Core(core) => Error::Core(core),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

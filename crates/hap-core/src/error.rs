//! Error taxonomy shared by every HAP-BLE session-core crate.
//!
//! Per-layer crates (`hap-ble-pdu`, `hap-ble-crypto`, `hap-ble-gatt`,
//! `hap-ble-pairing`) define their own `Error` enums and wrap this one with
//! `#[error(transparent)] Core(#[from] hap_ble_core::Error)`. This enum only
//! carries the kinds that have no natural home in a single lower layer.

use thiserror::Error;

/// Errors surfaced across layer boundaries in the HAP-BLE session core.
#[derive(Debug, Error)]
pub enum Error {
    /// No advertisement or GATT peer was reachable within `DISCOVER_TIMEOUT`.
    #[error("accessory not found")]
    AccessoryNotFound,

    /// Connect failure, mid-operation link drop, or a GATT error that
    /// exhausted its retry budget.
    #[error("accessory disconnected: {0}")]
    AccessoryDisconnected(String),

    /// An invariant the caller is responsible for upholding was violated.
    #[error("invalid argument: {0}")]
    Invalid(String),

    /// Catch-all for conditions with no more specific kind.
    #[error("unknown error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, Error>;

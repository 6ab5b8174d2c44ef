//! PDU codec errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A continuation frame's tid didn't match the first fragment's tid, or
    /// a response tid didn't match the outstanding request's tid.
    #[error("protocol desync: {0}")]
    ProtocolDesync(String),

    /// An unrecognized control byte, opcode or status, or a body shorter
    /// than its own header declares.
    #[error("malformed PDU: {0}")]
    MalformedPdu(String),

    #[error(transparent)]
    Core(#[from] hap_ble_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

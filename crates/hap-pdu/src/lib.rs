//! # HAP-BLE PDU Codec
//!
//! Framing, fragmentation and reassembly for HomeKit Accessory Protocol
//! PDUs over BLE GATT (§4.1). A single logical request or response may span
//! several GATT writes/reads; this crate only deals with the framing, not
//! the transport that carries frames over the air (see `hap-ble-gatt`).

pub mod codec;
pub mod error;
pub mod opcode;
pub mod status;

pub use codec::{decode_response_continuation, decode_response_first, encode_request, random_tid};
pub use error::{Error, Result};
pub use opcode::OpCode;
pub use status::PduStatus;

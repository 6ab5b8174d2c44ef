//! # HAP-BLE GATT Transport
//!
//! The abstract GATT client collaborator (§6) and the `ble_request`
//! request/response round-trip built on top of it (§4.3), plus the retry
//! wrapper used across §5/§7.

pub mod client;
pub mod error;
pub mod retry;
pub mod transport;

pub use client::{CharacteristicHandle, GattClient, Notification, ServiceHandle};
pub use error::{Error, Result};
pub use retry::{retry_gatt, DEFAULT_ATTEMPTS, PAIRING_MUTATION_ATTEMPTS};
pub use transport::{ble_request, fragment_size, MIN_MTU};

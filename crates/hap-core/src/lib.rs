//! # HAP-BLE Core
//!
//! Shared error and id vocabulary used by every crate implementing the
//! HomeKit Accessory Protocol over BLE session core.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{Aid, ConfigNum, Iid, SessionId, StateNum};

//! Identifiers shared across the session core.

use serde::{Deserialize, Serialize};

/// Accessory instance id. Unique within an accessory's tree for a given
/// `config_num`; stable across config-num-preserving reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Iid(pub u16);

/// Accessory id. BLE pairings always use `aid == 1` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Aid(pub u16);

impl Aid {
    /// The only accessory id the BLE profile ever uses.
    pub const BLE_ROOT: Aid = Aid(1);
}

impl Default for Aid {
    fn default() -> Self {
        Self::BLE_ROOT
    }
}

/// Accessory-advertised configuration counter. A change invalidates the
/// cached database structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConfigNum(pub u16);

/// Accessory-advertised event counter. A change signals new events emitted
/// while disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateNum(pub u16);

/// A GATT session identifier produced by a successful pair-verify. Opaque
/// to the session core beyond equality and display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aid_defaults_to_ble_root() {
        assert_eq!(Aid::default(), Aid(1));
    }

    #[test]
    fn iid_ordering_is_numeric() {
        assert!(Iid(1) < Iid(2));
    }
}

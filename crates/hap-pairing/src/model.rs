//! Accessory database entities (§3).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use hap_ble_core::{Aid, ConfigNum, Iid, StateNum};

bitflags::bitflags! {
    /// Characteristic permission bits (§3): subset of
    /// `{paired_read, paired_write, timed_write, events, aa, hidden}`.
    #[derive(Serialize, Deserialize)]
    pub struct Permissions: u8 {
        const PAIRED_READ  = 0b0000_0001;
        const PAIRED_WRITE = 0b0000_0010;
        const TIMED_WRITE  = 0b0000_0100;
        const EVENTS       = 0b0000_1000;
        const ADDITIONAL_AUTHORIZATION = 0b0001_0000;
        const HIDDEN       = 0b0010_0000;
    }
}

/// A characteristic's declared value format, when the signature read
/// discloses one. Vendor characteristics may omit it (§4.5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    Bool,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int,
    Float,
    String,
    Tlv8,
    Data,
    Other(u8),
}

/// A characteristic's range/step constraints, as decoded from its
/// signature (§4.5). Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub min_step: Option<f64>,
}

/// One characteristic under a service (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Characteristic {
    pub iid: Iid,
    pub char_type: Uuid,
    pub service_type: Uuid,
    pub perms: Permissions,
    pub format: Option<Format>,
    pub range: Range,
    pub value: Option<serde_json::Value>,
}

impl Characteristic {
    pub fn supports_events(&self) -> bool {
        self.perms.contains(Permissions::EVENTS)
    }

    pub fn supports_paired_read(&self) -> bool {
        self.perms.contains(Permissions::PAIRED_READ)
    }

    pub fn supports_paired_write(&self) -> bool {
        self.perms.contains(Permissions::PAIRED_WRITE)
    }

    pub fn supports_timed_write(&self) -> bool {
        self.perms.contains(Permissions::TIMED_WRITE)
    }
}

/// One service under the accessory (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub iid: Iid,
    pub service_type: Uuid,
    pub characteristics: Vec<Characteristic>,
}

/// The single root accessory (§3, §6: `aid == 1` always).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Accessory {
    pub aid: Aid,
    pub services: Vec<Service>,
}

impl Default for Accessory {
    fn default() -> Self {
        Self { aid: Aid::BLE_ROOT, services: Vec::new() }
    }
}

impl Accessory {
    pub fn find_characteristic(&self, iid: Iid) -> Option<&Characteristic> {
        self.services.iter().flat_map(|s| &s.characteristics).find(|c| c.iid == iid)
    }

    pub fn find_characteristic_mut(&mut self, iid: Iid) -> Option<&mut Characteristic> {
        self.services.iter_mut().flat_map(|s| &mut s.characteristics).find(|c| c.iid == iid)
    }
}

/// The accessory tree paired with the config-num it was fetched under
/// (§3). Replaced atomically on config change; never mutated node-by-node
/// after publication (§5, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessoriesState {
    pub tree: Accessory,
    pub config_num: ConfigNum,
    pub state_num: StateNum,
}

impl AccessoriesState {
    pub fn empty() -> Self {
        Self { tree: Accessory::default(), config_num: ConfigNum(0), state_num: StateNum(0) }
    }

    pub fn is_empty(&self) -> bool {
        self.tree.services.is_empty()
    }
}

/// A subscribed `(aid, iid)` pair (§3). A characteristic may be subscribed
/// only if it advertises the `events` permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub aid: Aid,
    pub iid: Iid,
}

pub type SubscriptionSet = BTreeSet<Subscription>;

/// Externally owned pairing identity/keys (§3). The core treats this as
/// opaque beyond the fields it must read to open a link, and only mutates
/// it via the pair-setup driver's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingData {
    pub accessory_pairing_id: String,
    pub accessory_address: String,
    pub connection: String,
    /// Long-term keys and any other cryptographic identity produced by
    /// pair-setup, serialized opaquely (never interpreted here).
    pub extra: serde_json::Value,
}

impl PairingData {
    pub fn new(accessory_pairing_id: impl Into<String>, accessory_address: impl Into<String>) -> Self {
        Self {
            accessory_pairing_id: accessory_pairing_id.into(),
            accessory_address: accessory_address.into(),
            connection: "BLE".to_string(),
            extra: serde_json::Value::Null,
        }
    }
}

/// Result recorded per-characteristic by `put_characteristics` for
/// characteristics the write attempt could not proceed for (§4.6, §6: "only
/// failures recorded").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResultStatus {
    CantWriteReadOnly,
}

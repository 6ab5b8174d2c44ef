//! Wire constants, timeouts and tunables (§5, §6).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// IID descriptor UUID: value is little-endian u16 (§6).
pub const IID_DESCRIPTOR_UUID: uuid::Uuid = uuid::uuid!("dc46f0fe-81d2-4616-b5d9-6abdd796939a");

/// Service-instance-id pseudo-characteristic UUID, skipped during
/// enumeration (§4.5, §6).
pub const SERVICE_INSTANCE_UUID: uuid::Uuid = uuid::uuid!("e604e95d-a759-4817-87d3-aa005083a0d1");

/// Timed-write TTL byte: `0x1e` (3.0 s) (§4.6, §6).
pub const TIMED_WRITE_TTL_BYTE: u8 = 0x1e;

/// `PairingConfig` collects the timeouts and tunables the controller needs,
/// following the teacher's `honeylink-config` struct-with-`Default` style
/// (`crates/config/src/lib.rs`) but trimmed to protocol constants rather
/// than deployment knobs. Callers that want file-based overrides can
/// `serde`-deserialize this directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// §5: connection attempts before surfacing `AccessoryDisconnectedError`.
    pub max_connect_attempts: usize,
    /// §7: default GATT retry budget.
    pub default_attempts: usize,
    /// §4.6, §9 (Open Question resolution): attempts for `add_pairing` and
    /// `remove_pairing`, generalized from the original's `remove_pairing`-only
    /// override to both pairing-mutation operations.
    pub pairing_mutation_attempts: usize,
    /// §7: no advertisement/peer reachable within this window.
    pub discover_timeout: Duration,
    /// §6: wall-clock since last advertisement before "unavailable".
    pub availability_ttl: Duration,
    /// §4.6: delay before restoring subscriptions after (re)connect.
    pub subscription_restore_delay: Duration,
    /// §9 (Open Question resolution): hard cap on reassembly reads per
    /// `ble_request`, since the spec leaves this unbounded for a
    /// misbehaving peer.
    pub max_reassembly_reads: usize,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            max_connect_attempts: 5,
            default_attempts: hap_ble_gatt::DEFAULT_ATTEMPTS,
            pairing_mutation_attempts: hap_ble_gatt::PAIRING_MUTATION_ATTEMPTS,
            discover_timeout: Duration::from_secs(30),
            availability_ttl: Duration::from_secs(604_800),
            subscription_restore_delay: Duration::from_millis(500),
            max_reassembly_reads: 16,
        }
    }
}

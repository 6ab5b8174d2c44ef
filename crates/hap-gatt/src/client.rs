//! Abstract GATT client (§6 downward API).
//!
//! The session core never talks to a concrete BLE stack; it consumes this
//! trait. §9's design note on "late-binding GATT backend quirks" is
//! resolved here via a single capability (`max_write_without_response_size`)
//! with a `None` default, rather than the teacher's attribute-probing.

use async_trait::async_trait;
use uuid::Uuid;

use hap_ble_core::Result;

/// A characteristic handle as exposed by the underlying GATT stack. Opaque
/// beyond its UUID and write-fragmentation capability; the concrete GATT
/// backend is free to carry additional private fields behind `opaque`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicHandle {
    pub uuid: Uuid,
    /// Service this characteristic belongs to, used by the reconciler
    /// (§4.5) to apply `SKIP_SYNC_SERVICES`.
    pub service_uuid: Uuid,
    /// Backend-reported single-write capability, if the backend exposes
    /// one; `None` means "fall back to `mtu_size - 3`" (§4.3).
    pub max_write_without_response_size: Option<usize>,
    /// Backend-internal handle value, opaque to the session core.
    pub opaque: u64,
}

/// A discovered GATT service and its characteristics (§4.5 enumeration).
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicHandle>,
}

/// One incoming GATT notification. An empty `value` is the HAP-BLE polling
/// hint (§4.6); non-empty payloads are ignored for polling purposes.
#[derive(Debug, Clone)]
pub struct Notification {
    pub value: Vec<u8>,
}

/// The abstract GATT stack collaborator (§6). Implementations wrap a real
/// BLE library (e.g. a `bleak`-equivalent) and must tolerate the link
/// dropping at any suspension point (§5).
#[async_trait]
pub trait GattClient: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
    fn is_connected(&self) -> bool;

    /// Link MTU, clamped by the implementation to at least the HAP-BLE
    /// minimum of 155 (§6).
    fn mtu_size(&self) -> u16;

    async fn services(&self) -> Result<Vec<ServiceHandle>>;

    async fn read_gatt_char(&self, handle: &CharacteristicHandle) -> Result<Vec<u8>>;
    async fn write_gatt_char(&self, handle: &CharacteristicHandle, data: &[u8], with_response: bool) -> Result<()>;

    /// Read the characteristic's iid descriptor (well-known UUID
    /// `DC46F0FE-…`, §4.5). `Ok(None)` if the descriptor is absent.
    async fn read_iid_descriptor(&self, handle: &CharacteristicHandle) -> Result<Option<u16>>;

    /// Start dispatching notifications for `handle` to `sender`. Exactly
    /// one subscription per handle is expected; callers serialize via
    /// `subscription_lock` (§5).
    async fn start_notify(&self, handle: &CharacteristicHandle, sender: tokio::sync::mpsc::UnboundedSender<Notification>) -> Result<()>;

    async fn stop_notify(&self, handle: &CharacteristicHandle) -> Result<()>;
}

//! Pairing controller (§4.6): the public facade. Ensures connection,
//! serializes operations behind the four named locks plus the dedicated
//! subscription lock (§5), runs pair-verify, reconciles the GATT database on
//! config-number changes, and manages notification subscriptions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};

use hap_ble_core::{Aid, ConfigNum, Iid, StateNum};
use hap_ble_crypto::SessionCipher;
use hap_ble_gatt::{ble_request, CharacteristicHandle, GattClient, Notification};
use hap_ble_pdu::OpCode;
use hap_ble_tlv8::TlvList;

use crate::config::{PairingConfig, TIMED_WRITE_TTL_BYTE};
use crate::driver::{additional_parameter_types, char_read, char_write, drive, PairingStateMachine, VerifiedSession};
use crate::error::{Error, Result};
use crate::model::{AccessoriesState, PairingData, Subscription, SubscriptionSet, WriteResultStatus};
use crate::reconciler::{self, SkipSyncServices};
use crate::state::{ControllerState, ControllerStateMachine, TransitionEvent};
use crate::store::PairingDataStore;

mod pairing_tlv {
    pub const TAG_METHOD: u8 = 0x00;
    pub const TAG_IDENTIFIER: u8 = 0x01;
    pub const TAG_PUBLIC_KEY: u8 = 0x03;
    pub const TAG_PERMISSIONS: u8 = 0x0B;
    pub const TAG_STATE: u8 = 0x06;
    pub const TAG_ERROR: u8 = 0x07;
    pub const TAG_SEPARATOR: u8 = 0xFF;

    pub const METHOD_ADD_PAIRING: u8 = 0x03;
    pub const METHOD_REMOVE_PAIRING: u8 = 0x04;
    pub const METHOD_LIST_PAIRINGS: u8 = 0x05;

    pub const STATE_M1: u8 = 0x01;
    pub const STATE_M2: u8 = 0x02;

    pub const ERROR_AUTHENTICATION: u8 = 0x02;
}

/// The characteristic handles the controller needs beyond whatever the
/// reconciler discovers generically: pair-verify, pair-setup, pairings
/// management, and (optionally) identify. Resolved once, by UUID, after the
/// first signature-only fetch.
#[derive(Debug, Clone)]
pub struct ControlCharacteristics {
    pub pair_verify: CharacteristicHandle,
    pub pair_verify_iid: u16,
    pub pairings: CharacteristicHandle,
    pub pairings_iid: u16,
    pub identify: Option<(CharacteristicHandle, u16)>,
}

/// A parsed BLE advertisement, as handed in by the (external) discovery
/// layer (§6 downward API).
#[derive(Debug, Clone)]
pub struct Advertisement {
    pub address: String,
    pub config_num: ConfigNum,
    pub state_num: StateNum,
}

/// Pairing role for `add_pairing` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminRole {
    User,
    Admin,
}

impl AdminRole {
    fn permission_byte(self) -> u8 {
        match self {
            AdminRole::User => 0x00,
            AdminRole::Admin => 0x01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingInfo {
    pub identifier: String,
    pub public_key: Vec<u8>,
    pub permissions: u8,
}

type ConfigChangedCallback = Box<dyn Fn(&AccessoriesState) + Send + Sync>;
type AvailabilityCallback = Box<dyn Fn(bool) + Send + Sync>;
type EventCallback = Box<dyn Fn(Aid, Iid, serde_json::Value) + Send + Sync>;

/// The public facade (§4.6, §6). Generic over the GATT backend and the
/// pairing-data cache hook, matching the teacher's pattern of parameterizing
/// collaborator-facing facades rather than boxing them
/// (`transport::manager::TransportManager` boxes protocols because there
/// can be several at once; here there is exactly one GATT backend per
/// pairing, so a type parameter avoids a needless indirection).
///
/// Long-running operations that spawn background work (`reconnect_soon`,
/// `subscribe`/`restore_subscriptions`'s per-subscription notification
/// pump, `on_notification`) take `self: &Arc<Self>`, so callers must hold
/// the controller behind an `Arc`.
pub struct PairingController<C: GattClient + 'static, S: PairingDataStore + 'static> {
    client: Arc<C>,
    store: Arc<S>,
    alias: String,
    config: PairingConfig,
    control: ControlCharacteristics,
    skip_services: SkipSyncServices,

    state: Mutex<ControllerStateMachine>,

    // Fixed acquisition order: operation ≻ config ≻ connection ≻ ble_request (§5, §9).
    operation_lock: Mutex<()>,
    config_lock: Mutex<()>,
    connection_lock: Mutex<()>,
    ble_request_lock: Mutex<()>,
    subscription_lock: Mutex<()>,

    cipher: Mutex<Option<SessionCipher>>,
    accessories: RwLock<AccessoriesState>,
    subscriptions: Mutex<SubscriptionSet>,

    /// Cached copy of whatever `store` holds under `alias`, loaded once on
    /// first reconciliation and kept in sync thereafter so refresh saves
    /// update it in place rather than overwrite its cryptographic identity
    /// with a blank stub (§6: "externally owned ... persisted externally").
    pairing_data: Mutex<Option<PairingData>>,

    /// Enforces "at most one running, one queued" notification-triggered
    /// poll (§9): a `Semaphore::new(2)` combined with `ble_request_lock`
    /// gives exactly that shape — a third concurrent hint finds both
    /// permits taken and is dropped rather than queued.
    poll_permits: Arc<Semaphore>,

    address: Mutex<String>,
    last_seen: Mutex<Option<Instant>>,
    available: Mutex<bool>,

    config_changed_cb: Mutex<Option<ConfigChangedCallback>>,
    availability_cb: Mutex<Option<AvailabilityCallback>>,
    event_cb: Mutex<Option<EventCallback>>,
}

impl<C: GattClient + 'static, S: PairingDataStore + 'static> PairingController<C, S> {
    pub fn new(client: Arc<C>, store: Arc<S>, alias: impl Into<String>, address: impl Into<String>, control: ControlCharacteristics, config: PairingConfig) -> Self {
        Self {
            client,
            store,
            alias: alias.into(),
            config,
            control,
            skip_services: default_skip_services(),
            state: Mutex::new(ControllerStateMachine::new()),
            operation_lock: Mutex::new(()),
            config_lock: Mutex::new(()),
            connection_lock: Mutex::new(()),
            ble_request_lock: Mutex::new(()),
            subscription_lock: Mutex::new(()),
            cipher: Mutex::new(None),
            accessories: RwLock::new(AccessoriesState::empty()),
            subscriptions: Mutex::new(SubscriptionSet::new()),
            pairing_data: Mutex::new(None),
            poll_permits: Arc::new(Semaphore::new(2)),
            address: Mutex::new(address.into()),
            last_seen: Mutex::new(None),
            available: Mutex::new(true),
            config_changed_cb: Mutex::new(None),
            availability_cb: Mutex::new(None),
            event_cb: Mutex::new(None),
        }
    }

    pub fn on_config_changed(&self, cb: impl Fn(&AccessoriesState) + Send + Sync + 'static) {
        *self.config_changed_cb.lock_blocking() = Some(Box::new(cb));
    }

    pub fn on_availability_changed(&self, cb: impl Fn(bool) + Send + Sync + 'static) {
        *self.availability_cb.lock_blocking() = Some(Box::new(cb));
    }

    pub fn on_event(&self, cb: impl Fn(Aid, Iid, serde_json::Value) + Send + Sync + 'static) {
        *self.event_cb.lock_blocking() = Some(Box::new(cb));
    }

    // ---- connection lifecycle -------------------------------------------------

    #[tracing::instrument(skip(self))]
    async fn ensure_connected(&self) -> Result<()> {
        let _connection_guard = self.connection_lock.lock().await;
        if self.client.is_connected() {
            return Ok(());
        }

        // The link may have dropped while idle; there's no out-of-band
        // link-drop callback, so this is the first chance to notice. Reset
        // from whatever state we're in (the transition table accepts
        // `LinkLost` from every non-disconnected state) so a previous
        // `Verified` doesn't linger and make `is_verified_sync()` lie about
        // a session whose keys are about to be discarded.
        {
            let mut state = self.state.lock().await;
            if state.state() != ControllerState::Disconnected {
                state.transition(TransitionEvent::LinkLost).ok();
            }
        }
        *self.cipher.lock().await = None;

        self.state.lock().await.transition(TransitionEvent::OperationRequested).ok();
        for attempt in 1..=self.config.max_connect_attempts {
            match self.client.connect().await {
                Ok(()) => {
                    self.state.lock().await.transition(TransitionEvent::GattConnectSucceeded).ok();
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "GATT connect attempt failed");
                }
            }
        }
        self.state.lock().await.transition(TransitionEvent::GattConnectFailed).ok();
        Err(Error::AccessoryDisconnected(format!("failed to connect after {} attempts", self.config.max_connect_attempts)))
    }

    /// Schedule a reconnect without blocking the caller. Requires the
    /// controller be held in an `Arc` since it spawns a detached task.
    pub fn reconnect_soon(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = this.ensure_connected().await {
                tracing::warn!(error = %err, "reconnect_soon: connect failed");
            }
        });
    }

    pub async fn close(&self) {
        self.state.lock().await.transition(TransitionEvent::LinkLost).ok();
        *self.cipher.lock().await = None;
        self.subscriptions.lock().await.clear();
        let _ = self.client.disconnect().await;
    }

    #[tracing::instrument(skip(self, machine))]
    async fn run_pair_verify(&self, machine: &mut dyn PairingStateMachine<Output = VerifiedSession>) -> Result<()> {
        let verified = drive(self.client.as_ref(), &self.control.pair_verify, self.control.pair_verify_iid, machine, self.config.max_reassembly_reads).await?;
        let cipher = hap_ble_crypto::derive_session_keys(verified.deriver.as_ref());
        *self.cipher.lock().await = Some(cipher);
        self.state.lock().await.transition(TransitionEvent::PairVerifySucceeded).ok();
        tracing::info!(session_id = ?verified.session_id, "pair-verify succeeded");
        Ok(())
    }

    fn is_verified_sync(&self) -> bool {
        self.state.try_lock().map(|s| s.is_verified()).unwrap_or(false)
    }

    // ---- reconciliation (§4.6) -------------------------------------------------

    /// `populate_accessories_and_characteristics`: ensure connected, fetch or
    /// refresh the GATT database against `config_num`, verify if needed, and
    /// refresh values.
    #[tracing::instrument(skip(self, verify_machine))]
    pub async fn populate_accessories_and_characteristics(
        &self,
        advertised_config_num: ConfigNum,
        force_update: bool,
        verify_machine: Option<&mut dyn PairingStateMachine<Output = VerifiedSession>>,
    ) -> Result<()> {
        let config_guard = match self.config_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) if !force_update => {
                tracing::debug!("reconciliation already in progress, short-circuiting");
                return Ok(());
            }
            Err(_) => self.config_lock.lock().await,
        };
        let _config_guard = config_guard;

        self.ensure_connected().await?;

        let mut cached = {
            let current = self.accessories.read().await;
            if current.is_empty() {
                let mut pairing_data = self.pairing_data.lock().await;
                if pairing_data.is_none() {
                    if let Ok(loaded) = self.store.load_pairing_data(&self.alias).await {
                        *pairing_data = loaded;
                    }
                }
            }
            current.clone()
        };

        let config_changed = cached.config_num != advertised_config_num;
        let mut values_need_refresh = false;

        let _ble_guard = self.ble_request_lock.lock().await;

        if cached.is_empty() || config_changed || force_update {
            let tree = reconciler::discover_signatures(self.client.as_ref(), self.config.max_reassembly_reads).await?;
            cached = AccessoriesState { tree, config_num: advertised_config_num, state_num: cached.state_num };
            values_need_refresh = true;
        }

        if let Some(machine) = verify_machine {
            if !self.is_verified_sync() {
                self.run_pair_verify(machine).await?;
            }
        }

        if values_need_refresh && self.is_verified_sync() {
            let mut cipher_guard = self.cipher.lock().await;
            reconciler::populate_values(self.client.as_ref(), cipher_guard.as_mut(), &mut cached.tree, &self.skip_services, config_changed, self.config.max_reassembly_reads).await?;
            drop(cipher_guard);
            *self.accessories.write().await = cached.clone();

            let address = self.address.lock().await.clone();
            let mut pairing_data = self.pairing_data.lock().await;
            let updated = match pairing_data.take() {
                Some(mut data) => {
                    data.accessory_address = address;
                    data
                }
                None => PairingData::new(&self.alias, address),
            };
            self.store.save_pairing_data(&self.alias, updated.clone()).await.ok();
            *pairing_data = Some(updated);
        } else {
            *self.accessories.write().await = cached.clone();
        }

        if config_changed {
            if let Some(cb) = self.config_changed_cb.lock().await.as_ref() {
                cb(&cached);
            }
        }

        Ok(())
    }

    // ---- advertisement handling (§4.6) -----------------------------------------

    pub async fn on_advertisement(self: &Arc<Self>, adv: Advertisement) {
        let mut address = self.address.lock().await;
        if *address != adv.address {
            *address = adv.address.clone();
            *self.accessories.write().await = AccessoriesState::empty();
            let this = Arc::clone(self);
            tokio::spawn(async move { this.close().await });
        }
        drop(address);

        *self.last_seen.lock().await = Some(Instant::now());
        let was_available = {
            let mut available = self.available.lock().await;
            let was = *available;
            *available = true;
            was
        };
        if !was_available {
            if let Some(cb) = self.availability_cb.lock().await.as_ref() {
                cb(true);
            }
        }

        let cached = self.accessories.read().await.clone();
        if adv.config_num > cached.config_num {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(err) = this.populate_accessories_and_characteristics(adv.config_num, false, None).await {
                    tracing::warn!(error = %err, "advertisement-driven reconciliation failed");
                }
            });
        } else if adv.state_num != cached.state_num {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.poll_subscribed_on_state_change().await });
        }
    }

    async fn poll_subscribed_on_state_change(self: &Arc<Self>) {
        let subs: Vec<Subscription> = self.subscriptions.lock().await.iter().copied().collect();
        for sub in subs {
            if let Err(err) = self.read_and_dispatch(sub.iid).await {
                tracing::warn!(iid = ?sub.iid, error = %err, "disconnected-events poll failed");
            }
        }
    }

    /// Availability flips to unavailable once `availability_ttl` has elapsed
    /// with no advertisement seen. Callers poll this (e.g. on a timer); it
    /// performs no GATT I/O itself.
    pub async fn refresh_availability(&self) {
        let elapsed = self.last_seen.lock().await.map(|t| t.elapsed());
        let stale = elapsed.map(|e| e > self.config.availability_ttl).unwrap_or(false);
        if stale {
            let mut available = self.available.lock().await;
            if *available {
                *available = false;
                if let Some(cb) = self.availability_cb.lock().await.as_ref() {
                    cb(false);
                }
            }
        }
    }

    // ---- upward API: read/write (§6) -------------------------------------------

    pub async fn list_accessories_and_characteristics(&self) -> crate::model::Accessory {
        self.accessories.read().await.tree.clone()
    }

    #[tracing::instrument(skip(self, targets))]
    pub async fn get_characteristics(&self, targets: &[(Aid, Iid)]) -> Result<HashMap<(Aid, Iid), serde_json::Value>> {
        let _op_guard = self.operation_lock.lock().await;
        self.ensure_connected().await?;
        let accessories = self.accessories.read().await;
        let mut out = HashMap::new();
        for &(aid, iid) in targets {
            if let Some(characteristic) = accessories.tree.find_characteristic(iid) {
                if let Some(value) = &characteristic.value {
                    out.insert((aid, iid), value.clone());
                }
            }
        }
        Ok(out)
    }

    #[tracing::instrument(skip(self, writes))]
    pub async fn put_characteristics(&self, writes: &[(Aid, Iid, serde_json::Value)]) -> Result<HashMap<(Aid, Iid), WriteResultStatus>> {
        let _op_guard = self.operation_lock.lock().await;
        self.ensure_connected().await?;
        let _ble_guard = self.ble_request_lock.lock().await;

        let mut failures = HashMap::new();
        for (aid, iid, value) in writes {
            let (handle, format, can_timed, can_paired) = {
                let accessories = self.accessories.read().await;
                match accessories.tree.find_characteristic(*iid) {
                    Some(characteristic) => {
                        let service_uuid = characteristic.service_type;
                        let handle = CharacteristicHandle { uuid: characteristic.char_type, service_uuid, max_write_without_response_size: None, opaque: iid.0 as u64 };
                        (handle, characteristic.format.clone(), characteristic.supports_timed_write(), characteristic.supports_paired_write())
                    }
                    None => {
                        failures.insert((*aid, *iid), WriteResultStatus::CantWriteReadOnly);
                        continue;
                    }
                }
            };

            let encoded = reconciler::encode_value(value, format.as_ref());
            let mut cipher_guard = self.cipher.lock().await;
            let result = if can_timed {
                self.timed_write(&handle, iid.0, &encoded, cipher_guard.as_mut()).await
            } else if can_paired {
                char_write(self.client.as_ref(), cipher_guard.as_mut(), &handle, iid.0, &encoded, self.config.max_reassembly_reads).await.map(|_| ())
            } else {
                failures.insert((*aid, *iid), WriteResultStatus::CantWriteReadOnly);
                continue;
            };

            if let Err(err) = result {
                tracing::warn!(iid = ?iid, error = %err, "characteristic write failed");
                return Err(err);
            }

            let mut accessories = self.accessories.write().await;
            if let Some(characteristic) = accessories.tree.find_characteristic_mut(*iid) {
                characteristic.value = Some(value.clone());
            }
        }
        Ok(failures)
    }

    async fn timed_write(&self, handle: &CharacteristicHandle, iid: u16, value: &[u8], mut cipher: Option<&mut SessionCipher>) -> Result<()> {
        let inner = TlvList::new().push(additional_parameter_types::VALUE, value.to_vec()).push(additional_parameter_types::TTL, vec![TIMED_WRITE_TTL_BYTE]);
        let encoded = hap_ble_tlv8::encode(&inner);
        let mut body = (encoded.len() as u16).to_le_bytes().to_vec();
        body.extend_from_slice(&encoded);

        let (status, _) = ble_request(self.client.as_ref(), cipher.as_deref_mut(), OpCode::CharTimedWrite, handle, iid, Some(&body), self.config.max_reassembly_reads).await?;
        if status != hap_ble_pdu::PduStatus::Success {
            return Err(Error::ProtocolDesync(format!("CHAR_TIMED_WRITE status {}", status.as_u8())));
        }
        let (status, _) = ble_request(self.client.as_ref(), cipher.as_deref_mut(), OpCode::CharExecuteWrite, handle, iid, None, self.config.max_reassembly_reads).await?;
        if status != hap_ble_pdu::PduStatus::Success {
            return Err(Error::ProtocolDesync(format!("CHAR_EXEC_WRITE status {}", status.as_u8())));
        }
        Ok(())
    }

    pub async fn identify(&self) -> Result<()> {
        let _op_guard = self.operation_lock.lock().await;
        self.ensure_connected().await?;
        let Some((handle, iid)) = self.control.identify.clone() else {
            return Err(Error::Invalid("accessory has no identify characteristic".to_string()));
        };
        let _ble_guard = self.ble_request_lock.lock().await;
        char_write(self.client.as_ref(), None, &handle, iid, &[1u8], self.config.max_reassembly_reads).await?;
        Ok(())
    }

    // ---- notification subscriptions (§4.6, §9) ---------------------------------

    pub async fn subscribe(self: &Arc<Self>, requested: SubscriptionSet, handles: impl Fn(Iid) -> Option<CharacteristicHandle>) -> Result<()> {
        let _sub_guard = self.subscription_lock.lock().await;
        let mut current = self.subscriptions.lock().await;
        let fresh: Vec<Subscription> = requested.difference(&current).copied().collect();

        if self.client.is_connected() {
            for sub in &fresh {
                if let Some(handle) = handles(sub.iid) {
                    self.client.start_notify(&handle, self.spawn_notification_pump(sub.iid)).await?;
                }
            }
        }
        current.extend(fresh);
        Ok(())
    }

    pub async fn unsubscribe(&self, requested: &SubscriptionSet, handles: impl Fn(Iid) -> Option<CharacteristicHandle>) -> Result<()> {
        let _sub_guard = self.subscription_lock.lock().await;
        let mut current = self.subscriptions.lock().await;
        for sub in requested {
            if current.remove(sub) {
                if let Some(handle) = handles(sub.iid) {
                    self.client.stop_notify(&handle).await?;
                }
            }
        }
        Ok(())
    }

    /// Schedule subscription restoration after `subscription_restore_delay`
    /// so a transient connect/disconnect flap doesn't churn `start_notify`
    /// calls (§4.6).
    pub fn schedule_subscription_restore(self: &Arc<Self>, handles: impl Fn(Iid) -> Option<CharacteristicHandle> + Send + Sync + 'static) {
        let this = Arc::clone(self);
        let delay = self.config.subscription_restore_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.restore_subscriptions(handles).await;
        });
    }

    async fn restore_subscriptions(self: &Arc<Self>, handles: impl Fn(Iid) -> Option<CharacteristicHandle>) {
        if !self.client.is_connected() {
            return;
        }
        let _sub_guard = self.subscription_lock.lock().await;
        let subs: Vec<Subscription> = self.subscriptions.lock().await.iter().copied().collect();
        for sub in subs {
            if let Some(handle) = handles(sub.iid) {
                if let Err(err) = self.client.start_notify(&handle, self.spawn_notification_pump(sub.iid)).await {
                    tracing::warn!(iid = ?sub.iid, error = %err, "failed to restore subscription");
                }
            }
        }
    }

    /// Build a fresh channel for one subscription's notifications and spawn
    /// the task that drains it into [`on_notification`](Self::on_notification),
    /// tagging each hint with the `iid` it was registered for (the GATT
    /// backend's [`Notification`] carries only the payload, not which
    /// characteristic it came from).
    fn spawn_notification_pump(self: &Arc<Self>, iid: Iid) -> mpsc::UnboundedSender<Notification> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                this.on_notification(iid, notification).await;
            }
        });
        tx
    }

    /// Drive a notification hint (§9: empty payload) through the 2-permit
    /// polling guard. Non-empty payloads are ignored for polling purposes.
    pub async fn on_notification(self: &Arc<Self>, iid: Iid, notification: Notification) {
        if !notification.value.is_empty() {
            return;
        }
        let Ok(permit) = Arc::clone(&self.poll_permits).try_acquire_owned() else {
            tracing::debug!(iid = ?iid, "notification poll dropped: two already in flight");
            return;
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(err) = this.read_and_dispatch(iid).await {
                tracing::warn!(iid = ?iid, error = %err, "notification-triggered read failed");
            }
        });
    }

    async fn read_and_dispatch(&self, iid: Iid) -> Result<()> {
        let _ble_guard = self.ble_request_lock.lock().await;
        let handle = {
            let accessories = self.accessories.read().await;
            match accessories.tree.find_characteristic(iid) {
                Some(characteristic) => CharacteristicHandle { uuid: characteristic.char_type, service_uuid: characteristic.service_type, max_write_without_response_size: None, opaque: iid.0 as u64 },
                None => return Ok(()),
            }
        };
        let mut cipher_guard = self.cipher.lock().await;
        let raw = char_read(self.client.as_ref(), cipher_guard.as_mut(), &handle, iid.0, self.config.max_reassembly_reads).await?;
        drop(cipher_guard);

        let format = self.accessories.read().await.tree.find_characteristic(iid).and_then(|c| c.format.clone());
        let value = reconciler::decode_value(&raw, format.as_ref());

        {
            let mut accessories = self.accessories.write().await;
            if let Some(characteristic) = accessories.tree.find_characteristic_mut(iid) {
                characteristic.value = Some(value.clone());
            }
        }
        if let Some(cb) = self.event_cb.lock().await.as_ref() {
            cb(Aid::BLE_ROOT, iid, value);
        }
        Ok(())
    }

    // ---- pairing management (§4.6) ---------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn list_pairings(&self) -> Result<Vec<PairingInfo>> {
        let _op_guard = self.operation_lock.lock().await;
        self.ensure_connected().await?;
        let _ble_guard = self.ble_request_lock.lock().await;

        let request = TlvList::new().push(pairing_tlv::TAG_STATE, vec![pairing_tlv::STATE_M1]).push(pairing_tlv::TAG_METHOD, vec![pairing_tlv::METHOD_LIST_PAIRINGS]);
        let decoded = self.pairing_mutation_roundtrip(request, self.config.default_attempts).await?;
        Ok(decode_pairings(&decoded))
    }

    #[tracing::instrument(skip(self, ltpk_hex))]
    pub async fn add_pairing(&self, identifier: &str, ltpk_hex: &str, role: AdminRole) -> Result<()> {
        let _op_guard = self.operation_lock.lock().await;
        self.ensure_connected().await?;
        let _ble_guard = self.ble_request_lock.lock().await;

        let ltpk = hex_decode(ltpk_hex);
        let request = TlvList::new()
            .push(pairing_tlv::TAG_STATE, vec![pairing_tlv::STATE_M1])
            .push(pairing_tlv::TAG_METHOD, vec![pairing_tlv::METHOD_ADD_PAIRING])
            .push(pairing_tlv::TAG_IDENTIFIER, identifier.as_bytes().to_vec())
            .push(pairing_tlv::TAG_PUBLIC_KEY, ltpk)
            .push(pairing_tlv::TAG_PERMISSIONS, vec![role.permission_byte()]);
        self.pairing_mutation_roundtrip(request, self.config.pairing_mutation_attempts).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_pairing(&self, identifier: &str) -> Result<()> {
        let _op_guard = self.operation_lock.lock().await;
        self.ensure_connected().await?;
        let _ble_guard = self.ble_request_lock.lock().await;

        let request = TlvList::new()
            .push(pairing_tlv::TAG_STATE, vec![pairing_tlv::STATE_M1])
            .push(pairing_tlv::TAG_METHOD, vec![pairing_tlv::METHOD_REMOVE_PAIRING])
            .push(pairing_tlv::TAG_IDENTIFIER, identifier.as_bytes().to_vec());
        self.pairing_mutation_roundtrip(request, self.config.pairing_mutation_attempts).await?;
        Ok(())
    }

    async fn pairing_mutation_roundtrip(&self, request: TlvList, attempts: usize) -> Result<TlvList> {
        let encoded = hap_ble_tlv8::encode(&request);
        let mut last_err = None;
        for attempt in 1..=attempts {
            let mut cipher_guard = self.cipher.lock().await;
            match char_write(self.client.as_ref(), cipher_guard.as_mut(), &self.control.pairings, self.control.pairings_iid, &encoded, self.config.max_reassembly_reads).await {
                Ok(response) => {
                    let decoded = hap_ble_tlv8::decode(&response)?;
                    check_pairing_response(&decoded)?;
                    return Ok(decoded);
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "pairing round-trip failed, retrying");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Unknown("pairing round-trip exhausted retries".to_string())))
    }
}

fn check_pairing_response(decoded: &TlvList) -> Result<()> {
    if let Some(code) = decoded.get(pairing_tlv::TAG_ERROR).and_then(|v| v.first()) {
        return Err(if *code == pairing_tlv::ERROR_AUTHENTICATION {
            Error::Authentication(format!("pair-pairings returned error code {code}"))
        } else {
            Error::Unknown(format!("pair-pairings returned error code {code}"))
        });
    }
    match decoded.get(pairing_tlv::TAG_STATE) {
        Some([pairing_tlv::STATE_M2]) => Ok(()),
        other => Err(Error::Invalid(format!("pair-pairings response state {other:?}, expected M2"))),
    }
}

fn decode_pairings(decoded: &TlvList) -> Vec<PairingInfo> {
    let mut pairings = Vec::new();
    let mut identifier = None;
    let mut public_key = Vec::new();
    let mut permissions = 0u8;

    for item in &decoded.0 {
        match item.tag {
            pairing_tlv::TAG_SEPARATOR => {
                if let Some(id) = identifier.take() {
                    pairings.push(PairingInfo { identifier: id, public_key: std::mem::take(&mut public_key), permissions });
                }
                permissions = 0;
            }
            pairing_tlv::TAG_IDENTIFIER => identifier = Some(String::from_utf8_lossy(&item.value).into_owned()),
            pairing_tlv::TAG_PUBLIC_KEY => public_key = item.value.clone(),
            pairing_tlv::TAG_PERMISSIONS => permissions = item.value.first().copied().unwrap_or(0),
            _ => {}
        }
    }
    if let Some(id) = identifier {
        pairings.push(PairingInfo { identifier: id, public_key, permissions });
    }
    pairings
}

fn hex_decode(s: &str) -> Vec<u8> {
    (0..s.len()).step_by(2).filter_map(|i| s.get(i..i + 2).and_then(|byte| u8::from_str_radix(byte, 16).ok())).collect()
}

/// §4.5 **[SUPPLEMENT]** named service-type UUIDs. Real HAP service-type
/// UUIDs are `0000XXXX-0000-1000-8000-0026BB765291`-shaped; short forms
/// shown for readability.
fn default_skip_services() -> SkipSyncServices {
    SkipSyncServices {
        thread_transport: uuid::uuid!("00000701-0000-1000-8000-0026bb765291"),
        pairing: uuid::uuid!("00000055-0000-1000-8000-0026bb765291"),
        transfer_transport_management: uuid::uuid!("00000099-0000-1000-8000-0026bb765291"),
        accessory_information: uuid::uuid!("0000003e-0000-1000-8000-0026bb765291"),
    }
}

/// Sync-context helper used only for registering callbacks before the
/// controller is shared; panics if the lock is contended, which it never is
/// at construction time.
trait LockBlocking<T> {
    fn lock_blocking(&self) -> tokio::sync::MutexGuard<'_, T>;
}

impl<T> LockBlocking<T> for Mutex<T> {
    fn lock_blocking(&self) -> tokio::sync::MutexGuard<'_, T> {
        self.try_lock().expect("callback registration must not race controller use")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_pairings_splits_on_separator() {
        let list = TlvList(vec![
            hap_ble_tlv8::TlvItem::new(pairing_tlv::TAG_STATE, vec![pairing_tlv::STATE_M2]),
            hap_ble_tlv8::TlvItem::new(pairing_tlv::TAG_IDENTIFIER, b"alice".to_vec()),
            hap_ble_tlv8::TlvItem::new(pairing_tlv::TAG_PUBLIC_KEY, vec![1, 2, 3]),
            hap_ble_tlv8::TlvItem::new(pairing_tlv::TAG_PERMISSIONS, vec![1]),
            hap_ble_tlv8::TlvItem::new(pairing_tlv::TAG_SEPARATOR, vec![]),
            hap_ble_tlv8::TlvItem::new(pairing_tlv::TAG_IDENTIFIER, b"bob".to_vec()),
            hap_ble_tlv8::TlvItem::new(pairing_tlv::TAG_PUBLIC_KEY, vec![4, 5, 6]),
            hap_ble_tlv8::TlvItem::new(pairing_tlv::TAG_PERMISSIONS, vec![0]),
        ]);
        let pairings = decode_pairings(&list);
        assert_eq!(pairings.len(), 2);
        assert_eq!(pairings[0].identifier, "alice");
        assert_eq!(pairings[0].permissions, 1);
        assert_eq!(pairings[1].identifier, "bob");
        assert_eq!(pairings[1].public_key, vec![4, 5, 6]);
    }

    #[test]
    fn check_pairing_response_accepts_m2() {
        let list = TlvList::new().push(pairing_tlv::TAG_STATE, vec![pairing_tlv::STATE_M2]);
        assert!(check_pairing_response(&list).is_ok());
    }

    #[test]
    fn check_pairing_response_maps_authentication_error() {
        let list = TlvList::new().push(pairing_tlv::TAG_ERROR, vec![pairing_tlv::ERROR_AUTHENTICATION]);
        assert!(matches!(check_pairing_response(&list), Err(Error::Authentication(_))));
    }

    #[test]
    fn check_pairing_response_maps_unknown_error() {
        let list = TlvList::new().push(pairing_tlv::TAG_ERROR, vec![0x05]);
        assert!(matches!(check_pairing_response(&list), Err(Error::Unknown(_))));
    }

    #[test]
    fn check_pairing_response_rejects_non_m2_state() {
        let list = TlvList::new().push(pairing_tlv::TAG_STATE, vec![pairing_tlv::STATE_M1]);
        assert!(matches!(check_pairing_response(&list), Err(Error::Invalid(_))));
    }
}

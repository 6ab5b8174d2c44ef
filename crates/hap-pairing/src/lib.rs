//! # HAP-BLE Pairing Controller
//!
//! Session-level orchestration on top of `hap-ble-gatt`: pair-setup/verify
//! drivers, GATT database reconciliation, the validated controller state
//! machine, the opaque pairing-data store hook, and the public
//! `PairingController` facade (§4.4-§4.6, §6).

pub mod config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod model;
pub mod reconciler;
pub mod state;
pub mod store;

pub use config::PairingConfig;
pub use controller::{AdminRole, Advertisement, ControlCharacteristics, PairingController, PairingInfo};
pub use driver::{drive, char_read, char_sig_read, char_write, PairingIdentity, PairingStateMachine, StepResult, TlvError, VerifiedSession};
pub use error::{Error, Result};
pub use model::{
    Accessory, AccessoriesState, Characteristic, Format, PairingData, Permissions, Range, Service, Subscription, SubscriptionSet,
    WriteResultStatus,
};
pub use reconciler::SkipSyncServices;
pub use state::{ControllerState, ControllerStateMachine, TransitionEvent};
pub use store::{InMemoryPairingDataStore, PairingDataStore};

//! Opaque pairing-data persistence hooks (§6: "the core calls opaque
//! `load`/`save` hooks"), grounded in `session-orchestrator/persistence.rs`'s
//! `SessionStore` trait + in-memory implementation shape.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;
use crate::model::PairingData;

/// External pairing-data cache hook (§6). The core treats `alias` as an
/// opaque key chosen by the caller (typically the accessory's pairing id)
/// and never interprets `PairingData` beyond round-tripping it.
#[async_trait]
pub trait PairingDataStore: Send + Sync {
    async fn load_pairing_data(&self, alias: &str) -> Result<Option<PairingData>>;
    async fn save_pairing_data(&self, alias: &str, data: PairingData) -> Result<()>;
}

/// In-memory store for tests and single-process use.
///
/// NOTE: not durable across process restarts; real deployments wire in a
/// file- or database-backed implementation of [`PairingDataStore`].
#[derive(Default)]
pub struct InMemoryPairingDataStore {
    entries: Mutex<HashMap<String, PairingData>>,
}

impl InMemoryPairingDataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PairingDataStore for InMemoryPairingDataStore {
    async fn load_pairing_data(&self, alias: &str) -> Result<Option<PairingData>> {
        Ok(self.entries.lock().unwrap().get(alias).cloned())
    }

    async fn save_pairing_data(&self, alias: &str, data: PairingData) -> Result<()> {
        self.entries.lock().unwrap().insert(alias.to_string(), data);
        Ok(())
    }
}

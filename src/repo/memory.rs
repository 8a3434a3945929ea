use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Snapshot, Storage, StorageError};
use crate::domain::{Client, ClientId, Device, DeviceId, Transformer, TransformerId, Zone};
use crate::ledger::StateTransition;

#[derive(Debug, Default)]
struct Records {
    clients: Vec<Client>,
    devices: HashMap<DeviceId, Device>,
    zones: Vec<Zone>,
    transformers: Vec<Transformer>,
    ledger: HashMap<DeviceId, Vec<StateTransition>>,
}

/// Storage backed by process memory, seeded from a [`Snapshot`]
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: RwLock<Records>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, StorageError> {
        snapshot.check_integrity()?;

        let mut ledger: HashMap<DeviceId, Vec<StateTransition>> = HashMap::new();
        for entry in snapshot.ledger {
            ledger.entry(entry.device).or_default().push(entry);
        }
        for entries in ledger.values_mut() {
            // Stable: equal timestamps keep their file order
            entries.sort_by_key(|e| e.timestamp);
        }

        let records = Records {
            clients: snapshot.clients,
            devices: snapshot.devices.into_iter().map(|d| (d.id, d)).collect(),
            zones: snapshot.zones,
            transformers: snapshot.transformers,
            ledger,
        };
        debug!(
            clients = records.clients.len(),
            devices = records.devices.len(),
            zones = records.zones.len(),
            transformers = records.transformers.len(),
            "memory storage seeded"
        );
        Ok(Self {
            records: RwLock::new(records),
        })
    }

    /// Current contents as a snapshot
    pub async fn snapshot(&self) -> Snapshot {
        let records = self.records.read().await;
        let mut devices: Vec<Device> = records.devices.values().cloned().collect();
        devices.sort_by_key(|d| d.id);
        let mut ledger: Vec<StateTransition> =
            records.ledger.values().flatten().copied().collect();
        ledger.sort_by_key(|e| (e.device, e.timestamp));

        Snapshot {
            clients: records.clients.clone(),
            devices,
            zones: records.zones.clone(),
            transformers: records.transformers.clone(),
            ledger,
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load_clients(&self) -> Result<Vec<Client>, StorageError> {
        Ok(self.records.read().await.clients.clone())
    }

    async fn load_client(&self, client: ClientId) -> Result<Client, StorageError> {
        self.records
            .read()
            .await
            .clients
            .iter()
            .find(|c| c.id == client)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("client {client}")))
    }

    async fn load_devices(&self, client: ClientId) -> Result<Vec<Device>, StorageError> {
        let records = self.records.read().await;
        let owner = records
            .clients
            .iter()
            .find(|c| c.id == client)
            .ok_or_else(|| StorageError::NotFound(format!("client {client}")))?;
        Ok(owner
            .devices
            .iter()
            .filter_map(|id| records.devices.get(id).cloned())
            .collect())
    }

    async fn load_device(&self, device: DeviceId) -> Result<Device, StorageError> {
        self.records
            .read()
            .await
            .devices
            .get(&device)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("device {device}")))
    }

    async fn load_zones_and_transformers(
        &self,
    ) -> Result<(Vec<Zone>, Vec<Transformer>), StorageError> {
        let records = self.records.read().await;
        Ok((records.zones.clone(), records.transformers.clone()))
    }

    async fn save_assignment(
        &self,
        client: ClientId,
        transformer: Option<TransformerId>,
    ) -> Result<(), StorageError> {
        let mut records = self.records.write().await;
        let slot = records
            .clients
            .iter_mut()
            .find(|c| c.id == client)
            .ok_or_else(|| StorageError::NotFound(format!("client {client}")))?;
        slot.transformer = transformer;
        Ok(())
    }

    async fn load_ledger_entries(
        &self,
        device: DeviceId,
    ) -> Result<Vec<StateTransition>, StorageError> {
        Ok(self
            .records
            .read()
            .await
            .ledger
            .get(&device)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_ledger_entry(&self, entry: StateTransition) -> Result<(), StorageError> {
        let mut records = self.records.write().await;
        let device = records
            .devices
            .get_mut(&entry.device)
            .ok_or_else(|| StorageError::NotFound(format!("device {}", entry.device)))?;
        device.state = entry.state;
        records.ledger.entry(entry.device).or_default().push(entry);
        Ok(())
    }
}

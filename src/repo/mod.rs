//! Persistence collaborator.
//!
//! The core keeps its working set in memory; [`Storage`] is where clients,
//! devices, the zone/transformer layout and ledger entries are loaded from and
//! where assignments and new ledger entries are written back.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Client, ClientId, Device, DeviceId, Transformer, TransformerId, Zone};
use crate::ledger::StateTransition;

pub mod memory;
pub mod snapshot;

pub use memory::MemoryStorage;
pub use snapshot::Snapshot;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Integrity error: {0}")]
    Integrity(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    async fn load_clients(&self) -> Result<Vec<Client>, StorageError>;

    async fn load_client(&self, client: ClientId) -> Result<Client, StorageError>;

    /// Devices owned by `client`, in the client's listing order
    async fn load_devices(&self, client: ClientId) -> Result<Vec<Device>, StorageError>;

    async fn load_device(&self, device: DeviceId) -> Result<Device, StorageError>;

    async fn load_zones_and_transformers(&self)
        -> Result<(Vec<Zone>, Vec<Transformer>), StorageError>;

    async fn save_assignment(
        &self,
        client: ClientId,
        transformer: Option<TransformerId>,
    ) -> Result<(), StorageError>;

    /// Ledger entries of `device` in timestamp order
    async fn load_ledger_entries(&self, device: DeviceId)
        -> Result<Vec<StateTransition>, StorageError>;

    async fn append_ledger_entry(&self, entry: StateTransition) -> Result<(), StorageError>;
}

//! Bulk-loaded records as produced by the ingestion layer.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use super::StorageError;
use crate::domain::{Client, Device, Transformer, Zone};
use crate::ledger::StateTransition;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub clients: Vec<Client>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub transformers: Vec<Transformer>,
    #[serde(default)]
    pub ledger: Vec<StateTransition>,
}

impl Snapshot {
    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_json(&raw)
    }

    /// Reject dangling references between records
    pub fn check_integrity(&self) -> Result<(), StorageError> {
        let devices: HashSet<_> = self.devices.iter().map(|d| d.id).collect();
        let zones: HashSet<_> = self.zones.iter().map(|z| z.id).collect();
        let transformers: HashSet<_> = self.transformers.iter().map(|t| t.id).collect();

        for client in &self.clients {
            if let Some(missing) = client.devices.iter().find(|d| !devices.contains(d)) {
                return Err(StorageError::Integrity(format!(
                    "client {} lists unknown device {missing}",
                    client.id
                )));
            }
            if let Some(t) = client.transformer.filter(|t| !transformers.contains(t)) {
                return Err(StorageError::Integrity(format!(
                    "client {} is assigned to unknown transformer {t}",
                    client.id
                )));
            }
        }
        for transformer in &self.transformers {
            if let Some(missing) = transformer.zones.iter().find(|z| !zones.contains(z)) {
                return Err(StorageError::Integrity(format!(
                    "transformer {} serves unknown zone {missing}",
                    transformer.id
                )));
            }
        }
        if let Some(entry) = self.ledger.iter().find(|e| !devices.contains(&e.device)) {
            return Err(StorageError::Integrity(format!(
                "ledger entry for unknown device {}",
                entry.device
            )));
        }
        Ok(())
    }
}

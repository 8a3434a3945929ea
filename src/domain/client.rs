use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DeviceId, GeoPoint, TransformerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Household owning devices and fed by at most one transformer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub position: GeoPoint,
    #[serde(default)]
    pub devices: Vec<DeviceId>,
    /// Derived by the assignment run, never authoritative
    #[serde(default)]
    pub transformer: Option<TransformerId>,
}

impl Client {
    pub fn new(name: impl Into<String>, position: GeoPoint) -> Self {
        Self {
            id: ClientId::new(),
            name: name.into(),
            position,
            devices: Vec::new(),
            transformer: None,
        }
    }

    pub fn add_device(&mut self, device: DeviceId) {
        if !self.devices.contains(&device) {
            self.devices.push(device);
        }
    }

    pub fn owns(&self, device: DeviceId) -> bool {
        self.devices.contains(&device)
    }
}

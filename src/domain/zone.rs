use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{GeoPoint, Power};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub Uuid);

impl ZoneId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ZoneId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformerId(pub Uuid);

impl TransformerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransformerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransformerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Circular service area
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub center: GeoPoint,
    pub radius_km: f64,
}

impl Zone {
    pub fn new(name: impl Into<String>, center: GeoPoint, radius_km: f64) -> Self {
        Self {
            id: ZoneId::new(),
            name: name.into(),
            center,
            radius_km,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transformer {
    pub id: TransformerId,
    pub position: GeoPoint,
    /// Maximum load the transformer can carry
    pub capacity: Power,
    /// Zones this transformer serves
    #[serde(default)]
    pub zones: Vec<ZoneId>,
}

impl Transformer {
    pub fn new(position: GeoPoint, capacity: Power) -> Self {
        Self {
            id: TransformerId::new(),
            position,
            capacity,
            zones: Vec::new(),
        }
    }

    pub fn serving(mut self, zone: ZoneId) -> Self {
        self.add_zone(zone);
        self
    }

    pub fn add_zone(&mut self, zone: ZoneId) {
        if !self.zones.contains(&zone) {
            self.zones.push(zone);
        }
    }

    pub fn serves(&self, zone: ZoneId) -> bool {
        self.zones.contains(&zone)
    }
}

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::domain::GeoPoint;

/// Mean earth radius (IUGG)
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// How distances between positions are measured. Both metrics return kilometres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Great-circle distance
    #[default]
    Haversine,
    /// Euclidean distance on an equirectangular projection around the mean latitude
    Planar,
}

impl DistanceMetric {
    pub fn distance_km(&self, a: GeoPoint, b: GeoPoint) -> f64 {
        match self {
            Self::Haversine => haversine_km(a, b),
            Self::Planar => planar_km(a, b),
        }
    }
}

pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

pub fn planar_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let mean_lat = ((a.latitude + b.latitude) / 2.0).to_radians();
    let x = (b.longitude - a.longitude).to_radians() * mean_lat.cos();
    let y = (b.latitude - a.latitude).to_radians();
    EARTH_RADIUS_KM * (x * x + y * y).sqrt()
}

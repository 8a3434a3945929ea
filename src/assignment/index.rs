use super::{AssignmentSettings, DistanceMetric};
use crate::domain::{GeoPoint, Transformer, TransformerId, ZoneId};

/// Closest transformer found for a position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub transformer: TransformerId,
    pub distance_km: f64,
}

/// Nearest-neighbour lookup over the transformers serving one zone.
///
/// Implementations must be deterministic: among candidates within the tie
/// epsilon of the best distance, the one supplied first wins.
pub trait TransformerIndex {
    fn nearest(&self, point: GeoPoint) -> Option<Candidate>;

    fn is_empty(&self) -> bool;
}

/// Checks every candidate. Fine for tens to hundreds of transformers per zone.
#[derive(Debug, Clone)]
pub struct LinearScan<'a> {
    candidates: Vec<&'a Transformer>,
    metric: DistanceMetric,
    tie_epsilon_km: f64,
}

impl<'a> LinearScan<'a> {
    /// Index the transformers serving `zone`, keeping their input order
    pub fn for_zone(
        zone: ZoneId,
        transformers: &'a [Transformer],
        settings: &AssignmentSettings,
    ) -> Self {
        Self {
            candidates: transformers.iter().filter(|t| t.serves(zone)).collect(),
            metric: settings.metric,
            tie_epsilon_km: settings.tie_epsilon_km,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl TransformerIndex for LinearScan<'_> {
    fn nearest(&self, point: GeoPoint) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;
        for transformer in &self.candidates {
            let distance_km = self.metric.distance_km(point, transformer.position);
            let better = match best {
                None => true,
                Some(current) => distance_km < current.distance_km - self.tie_epsilon_km,
            };
            if better {
                best = Some(Candidate {
                    transformer: transformer.id,
                    distance_km,
                });
            }
        }
        best
    }

    fn is_empty(&self) -> bool {
        LinearScan::is_empty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Power;

    #[test]
    fn test_only_zone_transformers_are_candidates() {
        let zone = ZoneId::new();
        let other = ZoneId::new();
        let near_other =
            Transformer::new(GeoPoint::new(0.0, 0.0), Power::kilowatts(100.0)).serving(other);
        let far_own =
            Transformer::new(GeoPoint::new(0.5, 0.0), Power::kilowatts(100.0)).serving(zone);
        let transformers = vec![near_other, far_own.clone()];

        let index = LinearScan::for_zone(zone, &transformers, &AssignmentSettings::default());
        assert_eq!(index.len(), 1);
        let hit = index.nearest(GeoPoint::new(0.0, 0.0)).unwrap();
        assert_eq!(hit.transformer, far_own.id);
    }

    #[test]
    fn test_tie_goes_to_first_supplied() {
        let zone = ZoneId::new();
        let east = Transformer::new(GeoPoint::new(0.0, 0.01), Power::kilowatts(1.0)).serving(zone);
        let west = Transformer::new(GeoPoint::new(0.0, -0.01), Power::kilowatts(1.0)).serving(zone);
        let origin = GeoPoint::new(0.0, 0.0);

        let forward = vec![east.clone(), west.clone()];
        let index = LinearScan::for_zone(zone, &forward, &AssignmentSettings::default());
        assert_eq!(index.nearest(origin).unwrap().transformer, east.id);

        let reversed = vec![west.clone(), east];
        let index = LinearScan::for_zone(zone, &reversed, &AssignmentSettings::default());
        assert_eq!(index.nearest(origin).unwrap().transformer, west.id);
    }

    #[test]
    fn test_empty_index() {
        let index = LinearScan::for_zone(ZoneId::new(), &[], &AssignmentSettings::default());
        assert!(index.is_empty());
        assert!(index.nearest(GeoPoint::new(0.0, 0.0)).is_none());
    }
}

//! # Geo-Assignment
//!
//! Binds every client to the nearest transformer serving its zone.
//!
//! The binding is derived data: each run overwrites whatever a client had
//! before. Zones without any serving transformer do not stop the run; their
//! clients are left without a transformer and reported as issues.

pub mod distance;
pub mod index;

pub use distance::*;
pub use index::*;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{Client, ClientId, Transformer, TransformerId, Zone, ZoneId};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssignmentSettings {
    pub metric: DistanceMetric,
    /// Distances closer than this are treated as equal
    pub tie_epsilon_km: f64,
}

impl Default for AssignmentSettings {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::Haversine,
            tie_epsilon_km: 1e-9,
        }
    }
}

/// Non-fatal conditions met during an assignment run
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AssignmentIssue {
    #[error("No transformer available in zone {zone} for client {client}")]
    NoTransformerAvailable { zone: ZoneId, client: ClientId },

    #[error("Client {client} is outside every zone")]
    OutsideAllZones { client: ClientId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub client: ClientId,
    pub zone: Option<ZoneId>,
    pub transformer: Option<TransformerId>,
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentReport {
    pub assignments: Vec<Assignment>,
    pub issues: Vec<AssignmentIssue>,
}

impl AssignmentReport {
    pub fn assigned_count(&self) -> usize {
        self.assignments
            .iter()
            .filter(|a| a.transformer.is_some())
            .count()
    }

    pub fn transformer_for(&self, client: ClientId) -> Option<TransformerId> {
        self.assignments
            .iter()
            .find(|a| a.client == client)
            .and_then(|a| a.transformer)
    }

    fn merge(&mut self, other: AssignmentReport) {
        self.assignments.extend(other.assignments);
        self.issues.extend(other.issues);
    }
}

/// Whether `client` lies inside the circle of `zone`
pub fn in_zone(zone: &Zone, client: &Client, settings: &AssignmentSettings) -> bool {
    settings.metric.distance_km(zone.center, client.position) <= zone.radius_km
}

/// Assign each client of `zone`'s population to its nearest serving transformer.
///
/// Clients outside the zone are not touched.
pub fn assign_nearest(
    zone: &Zone,
    clients: &mut [Client],
    transformers: &[Transformer],
    settings: &AssignmentSettings,
) -> AssignmentReport {
    let index = LinearScan::for_zone(zone.id, transformers, settings);
    let population = clients.iter_mut().filter(|c| in_zone(zone, c, settings));
    assign_with_index(zone, population, &index)
}

/// Same as [`assign_nearest`] over any [`TransformerIndex`]
pub fn assign_with_index<'c, I>(
    zone: &Zone,
    population: impl IntoIterator<Item = &'c mut Client>,
    index: &I,
) -> AssignmentReport
where
    I: TransformerIndex + ?Sized,
{
    let mut report = AssignmentReport::default();

    for client in population {
        match index.nearest(client.position) {
            Some(hit) => {
                debug!(
                    client = %client.id,
                    zone = %zone.id,
                    transformer = %hit.transformer,
                    distance_km = hit.distance_km,
                    "assigned nearest transformer"
                );
                client.transformer = Some(hit.transformer);
                report.assignments.push(Assignment {
                    client: client.id,
                    zone: Some(zone.id),
                    transformer: Some(hit.transformer),
                    distance_km: Some(hit.distance_km),
                });
            }
            None => {
                warn!(client = %client.id, zone = %zone.id, "no transformer available");
                client.transformer = None;
                report.assignments.push(Assignment {
                    client: client.id,
                    zone: Some(zone.id),
                    transformer: None,
                    distance_km: None,
                });
                report.issues.push(AssignmentIssue::NoTransformerAvailable {
                    zone: zone.id,
                    client: client.id,
                });
            }
        }
    }

    report
}

/// Run the assignment over every zone in order.
///
/// A client inside several zones is bound by the first listed zone that has a
/// serving transformer. Clients whose zones have none are reported against the
/// first such zone. Clients outside all zones lose any previous binding.
pub fn assign_all(
    zones: &[Zone],
    clients: &mut [Client],
    transformers: &[Transformer],
    settings: &AssignmentSettings,
) -> AssignmentReport {
    let mut report = AssignmentReport::default();
    let mut handled: HashSet<ClientId> = HashSet::new();
    let mut unserved: HashMap<ClientId, ZoneId> = HashMap::new();

    for zone in zones {
        let index = LinearScan::for_zone(zone.id, transformers, settings);
        let population: Vec<&mut Client> = clients
            .iter_mut()
            .filter(|c| !handled.contains(&c.id) && in_zone(zone, c, settings))
            .collect();

        if index.is_empty() {
            for client in &population {
                unserved.entry(client.id).or_insert(zone.id);
            }
            debug!(zone = %zone.id, waiting = population.len(), "zone has no transformer");
            continue;
        }
        handled.extend(population.iter().map(|c| c.id));

        let zone_report = assign_with_index(zone, population, &index);
        debug!(
            zone = %zone.id,
            candidates = index.len(),
            assigned = zone_report.assigned_count(),
            "zone assignment finished"
        );
        report.merge(zone_report);
    }

    for client in clients.iter_mut().filter(|c| !handled.contains(&c.id)) {
        client.transformer = None;
        let zone = unserved.get(&client.id).copied();
        report.assignments.push(Assignment {
            client: client.id,
            zone,
            transformer: None,
            distance_km: None,
        });
        match zone {
            Some(zone) => {
                warn!(client = %client.id, zone = %zone, "no transformer available");
                report.issues.push(AssignmentIssue::NoTransformerAvailable {
                    zone,
                    client: client.id,
                });
            }
            None => {
                warn!(client = %client.id, "client outside every zone");
                report
                    .issues
                    .push(AssignmentIssue::OutsideAllZones { client: client.id });
            }
        }
    }

    info!(
        zones = zones.len(),
        clients = report.assignments.len(),
        assigned = report.assigned_count(),
        issues = report.issues.len(),
        "transformer assignment finished"
    );
    report
}

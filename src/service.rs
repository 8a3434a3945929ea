//! Glue between storage and the in-memory core.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::assignment::{assign_all, AssignmentReport, AssignmentSettings};
use crate::config::Config;
use crate::domain::{ClientId, DeviceId, DeviceState, Energy, TimeWindow};
use crate::error::{Error, Result};
use crate::ledger::{Ledger, StateTransition};
use crate::optimizer::{
    capacity_plan, usage_plan, AllocationRequest, AllocationResult, AllocationSolver,
    SimplexSolver, UsagePolicy,
};
use crate::reporting::{self, DeviceSummary};
use crate::repo::{Storage, StorageError};

pub struct EnergyService {
    storage: Arc<dyn Storage>,
    ledger: Arc<Ledger>,
    solver: Arc<dyn AllocationSolver>,
    assignment: AssignmentSettings,
    usage: UsagePolicy,
    energy_saving_fraction: f64,
    reassignment: Mutex<()>,
    recording: parking_lot::Mutex<HashMap<DeviceId, Arc<Mutex<()>>>>,
}

impl EnergyService {
    pub fn new(storage: Arc<dyn Storage>, ledger: Arc<Ledger>, cfg: &Config) -> Self {
        Self {
            storage,
            ledger,
            solver: Arc::new(SimplexSolver::new(cfg.solver_settings())),
            assignment: cfg.assignment_settings(),
            usage: cfg.usage_policy(),
            energy_saving_fraction: cfg.ledger.energy_saving_fraction,
            reassignment: Mutex::new(()),
            recording: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Swap the allocation backend
    pub fn with_solver(mut self, solver: Arc<dyn AllocationSolver>) -> Self {
        self.solver = solver;
        self
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Load the stored history of every client's devices into the ledger.
    /// Returns the number of entries loaded.
    pub async fn warm_ledger(&self) -> Result<usize> {
        let mut loaded = 0;
        for client in self.storage.load_clients().await? {
            for &device in &client.devices {
                let entries = self.storage.load_ledger_entries(device).await?;
                loaded += self.ledger.load_history(device, entries)?;
            }
        }
        info!(entries = loaded, "ledger warmed from storage");
        Ok(loaded)
    }

    /// Persist a transition, then record it in the ledger.
    ///
    /// Out-of-order stamps are rejected before storage is touched. A failed
    /// write leaves the ledger as it was, so the same change can be retried.
    /// Changes to one device go through here one at a time.
    pub async fn record_state(
        &self,
        device: DeviceId,
        state: DeviceState,
        at: DateTime<Utc>,
    ) -> Result<StateTransition> {
        let slot = self.recording.lock().entry(device).or_default().clone();
        let _serial = slot.lock().await;

        let entry = self.ledger.prepare_transition(device, state, at)?;
        if let Err(e) = self.storage.append_ledger_entry(entry).await {
            warn!(device = %device, error = %e, "ledger entry not persisted");
            return Err(e.into());
        }
        Ok(self.ledger.record_transition(device, state, at)?)
    }

    /// Apply a client's state change code (`E`, `A` or `S`) to one of its devices
    pub async fn change_device_state(
        &self,
        client: ClientId,
        device: DeviceId,
        code: &str,
        at: DateTime<Utc>,
    ) -> Result<StateTransition> {
        let owner = self.storage.load_client(client).await?;
        if !owner.owns(device) {
            return Err(Error::DeviceNotOwned { client, device });
        }
        let record = self.storage.load_device(device).await?;
        let state = record.state_for_code(code, self.energy_saving_fraction)?;
        self.record_state(device, state, at).await
    }

    /// Rebind every client to its nearest transformer and persist the bindings
    /// that changed. Concurrent calls run one after the other.
    pub async fn reassign_transformers(&self) -> Result<AssignmentReport> {
        let _guard = self.reassignment.lock().await;

        let mut clients = self.storage.load_clients().await?;
        let (zones, transformers) = self.storage.load_zones_and_transformers().await?;
        let previous: HashMap<_, _> = clients.iter().map(|c| (c.id, c.transformer)).collect();

        let report = assign_all(&zones, &mut clients, &transformers, &self.assignment);

        let mut written = 0;
        for assignment in &report.assignments {
            if previous.get(&assignment.client) == Some(&assignment.transformer) {
                continue;
            }
            self.storage
                .save_assignment(assignment.client, assignment.transformer)
                .await?;
            written += 1;
        }
        debug!(changed = written, "assignments persisted");
        Ok(report)
    }

    pub async fn household_consumption(
        &self,
        client: ClientId,
        window: TimeWindow,
    ) -> Result<Energy> {
        let client = self.storage.load_client(client).await?;
        Ok(reporting::household_consumption(&self.ledger, &client, window))
    }

    pub async fn device_report(
        &self,
        client: ClientId,
        window: TimeWindow,
    ) -> Result<Vec<DeviceSummary>> {
        let devices = self.storage.load_devices(client).await?;
        Ok(reporting::device_summaries(&self.ledger, &devices, window))
    }

    /// Monthly usage hours per device within the household energy budget
    pub async fn optimize_usage(&self, client: ClientId) -> Result<AllocationResult> {
        let owner = self.storage.load_client(client).await?;
        let devices = self.storage.load_devices(client).await?;
        self.solve(client, usage_plan(&owner, &devices, &self.usage))
    }

    /// Largest load the client's devices can draw from their transformer
    pub async fn optimize_capacity(&self, client: ClientId) -> Result<AllocationResult> {
        let owner = self.storage.load_client(client).await?;
        let bound = owner
            .transformer
            .ok_or(Error::NoTransformerAssigned(client))?;
        let (_, transformers) = self.storage.load_zones_and_transformers().await?;
        let transformer = transformers
            .iter()
            .find(|t| t.id == bound)
            .ok_or_else(|| StorageError::NotFound(format!("transformer {bound}")))?;
        let devices = self.storage.load_devices(client).await?;
        self.solve(client, capacity_plan(&owner, &devices, transformer))
    }

    /// Usage plan for every client. One client's failure does not stop the others.
    pub async fn optimize_all(&self) -> Result<Vec<(ClientId, Result<AllocationResult>)>> {
        let clients = self.storage.load_clients().await?;
        let mut results = Vec::with_capacity(clients.len());
        for client in clients {
            let outcome = self.optimize_usage(client.id).await;
            results.push((client.id, outcome));
        }
        let solved = results.iter().filter(|(_, r)| r.is_ok()).count();
        info!(clients = results.len(), solved, "usage plans computed");
        Ok(results)
    }

    fn solve(&self, client: ClientId, request: AllocationRequest) -> Result<AllocationResult> {
        match self.solver.solve(&request) {
            Ok(result) => {
                debug!(
                    client = %client,
                    solver = self.solver.name(),
                    iterations = result.iterations,
                    objective = result.objective_value,
                    "allocation solved"
                );
                Ok(result)
            }
            Err(source) => {
                warn!(
                    client = %client,
                    solver = self.solver.name(),
                    error = %source,
                    "allocation failed"
                );
                Err(Error::Allocation { client, source })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Client, Device, GeoPoint, Power, Transformer, TransformerId, Zone};
    use crate::optimizer::OptimizerError;
    use crate::repo::MockStorage;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        client: Client,
        device: Device,
        zone: Zone,
        near: Transformer,
    }

    fn fixture() -> Fixture {
        let zone = Zone::new("Centro", GeoPoint::new(0.0, 0.0), 50.0);
        let near =
            Transformer::new(GeoPoint::new(0.0, 0.01), Power::kilowatts(1.5)).serving(zone.id);
        let mut client = Client::new("Ana", GeoPoint::new(0.0, 0.0));
        let device = Device::new("Heater", Power::kilowatts(2.0)).owned_by(client.id);
        client.add_device(device.id);
        Fixture {
            client,
            device,
            zone,
            near,
        }
    }

    fn service(storage: MockStorage) -> EnergyService {
        EnergyService::new(Arc::new(storage), Arc::new(Ledger::new()), &Config::default())
    }

    #[tokio::test]
    async fn test_reassign_persists_changed_bindings_only() {
        let f = fixture();
        let mut storage = MockStorage::new();
        let clients = vec![f.client.clone()];
        storage
            .expect_load_clients()
            .returning(move || Ok(clients.clone()));
        let layout = (vec![f.zone.clone()], vec![f.near.clone()]);
        storage
            .expect_load_zones_and_transformers()
            .returning(move || Ok(layout.clone()));
        let (client_id, near_id) = (f.client.id, f.near.id);
        storage
            .expect_save_assignment()
            .withf(move |c, t| *c == client_id && *t == Some(near_id))
            .times(1)
            .returning(|_, _| Ok(()));

        let report = service(storage).reassign_transformers().await.unwrap();
        assert_eq!(report.transformer_for(f.client.id), Some(f.near.id));
    }

    #[tokio::test]
    async fn test_reassign_skips_unchanged_binding() {
        let mut f = fixture();
        f.client.transformer = Some(f.near.id);
        let mut storage = MockStorage::new();
        let clients = vec![f.client.clone()];
        storage
            .expect_load_clients()
            .returning(move || Ok(clients.clone()));
        let layout = (vec![f.zone.clone()], vec![f.near.clone()]);
        storage
            .expect_load_zones_and_transformers()
            .returning(move || Ok(layout.clone()));
        storage.expect_save_assignment().never();

        let report = service(storage).reassign_transformers().await.unwrap();
        assert_eq!(report.assigned_count(), 1);
    }

    #[tokio::test]
    async fn test_record_state_surfaces_storage_failure() {
        let f = fixture();
        let mut storage = MockStorage::new();
        storage
            .expect_append_ledger_entry()
            .returning(|_| Err(StorageError::Integrity("disk full".into())));

        let svc = service(storage);
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let err = svc.record_state(f.device.id, f.device.on(), at).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(svc.ledger().current_state(f.device.id), DeviceState::Unknown);
        assert!(svc.ledger().history(f.device.id).is_empty());
    }

    #[tokio::test]
    async fn test_retry_after_failed_persist_records_once() {
        let f = fixture();
        let persisted = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut storage = MockStorage::new();
        let (sink, counter) = (persisted.clone(), calls.clone());
        storage
            .expect_append_ledger_entry()
            .times(2)
            .returning(move |entry| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(StorageError::Integrity("disk full".into()));
                }
                sink.lock().push(entry);
                Ok(())
            });

        let svc = service(storage);
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(svc.record_state(f.device.id, f.device.on(), at).await.is_err());
        let entry = svc.record_state(f.device.id, f.device.on(), at).await.unwrap();

        let history = svc.ledger().history(f.device.id);
        assert_eq!(history.len(), 1);
        assert_eq!(history.transitions(), persisted.lock().as_slice());
        assert_eq!(persisted.lock()[0], entry);
    }

    #[tokio::test]
    async fn test_out_of_order_change_never_reaches_storage() {
        let f = fixture();
        let mut storage = MockStorage::new();
        storage
            .expect_append_ledger_entry()
            .times(1)
            .returning(|_| Ok(()));

        let svc = service(storage);
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        svc.record_state(f.device.id, f.device.on(), at).await.unwrap();
        let err = svc
            .record_state(f.device.id, DeviceState::Off, at - chrono::Duration::minutes(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Ledger(_)));
        assert_eq!(svc.ledger().history(f.device.id).len(), 1);
    }

    #[tokio::test]
    async fn test_change_state_rejects_foreign_device() {
        let f = fixture();
        let mut storage = MockStorage::new();
        let client = f.client.clone();
        storage
            .expect_load_client()
            .returning(move |_| Ok(client.clone()));

        let stranger = DeviceId::new();
        let err = service(storage)
            .change_device_state(f.client.id, stranger, "E", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotOwned { .. }));
    }

    #[tokio::test]
    async fn test_change_state_with_unknown_code() {
        let f = fixture();
        let mut storage = MockStorage::new();
        let client = f.client.clone();
        storage
            .expect_load_client()
            .returning(move |_| Ok(client.clone()));
        let device = f.device.clone();
        storage
            .expect_load_device()
            .returning(move |_| Ok(device.clone()));
        storage.expect_append_ledger_entry().never();

        let err = service(storage)
            .change_device_state(f.client.id, f.device.id, "X", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStateCode(_)));
    }

    #[tokio::test]
    async fn test_capacity_requires_assignment() {
        let f = fixture();
        let mut storage = MockStorage::new();
        let client = f.client.clone();
        storage
            .expect_load_client()
            .returning(move |_| Ok(client.clone()));

        let err = service(storage).optimize_capacity(f.client.id).await.unwrap_err();
        assert!(matches!(err, Error::NoTransformerAssigned(_)));
    }

    #[tokio::test]
    async fn test_capacity_plan_capped_by_transformer() {
        let mut f = fixture();
        f.client.transformer = Some(f.near.id);
        let mut storage = MockStorage::new();
        let client = f.client.clone();
        storage
            .expect_load_client()
            .returning(move |_| Ok(client.clone()));
        let layout = (vec![f.zone.clone()], vec![f.near.clone()]);
        storage
            .expect_load_zones_and_transformers()
            .returning(move || Ok(layout.clone()));
        let devices = vec![f.device.clone()];
        storage
            .expect_load_devices()
            .returning(move |_| Ok(devices.clone()));

        let result = service(storage).optimize_capacity(f.client.id).await.unwrap();
        assert!((result.objective_value - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_capacity_with_missing_transformer_record() {
        let mut f = fixture();
        f.client.transformer = Some(TransformerId::new());
        let mut storage = MockStorage::new();
        let client = f.client.clone();
        storage
            .expect_load_client()
            .returning(move |_| Ok(client.clone()));
        storage
            .expect_load_zones_and_transformers()
            .returning(|| Ok((vec![], vec![])));

        let err = service(storage).optimize_capacity(f.client.id).await.unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_infeasible_usage_plan_reported_per_client() {
        let mut f = fixture();
        // Minimum usage alone exceeds the budget
        f.device = f.device.clone().with_usage_bounds(crate::domain::UsageBounds {
            min_hours: 700.0,
            max_hours: 720.0,
        });
        let mut storage = MockStorage::new();
        let clients = vec![f.client.clone()];
        storage
            .expect_load_clients()
            .returning(move || Ok(clients.clone()));
        let client = f.client.clone();
        storage
            .expect_load_client()
            .returning(move |_| Ok(client.clone()));
        let devices = vec![f.device.clone()];
        storage
            .expect_load_devices()
            .returning(move |_| Ok(devices.clone()));

        let results = service(storage).optimize_all().await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0].1,
            Err(Error::Allocation {
                source: OptimizerError::Infeasible { .. },
                ..
            })
        ));
    }
}

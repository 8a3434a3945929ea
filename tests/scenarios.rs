//! End-to-end scenarios through the public API.

use std::f64::consts::PI;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use energy_manager::assignment::{assign_nearest, AssignmentSettings, EARTH_RADIUS_KM};
use energy_manager::config::Config;
use energy_manager::domain::{
    Client, Device, DeviceState, GeoPoint, Power, StateKind, TimeWindow, Transformer, Zone,
};
use energy_manager::ledger::Ledger;
use energy_manager::optimizer::{
    AllocationRequest, AllocationSolver, LinearConstraint, OptimizerError, SimplexSolver,
    VariableBounds,
};
use energy_manager::repo::{MemoryStorage, Snapshot, Storage};
use energy_manager::service::EnergyService;
use energy_manager::Error;

/// Longitude offset on the equator that lies `km` east of the origin
fn km_east(km: f64) -> f64 {
    km / (EARTH_RADIUS_KM * PI / 180.0)
}

#[test]
fn test_one_minute_at_one_kilowatt() {
    let ledger = Ledger::new();
    let device = Device::new("Heater", Power::watts(1000.0));
    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let t1 = t0 + Duration::seconds(60);

    ledger.record_transition(device.id, device.on(), t0).unwrap();
    let closing = ledger.record_transition(device.id, DeviceState::Off, t1).unwrap();

    let window = TimeWindow::new(t0, t1);
    assert_eq!(ledger.consumption_in_window(device.id, window).as_watt_seconds(), 60_000.0);
    assert_eq!(closing.consumed_in_previous.as_watt_seconds(), 60_000.0);
    assert_eq!(
        ledger
            .intervals_in_state(device.id, StateKind::On, window)
            .collect::<Vec<_>>(),
        vec![window]
    );
}

#[test]
fn test_client_bound_to_closer_transformer() {
    let zone = Zone::new("Z", GeoPoint::new(0.0, 0.0), 10.0);
    let t1 = Transformer::new(GeoPoint::new(0.0, km_east(5.0)), Power::kilowatts(100.0))
        .serving(zone.id);
    let t2 = Transformer::new(GeoPoint::new(0.0, km_east(3.0)), Power::kilowatts(100.0))
        .serving(zone.id);
    let mut clients = vec![Client::new("C", GeoPoint::new(0.0, 0.0))];

    let report = assign_nearest(
        &zone,
        &mut clients,
        &[t1.clone(), t2.clone()],
        &AssignmentSettings::default(),
    );

    assert_eq!(clients[0].transformer, Some(t2.id));
    let distance = report.assignments[0].distance_km.unwrap();
    assert!((distance - 3.0).abs() < 1e-6);
    assert!(report.issues.is_empty());
}

#[test]
fn test_cost_minimisation_at_full_load() {
    // Meeting the full load of 10 at the lowest cost
    let request = AllocationRequest::minimize(vec![2.0, 3.0])
        .subject_to(LinearConstraint::le(vec![1.0, 1.0], 10.0))
        .subject_to(LinearConstraint::ge(vec![1.0, 1.0], 10.0))
        .with_bounds(vec![VariableBounds::new(0.0, 10.0); 2]);

    let result = SimplexSolver::default().solve(&request).unwrap();
    assert!((result.values[0] - 10.0).abs() < 1e-9);
    assert!(result.values[1].abs() < 1e-9);
    assert!((result.objective_value - 20.0).abs() < 1e-9);
}

#[test]
fn test_cost_minimisation_with_ceiling_only() {
    // With only a ceiling, drawing nothing is cheapest
    let request = AllocationRequest::minimize(vec![2.0, 3.0])
        .subject_to(LinearConstraint::le(vec![1.0, 1.0], 10.0))
        .with_bounds(vec![VariableBounds::new(0.0, 10.0); 2]);

    let result = SimplexSolver::default().solve(&request).unwrap();
    assert_eq!(result.values, vec![0.0, 0.0]);
    assert_eq!(result.objective_value, 0.0);
}

#[test]
fn test_contradictory_rows_are_infeasible() {
    let request = AllocationRequest::minimize(vec![1.0])
        .subject_to(LinearConstraint::ge(vec![1.0], 5.0))
        .subject_to(LinearConstraint::le(vec![1.0], 3.0));

    assert!(matches!(
        SimplexSolver::default().solve(&request),
        Err(OptimizerError::Infeasible { .. })
    ));
}

#[tokio::test]
async fn test_service_flow_over_memory_storage() {
    let zone = Zone::new("Centro", GeoPoint::new(0.0, 0.0), 20.0);
    let far =
        Transformer::new(GeoPoint::new(0.0, km_east(8.0)), Power::kilowatts(3.0)).serving(zone.id);
    let near =
        Transformer::new(GeoPoint::new(0.0, km_east(2.0)), Power::kilowatts(3.0)).serving(zone.id);

    let mut client = Client::new("Ana", GeoPoint::new(0.0, 0.0));
    let heater = Device::new("Heater", Power::watts(1000.0)).owned_by(client.id);
    let lamp = Device::new("Lamp", Power::watts(100.0)).owned_by(client.id);
    client.add_device(heater.id);
    client.add_device(lamp.id);
    let client_id = client.id;

    let storage = Arc::new(
        MemoryStorage::from_snapshot(Snapshot {
            clients: vec![client],
            devices: vec![heater.clone(), lamp.clone()],
            zones: vec![zone],
            transformers: vec![far, near.clone()],
            ledger: vec![],
        })
        .unwrap(),
    );
    let service = EnergyService::new(storage.clone(), Arc::new(Ledger::new()), &Config::default());

    let report = service.reassign_transformers().await.unwrap();
    assert_eq!(report.transformer_for(client_id), Some(near.id));
    assert_eq!(storage.load_client(client_id).await.unwrap().transformer, Some(near.id));

    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap();
    service.change_device_state(client_id, heater.id, "E", t0).await.unwrap();
    service
        .change_device_state(client_id, lamp.id, "e", t0 + Duration::minutes(30))
        .await
        .unwrap();
    service
        .change_device_state(client_id, heater.id, "S", t0 + Duration::hours(1))
        .await
        .unwrap();
    service
        .change_device_state(client_id, heater.id, "A", t0 + Duration::hours(2))
        .await
        .unwrap();

    // Out of order: rejected, nothing persisted
    let late = service
        .change_device_state(client_id, heater.id, "E", t0 + Duration::minutes(90))
        .await
        .unwrap_err();
    assert!(matches!(late, Error::Ledger(_)));
    assert_eq!(storage.load_ledger_entries(heater.id).await.unwrap().len(), 3);

    let window = TimeWindow::new(t0, t0 + Duration::hours(2));
    let total = service.household_consumption(client_id, window).await.unwrap();
    // Heater: 1 h at 1000 W, 1 h at 500 W. Lamp: 1.5 h at 100 W
    assert_eq!(total.as_watt_hours(), 1000.0 + 500.0 + 150.0);

    // A fresh service rebuilds the same answer from storage
    let restarted =
        EnergyService::new(storage.clone(), Arc::new(Ledger::new()), &Config::default());
    assert_eq!(restarted.warm_ledger().await.unwrap(), 4);
    assert_eq!(restarted.household_consumption(client_id, window).await.unwrap(), total);

    let capacity = service.optimize_capacity(client_id).await.unwrap();
    assert!((capacity.objective_value - 1.1).abs() < 1e-9);

    let usage = service.optimize_usage(client_id).await.unwrap();
    let heater_hours = usage.value_for(heater.id).unwrap();
    let lamp_hours = usage.value_for(lamp.id).unwrap();
    assert!(1.0 * heater_hours + 0.1 * lamp_hours <= 612.0 + 1e-7);
    assert!((lamp_hours - 720.0).abs() < 1e-7);
}

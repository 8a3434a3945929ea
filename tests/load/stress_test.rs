//! Ledger and service under concurrent load.
//!
//! - Appends for distinct devices proceed in parallel without loss
//! - Racing appends for one device never corrupt its history
//! - Concurrent reassignment runs leave one consistent binding per client

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::task::JoinSet;

use energy_manager::config::Config;
use energy_manager::domain::{
    Client, Device, DeviceId, DeviceState, GeoPoint, Power, TimeWindow, Transformer, Zone,
};
use energy_manager::ledger::Ledger;
use energy_manager::repo::{MemoryStorage, Snapshot, Storage};
use energy_manager::service::EnergyService;

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn alternate(device: &Device, i: i64) -> DeviceState {
    if i % 2 == 0 {
        device.on()
    } else {
        DeviceState::Off
    }
}

async fn parallel_devices(devices: usize, per_device: i64) {
    let ledger = Arc::new(Ledger::new());
    let mut tasks = JoinSet::new();

    for _ in 0..devices {
        let ledger = ledger.clone();
        tasks.spawn(async move {
            let device = Device::new("load", Power::watts(100.0));
            for i in 0..per_device {
                let at = epoch() + Duration::seconds(i);
                ledger
                    .record_transition(device.id, alternate(&device, i), at)
                    .unwrap();
                if i % 64 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            device.id
        });
    }

    let started = Instant::now();
    let mut ids = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        ids.push(joined.unwrap());
    }
    println!("{} appends in {:?}", devices as i64 * per_device, started.elapsed());

    let window = TimeWindow::new(epoch(), epoch() + Duration::seconds(per_device));
    for id in ids {
        let history = ledger.history(id);
        assert_eq!(history.len() as i64, per_device);
        // On for every other second
        let on_seconds = per_device / 2 + per_device % 2;
        let expected = 100.0 * on_seconds as f64;
        assert_eq!(ledger.consumption_in_window(id, window).as_watt_seconds(), expected);
    }
    assert_eq!(ledger.devices().len(), devices);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_devices() {
    parallel_devices(16, 200).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn test_parallel_devices_heavy() {
    parallel_devices(256, 5_000).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_appends_on_one_device() {
    let ledger = Arc::new(Ledger::new());
    let device = Device::new("contended", Power::watts(250.0));
    let clock = Arc::new(AtomicI64::new(0));
    let mut tasks = JoinSet::new();

    for _ in 0..8 {
        let (ledger, clock, device) = (ledger.clone(), clock.clone(), device.clone());
        tasks.spawn(async move {
            let mut accepted = 0usize;
            for _ in 0..250 {
                let tick = clock.fetch_add(1, Ordering::SeqCst);
                let state = alternate(&device, tick);
                // Stamps may reach the ledger out of order; those are rejected
                if ledger
                    .record_transition(device.id, state, epoch() + Duration::seconds(tick))
                    .is_ok()
                {
                    accepted += 1;
                }
            }
            accepted
        });
    }

    let mut accepted = 0;
    while let Some(joined) = tasks.join_next().await {
        accepted += joined.unwrap();
    }

    let history = ledger.history(device.id);
    assert_eq!(history.len(), accepted);
    assert!(history
        .transitions()
        .windows(2)
        .all(|w| w[0].timestamp <= w[1].timestamp));

    // Cached consumption agrees with a from-scratch rebuild
    let rebuilt = Ledger::new();
    rebuilt
        .load_history(device.id, history.transitions().iter().copied())
        .unwrap();
    assert_eq!(rebuilt.history(device.id).transitions(), history.transitions());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reassignment_runs() {
    let zone = Zone::new("Z", GeoPoint::new(0.0, 0.0), 100.0);
    let transformers: Vec<Transformer> = (0..5)
        .map(|i| {
            Transformer::new(GeoPoint::new(0.1 * i as f64, 0.0), Power::kilowatts(100.0))
                .serving(zone.id)
        })
        .collect();
    let clients: Vec<Client> = (0..50)
        .map(|i| Client::new(format!("c{i}"), GeoPoint::new(0.01 * i as f64, 0.02)))
        .collect();

    let storage = Arc::new(
        MemoryStorage::from_snapshot(Snapshot {
            clients,
            zones: vec![zone],
            transformers,
            ..Default::default()
        })
        .unwrap(),
    );
    let service = Arc::new(EnergyService::new(
        storage.clone(),
        Arc::new(Ledger::new()),
        &Config::default(),
    ));

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let service = service.clone();
        tasks.spawn(async move { service.reassign_transformers().await.unwrap() });
    }
    let mut reports = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        reports.push(joined.unwrap());
    }

    assert!(reports.windows(2).all(|w| w[0] == w[1]));
    for client in storage.load_clients().await.unwrap() {
        assert_eq!(client.transformer, reports[0].transformer_for(client.id));
        assert!(client.transformer.is_some());
    }
}

#[tokio::test]
async fn test_unknown_device_reads_are_empty() {
    let ledger = Ledger::new();
    let window = TimeWindow::new(epoch(), epoch() + Duration::days(1));
    let ghost = DeviceId::new();
    assert_eq!(ledger.consumption_in_window(ghost, window).as_watt_seconds(), 0.0);
    assert_eq!(ledger.current_state(ghost), DeviceState::Unknown);
    assert!(ledger.devices().is_empty());
}

//! Consumption reports built on the ledger.

use chrono::Duration;
use itertools::Itertools;
use serde::Serialize;

use crate::domain::{
    Client, Clock, Device, DeviceId, Energy, Power, StateKind, TimeWindow, TransformerId,
};
use crate::ledger::{Ledger, StateIntervals};

/// Look-back used by [`on_intervals_last_month`]
pub const LAST_MONTH_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSummary {
    pub device: DeviceId,
    pub name: String,
    pub consumption: Energy,
    pub seconds_on: f64,
    /// Mean draw over the whole window
    pub average_power: Power,
}

/// Energy used by every device the client lists
pub fn household_consumption(ledger: &Ledger, client: &Client, window: TimeWindow) -> Energy {
    client
        .devices
        .iter()
        .map(|&device| ledger.consumption_in_window(device, window))
        .sum()
}

/// Energy used by the households currently bound to `transformer`
pub fn transformer_consumption(
    ledger: &Ledger,
    transformer: TransformerId,
    clients: &[Client],
    window: TimeWindow,
) -> Energy {
    clients
        .iter()
        .filter(|c| c.transformer == Some(transformer))
        .map(|c| household_consumption(ledger, c, window))
        .sum()
}

/// Consumption per transformer, heaviest first. Unassigned clients are left out.
pub fn transformer_loads(
    ledger: &Ledger,
    clients: &[Client],
    window: TimeWindow,
) -> Vec<(TransformerId, Energy)> {
    clients
        .iter()
        .filter_map(|c| c.transformer.map(|t| (t, household_consumption(ledger, c, window))))
        .into_grouping_map()
        .fold(Energy::ZERO, |acc, _, e| acc + e)
        .into_iter()
        .sorted_by(|(ta, a), (tb, b)| {
            b.as_watt_seconds()
                .total_cmp(&a.as_watt_seconds())
                .then_with(|| ta.cmp(tb))
        })
        .collect()
}

pub fn device_summaries(
    ledger: &Ledger,
    devices: &[Device],
    window: TimeWindow,
) -> Vec<DeviceSummary> {
    let seconds = window.duration_seconds();
    devices
        .iter()
        .map(|device| {
            let consumption = ledger.consumption_in_window(device.id, window);
            let seconds_on = ledger
                .intervals_in_state(device.id, StateKind::On, window)
                .map(|span| span.duration_seconds())
                .sum();
            let average_power = if seconds > 0.0 {
                Power::watts(consumption.as_watt_seconds() / seconds)
            } else {
                Power::ZERO
            };
            DeviceSummary {
                device: device.id,
                name: device.name.clone(),
                consumption,
                seconds_on,
                average_power,
            }
        })
        .collect()
}

/// Intervals `device` spent on during the last thirty days
pub fn on_intervals_last_month(
    ledger: &Ledger,
    device: DeviceId,
    clock: &dyn Clock,
) -> StateIntervals {
    let window = TimeWindow::ending_at(clock.now(), Duration::days(LAST_MONTH_DAYS));
    ledger.intervals_in_state(device, StateKind::On, window)
}

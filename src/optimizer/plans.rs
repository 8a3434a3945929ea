//! Builders turning a client's device set into an [`AllocationRequest`].

use serde::{Deserialize, Serialize};

use super::{AllocationRequest, LinearConstraint, VariableBounds};
use crate::domain::{Client, Device, Transformer, UsageBounds};

/// Limits for the monthly usage plan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsagePolicy {
    /// Energy the household may use in a month
    pub monthly_budget_kwh: f64,
    /// Bounds for devices that carry none of their own
    pub default_bounds: UsageBounds,
}

impl Default for UsagePolicy {
    fn default() -> Self {
        Self {
            monthly_budget_kwh: 612.0,
            default_bounds: UsageBounds::default(),
        }
    }
}

/// Devices of `devices` owned by `client`, in the client's listing order
pub fn owned_devices<'a>(client: &Client, devices: &'a [Device]) -> Vec<&'a Device> {
    client
        .devices
        .iter()
        .filter_map(|id| devices.iter().find(|d| d.id == *id))
        .collect()
}

/// Maximise the total hours of use of the client's devices within the monthly
/// energy budget. One variable per device, in hours.
pub fn usage_plan(client: &Client, devices: &[Device], policy: &UsagePolicy) -> AllocationRequest {
    let owned = owned_devices(client, devices);
    let energy_per_hour: Vec<f64> = owned.iter().map(|d| d.nominal_power.as_kilowatts()).collect();
    let bounds = owned
        .iter()
        .map(|d| {
            let b = d.usage_bounds.unwrap_or(policy.default_bounds);
            VariableBounds::new(b.min_hours, b.max_hours)
        })
        .collect();

    AllocationRequest::maximize(vec![1.0; owned.len()])
        .for_client(client.id, owned.iter().map(|d| d.id).collect())
        .subject_to(
            LinearConstraint::le(energy_per_hour, policy.monthly_budget_kwh)
                .labelled("monthly energy budget"),
        )
        .with_bounds(bounds)
}

/// Maximise the load served to the client's devices without exceeding the
/// transformer capacity. One variable per device, in kW, within `[0, nominal]`.
pub fn capacity_plan(
    client: &Client,
    devices: &[Device],
    transformer: &Transformer,
) -> AllocationRequest {
    let owned = owned_devices(client, devices);
    let bounds = owned
        .iter()
        .map(|d| VariableBounds::new(0.0, d.nominal_power.as_kilowatts()))
        .collect();

    AllocationRequest::maximize(vec![1.0; owned.len()])
        .for_client(client.id, owned.iter().map(|d| d.id).collect())
        .subject_to(
            LinearConstraint::le(vec![1.0; owned.len()], transformer.capacity.as_kilowatts())
                .labelled("transformer capacity"),
        )
        .with_bounds(bounds)
}

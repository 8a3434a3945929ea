//! # Device State Ledger
//!
//! Keeps the append-only history of state transitions for every device and
//! answers consumption and interval queries over it.
//!
//! Appends for one device are serialized behind that device's mutex, since the
//! cached consumption of a new entry is computed from the previous one.
//! Different devices never contend beyond the short map lookup. Queries take a
//! snapshot of the history and release the lock before doing any arithmetic.

pub mod history;

pub use history::*;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{Clock, DeviceId, DeviceState, Energy, StateKind, SystemClock, TimeWindow};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Out of order transition for device {device}: {attempted} is before last recorded {last}")]
    OutOfOrderTransition {
        device: DeviceId,
        last: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },

    #[error("Ledger entry for device {found} cannot be loaded into the history of device {expected}")]
    ForeignEntry { expected: DeviceId, found: DeviceId },
}

pub struct Ledger {
    devices: RwLock<HashMap<DeviceId, Arc<Mutex<DeviceHistory>>>>,
    clock: Arc<dyn Clock>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn entry(&self, device: DeviceId) -> Arc<Mutex<DeviceHistory>> {
        if let Some(existing) = self.devices.read().get(&device) {
            return existing.clone();
        }
        self.devices
            .write()
            .entry(device)
            .or_insert_with(|| Arc::new(Mutex::new(DeviceHistory::new(device))))
            .clone()
    }

    /// Append a transition for `device`.
    ///
    /// An out-of-order timestamp is rejected and the ledger stays unchanged.
    pub fn record_transition(
        &self,
        device: DeviceId,
        state: DeviceState,
        timestamp: DateTime<Utc>,
    ) -> Result<StateTransition, LedgerError> {
        let slot = self.entry(device);
        let mut history = slot.lock();
        match history.record(state, timestamp) {
            Ok(entry) => {
                debug!(
                    device = %device,
                    state = %state.kind(),
                    at = %timestamp,
                    consumed_ws = entry.consumed_in_previous.as_watt_seconds(),
                    "recorded state transition"
                );
                Ok(entry)
            }
            Err(err) => {
                warn!(device = %device, error = %err, "rejected state transition");
                Err(err)
            }
        }
    }

    /// Validate a transition and compute its entry without recording it.
    ///
    /// Callers that persist before committing use this to reject out-of-order
    /// stamps up front; [`record_transition`](Self::record_transition) commits.
    pub fn prepare_transition(
        &self,
        device: DeviceId,
        state: DeviceState,
        timestamp: DateTime<Utc>,
    ) -> Result<StateTransition, LedgerError> {
        let slot = self.devices.read().get(&device).cloned();
        let prepared = match slot {
            Some(slot) => slot.lock().next_entry(state, timestamp),
            None => DeviceHistory::new(device).next_entry(state, timestamp),
        };
        if let Err(err) = &prepared {
            warn!(device = %device, error = %err, "rejected state transition");
        }
        prepared
    }

    /// Append a transition stamped with the ledger clock
    pub fn record_now(
        &self,
        device: DeviceId,
        state: DeviceState,
    ) -> Result<StateTransition, LedgerError> {
        self.record_transition(device, state, self.clock.now())
    }

    /// Replace the history of `device` with `entries` as supplied by storage.
    ///
    /// Cached consumption is recomputed. Nothing is replaced if any entry is out
    /// of order or belongs to another device.
    pub fn load_history<I>(&self, device: DeviceId, entries: I) -> Result<usize, LedgerError>
    where
        I: IntoIterator<Item = StateTransition>,
    {
        let mut rebuilt = DeviceHistory::new(device);
        for entry in entries {
            if entry.device != device {
                return Err(LedgerError::ForeignEntry {
                    expected: device,
                    found: entry.device,
                });
            }
            rebuilt.record(entry.state, entry.timestamp)?;
        }

        let count = rebuilt.len();
        *self.entry(device).lock() = rebuilt;
        debug!(device = %device, entries = count, "loaded ledger history");
        Ok(count)
    }

    /// Snapshot of a device history; empty if the device was never seen
    pub fn history(&self, device: DeviceId) -> DeviceHistory {
        self.devices
            .read()
            .get(&device)
            .map(|slot| slot.lock().clone())
            .unwrap_or_else(|| DeviceHistory::new(device))
    }

    pub fn current_state(&self, device: DeviceId) -> DeviceState {
        self.history(device).current_state()
    }

    pub fn consumption_in_window(&self, device: DeviceId, window: TimeWindow) -> Energy {
        self.history(device).consumption_in_window(window)
    }

    pub fn intervals_in_state(
        &self,
        device: DeviceId,
        kind: StateKind,
        window: TimeWindow,
    ) -> StateIntervals {
        self.history(device).intervals_in_state(kind, window)
    }

    /// Devices with at least one slot in the ledger, in id order
    pub fn devices(&self) -> Vec<DeviceId> {
        let mut ids: Vec<_> = self.devices.read().keys().copied().collect();
        ids.sort();
        ids
    }
}

//! Append-only transition history of a single device.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::LedgerError;
use crate::domain::{DeviceId, DeviceState, Energy, StateKind, TimeWindow};

/// One ledger entry: the device entered `state` at `timestamp`.
///
/// `consumed_in_previous` is the energy drawn during the interval this entry
/// closed, fixed when the entry is written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub device: DeviceId,
    pub state: DeviceState,
    pub timestamp: DateTime<Utc>,
    pub consumed_in_previous: Energy,
}

/// Ordered transitions of one device.
///
/// Cloning is cheap: entries sit behind an `Arc` and are copied only when a
/// clone is appended to while another clone is still alive.
#[derive(Debug, Clone)]
pub struct DeviceHistory {
    device: DeviceId,
    transitions: Arc<Vec<StateTransition>>,
}

impl DeviceHistory {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            transitions: Arc::new(Vec::new()),
        }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.transitions.last().map(|t| t.timestamp)
    }

    /// The entry [`record`](Self::record) would append, without appending it
    pub fn next_entry(
        &self,
        state: DeviceState,
        timestamp: DateTime<Utc>,
    ) -> Result<StateTransition, LedgerError> {
        let consumed_in_previous = match self.transitions.last() {
            Some(last) if timestamp < last.timestamp => {
                return Err(LedgerError::OutOfOrderTransition {
                    device: self.device,
                    last: last.timestamp,
                    attempted: timestamp,
                });
            }
            Some(last) => {
                let closed = TimeWindow::new(last.timestamp, timestamp);
                last.state.power_draw().over_seconds(closed.duration_seconds())
            }
            None => Energy::ZERO,
        };

        Ok(StateTransition {
            device: self.device,
            state,
            timestamp,
            consumed_in_previous,
        })
    }

    /// Append a transition, closing the interval of the previous state.
    ///
    /// Fails without touching the history when `timestamp` precedes the last
    /// recorded one. Equal timestamps are accepted and close a zero-length interval.
    pub fn record(
        &mut self,
        state: DeviceState,
        timestamp: DateTime<Utc>,
    ) -> Result<StateTransition, LedgerError> {
        let entry = self.next_entry(state, timestamp)?;
        Arc::make_mut(&mut self.transitions).push(entry);
        Ok(entry)
    }

    /// State after the last transition, `Unknown` for an empty history
    pub fn current_state(&self) -> DeviceState {
        self.transitions
            .last()
            .map(|t| t.state)
            .unwrap_or(DeviceState::Unknown)
    }

    /// Energy consumed inside `window`.
    ///
    /// The still-open final interval is credited up to the window end.
    pub fn consumption_in_window(&self, window: TimeWindow) -> Energy {
        if window.is_empty() {
            return Energy::ZERO;
        }
        Spans::new(self.transitions.clone(), window.end)
            .filter_map(|(state, span)| {
                span.overlap(&window)
                    .map(|o| state.power_draw().over_seconds(o.duration_seconds()))
            })
            .sum()
    }

    /// Maximal intervals spent in `kind`, clipped to `window`.
    ///
    /// The time before the first transition counts as `Unknown`, matching
    /// [`current_state`](Self::current_state) on an empty history.
    pub fn intervals_in_state(&self, kind: StateKind, window: TimeWindow) -> StateIntervals {
        StateIntervals {
            spans: Spans::new(self.transitions.clone(), window.end).with_lead(window.start),
            kind,
            window,
        }
    }

    /// Sum of the cached per-entry consumption
    pub fn recorded_consumption(&self) -> Energy {
        self.transitions.iter().map(|t| t.consumed_in_previous).sum()
    }
}

/// Walks `(state, [tᵢ, tᵢ₊₁))` pairs; the last interval ends at `open_end`
#[derive(Debug, Clone)]
struct Spans {
    transitions: Arc<Vec<StateTransition>>,
    next: usize,
    open_end: DateTime<Utc>,
    lead: Option<TimeWindow>,
}

impl Spans {
    fn new(transitions: Arc<Vec<StateTransition>>, open_end: DateTime<Utc>) -> Self {
        Self {
            transitions,
            next: 0,
            open_end,
            lead: None,
        }
    }

    /// Start with an `Unknown` span from `start` up to the first transition
    fn with_lead(mut self, start: DateTime<Utc>) -> Self {
        let first = self
            .transitions
            .first()
            .map_or(self.open_end, |t| t.timestamp);
        if start < first {
            self.lead = Some(TimeWindow::new(start, first));
        }
        self
    }
}

impl Iterator for Spans {
    type Item = (DeviceState, TimeWindow);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(lead) = self.lead.take() {
            return Some((DeviceState::Unknown, lead));
        }
        let current = self.transitions.get(self.next)?;
        self.next += 1;
        let end = match self.transitions.get(self.next) {
            Some(following) => following.timestamp,
            None => self.open_end.max(current.timestamp),
        };
        Some((current.state, TimeWindow::new(current.timestamp, end)))
    }
}

/// Lazy, finite sequence of windows during which a device held one state kind.
///
/// Adjacent intervals of the same kind are merged. Clone the iterator to
/// restart it; every clone walks the same snapshot.
#[derive(Debug, Clone)]
pub struct StateIntervals {
    spans: Spans,
    kind: StateKind,
    window: TimeWindow,
}

impl StateIntervals {
    pub fn kind(&self) -> StateKind {
        self.kind
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }
}

impl Iterator for StateIntervals {
    type Item = TimeWindow;

    fn next(&mut self) -> Option<TimeWindow> {
        loop {
            let (state, span) = self.spans.next()?;
            if state.kind() != self.kind || span.is_empty() {
                continue;
            }

            let mut merged = span;
            while let Some((next_state, next_span)) = self.spans.clone().next() {
                if next_span.is_empty() || next_state.kind() == self.kind {
                    self.spans.next();
                    merged.end = merged.end.max(next_span.end);
                } else {
                    break;
                }
            }

            if let Some(clipped) = merged.overlap(&self.window) {
                return Some(clipped);
            }
        }
    }
}

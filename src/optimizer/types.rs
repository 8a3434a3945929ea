use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{LinearConstraint, VariableBounds};
use crate::domain::{ClientId, DeviceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sense {
    #[default]
    Minimize,
    Maximize,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum OptimizerError {
    #[error("Allocation problem is infeasible{}", describe_constraint(.constraint))]
    Infeasible { constraint: Option<usize> },

    #[error("Allocation objective is unbounded{}", describe_variable(.variable))]
    Unbounded { variable: Option<usize> },

    #[error("Solver did not converge within {iterations} pivots")]
    SolverDidNotConverge { iterations: usize },

    #[error("Invalid allocation problem: {0}")]
    InvalidProblem(String),
}

fn describe_constraint(index: &Option<usize>) -> String {
    index.map(|i| format!(" (constraint #{i})")).unwrap_or_default()
}

fn describe_variable(index: &Option<usize>) -> String {
    index.map(|i| format!(" (device #{i})")).unwrap_or_default()
}

/// Linear program over one allocation value per device.
///
/// Built per invocation and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRequest {
    #[serde(default)]
    pub client: Option<ClientId>,
    /// Device behind each variable; empty when the caller works with bare indices
    #[serde(default)]
    pub devices: Vec<DeviceId>,
    #[serde(default)]
    pub sense: Sense,
    pub objective: Vec<f64>,
    #[serde(default)]
    pub constraints: Vec<LinearConstraint>,
    #[serde(default)]
    pub bounds: Vec<VariableBounds>,
}

impl AllocationRequest {
    /// New request with default `[0, ∞)` bounds on every variable
    pub fn new(sense: Sense, objective: Vec<f64>) -> Self {
        let bounds = vec![VariableBounds::default(); objective.len()];
        Self {
            client: None,
            devices: Vec::new(),
            sense,
            objective,
            constraints: Vec::new(),
            bounds,
        }
    }

    pub fn minimize(objective: Vec<f64>) -> Self {
        Self::new(Sense::Minimize, objective)
    }

    pub fn maximize(objective: Vec<f64>) -> Self {
        Self::new(Sense::Maximize, objective)
    }

    pub fn for_client(mut self, client: ClientId, devices: Vec<DeviceId>) -> Self {
        self.client = Some(client);
        self.devices = devices;
        self
    }

    pub fn subject_to(mut self, constraint: LinearConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_bounds(mut self, bounds: Vec<VariableBounds>) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn bound(mut self, variable: usize, bounds: VariableBounds) -> Self {
        if let Some(slot) = self.bounds.get_mut(variable) {
            *slot = bounds;
        }
        self
    }

    pub fn variable_count(&self) -> usize {
        self.objective.len()
    }

    /// Shape and number checks. Empty bound intervals are left to the solver,
    /// which reports them as infeasible.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        let n = self.variable_count();

        if !self.devices.is_empty() && self.devices.len() != n {
            return Err(OptimizerError::InvalidProblem(format!(
                "{} devices for {} objective coefficients",
                self.devices.len(),
                n
            )));
        }
        if self.bounds.len() != n {
            return Err(OptimizerError::InvalidProblem(format!(
                "{} bounds for {} variables",
                self.bounds.len(),
                n
            )));
        }
        if self.objective.iter().any(|c| !c.is_finite()) {
            return Err(OptimizerError::InvalidProblem(
                "objective coefficients must be finite".to_string(),
            ));
        }
        for (i, b) in self.bounds.iter().enumerate() {
            if b.lower.is_nan()
                || b.upper.is_nan()
                || b.lower == f64::INFINITY
                || b.upper == f64::NEG_INFINITY
            {
                return Err(OptimizerError::InvalidProblem(format!(
                    "bounds of variable #{i} are not a usable interval"
                )));
            }
        }
        for (i, c) in self.constraints.iter().enumerate() {
            if c.coefficients.len() != n {
                return Err(OptimizerError::InvalidProblem(format!(
                    "constraint #{i} has {} coefficients, expected {n}",
                    c.coefficients.len()
                )));
            }
            if !c.rhs.is_finite() || c.coefficients.iter().any(|a| !a.is_finite()) {
                return Err(OptimizerError::InvalidProblem(format!(
                    "constraint #{i} has non-finite values"
                )));
            }
        }
        Ok(())
    }

    /// Objective value at `point`
    pub fn evaluate(&self, point: &[f64]) -> f64 {
        self.objective.iter().zip(point).map(|(c, x)| c * x).sum()
    }

    /// Whether `point` satisfies every constraint and bound
    pub fn is_feasible(&self, point: &[f64], tolerance: f64) -> bool {
        point.len() == self.variable_count()
            && self.bounds.iter().zip(point).all(|(b, &x)| b.contains(x, tolerance))
            && self.constraints.iter().all(|c| c.is_satisfied_by(point, tolerance))
    }
}

/// Optimal point and objective value of an [`AllocationRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub client: Option<ClientId>,
    pub devices: Vec<DeviceId>,
    pub values: Vec<f64>,
    pub objective_value: f64,
    /// Pivots performed by the solver, where it reports them
    pub iterations: usize,
}

impl AllocationResult {
    pub fn value_for(&self, device: DeviceId) -> Option<f64> {
        self.devices
            .iter()
            .position(|d| *d == device)
            .and_then(|i| self.values.get(i).copied())
    }
}

/// A linear-programming backend. Pure: no shared mutable state between calls.
pub trait AllocationSolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, request: &AllocationRequest) -> Result<AllocationResult, OptimizerError>;
}

use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    #[strum(serialize = "<=")]
    LessOrEqual,
    #[strum(serialize = ">=")]
    GreaterOrEqual,
    #[strum(serialize = "=")]
    Equal,
}

impl Comparison {
    /// Direction after multiplying both sides by -1
    pub fn flipped(self) -> Self {
        match self {
            Self::LessOrEqual => Self::GreaterOrEqual,
            Self::GreaterOrEqual => Self::LessOrEqual,
            Self::Equal => Self::Equal,
        }
    }

    pub fn holds(self, lhs: f64, rhs: f64, tolerance: f64) -> bool {
        match self {
            Self::LessOrEqual => lhs <= rhs + tolerance,
            Self::GreaterOrEqual => lhs >= rhs - tolerance,
            Self::Equal => (lhs - rhs).abs() <= tolerance,
        }
    }
}

/// One row `Σ aᵢ·xᵢ (<=|>=|=) rhs`, one coefficient per device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    pub coefficients: Vec<f64>,
    pub comparison: Comparison,
    pub rhs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl LinearConstraint {
    pub fn new(coefficients: Vec<f64>, comparison: Comparison, rhs: f64) -> Self {
        Self {
            coefficients,
            comparison,
            rhs,
            label: None,
        }
    }

    pub fn le(coefficients: Vec<f64>, rhs: f64) -> Self {
        Self::new(coefficients, Comparison::LessOrEqual, rhs)
    }

    pub fn ge(coefficients: Vec<f64>, rhs: f64) -> Self {
        Self::new(coefficients, Comparison::GreaterOrEqual, rhs)
    }

    pub fn eq(coefficients: Vec<f64>, rhs: f64) -> Self {
        Self::new(coefficients, Comparison::Equal, rhs)
    }

    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn lhs(&self, point: &[f64]) -> f64 {
        self.coefficients.iter().zip(point).map(|(a, x)| a * x).sum()
    }

    pub fn is_satisfied_by(&self, point: &[f64], tolerance: f64) -> bool {
        self.comparison.holds(self.lhs(point), self.rhs, tolerance)
    }
}

/// Closed interval a single device allocation must stay in. Either end may be infinite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariableBounds {
    pub lower: f64,
    pub upper: f64,
}

impl Default for VariableBounds {
    fn default() -> Self {
        Self::non_negative()
    }
}

impl VariableBounds {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn non_negative() -> Self {
        Self::new(0.0, f64::INFINITY)
    }

    pub fn free() -> Self {
        Self::new(f64::NEG_INFINITY, f64::INFINITY)
    }

    pub fn contains(&self, value: f64, tolerance: f64) -> bool {
        value >= self.lower - tolerance && value <= self.upper + tolerance
    }
}

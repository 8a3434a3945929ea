//! # Two-Phase Simplex
//!
//! Dense tableau simplex for small allocation problems (a handful of devices
//! and constraints per client).
//!
//! The request is first rewritten in standard form: every variable becomes
//! non-negative, every row gets a non-negative right-hand side, and finite
//! upper bounds become extra `<=` rows. Phase 1 minimises the sum of
//! artificial variables to find a feasible basis; phase 2 optimises the
//! real objective from there.
//!
//! Pivoting follows Bland's rule: the entering column is the lowest-index
//! column with a negative reduced cost, and minimum-ratio ties leave by the
//! lowest basic column index. This cannot cycle on degenerate vertices and
//! makes every run on the same input take the same path.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{
    AllocationRequest, AllocationResult, AllocationSolver, Comparison, OptimizerError, Sense,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Pivot budget shared by both phases
    pub max_iterations: usize,
    /// Values within this distance of zero are treated as zero
    pub tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 1e-9,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimplexSolver {
    settings: SolverSettings,
}

impl SimplexSolver {
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }
}

impl AllocationSolver for SimplexSolver {
    fn name(&self) -> &'static str {
        "simplex"
    }

    fn solve(&self, request: &AllocationRequest) -> Result<AllocationResult, OptimizerError> {
        request.validate()?;
        let tol = self.settings.tolerance;
        let form = StandardForm::build(request)?;
        let mut tableau = Tableau::new(&form);
        let mut budget = Budget::new(self.settings.max_iterations);

        if tableau.has_artificials() {
            let phase_one: Vec<f64> = (0..tableau.width)
                .map(|j| if j >= tableau.first_artificial { 1.0 } else { 0.0 })
                .collect();
            let allowed = vec![true; tableau.width];
            // Phase 1 is bounded below by zero, so only the budget can stop it
            tableau
                .optimize(&phase_one, &allowed, &mut budget, tol)
                .map_err(|_| OptimizerError::SolverDidNotConverge {
                    iterations: budget.used,
                })?;

            let residual = tableau.objective(&phase_one);
            if residual > tol * (1.0 + form.rhs_scale) {
                let constraint = tableau.offending_constraint(tol);
                debug!(residual, ?constraint, "phase 1 left artificial variables positive");
                return Err(OptimizerError::Infeasible { constraint });
            }
            tableau.expel_artificials(tol);
        }

        let mut cost = form.cost.clone();
        cost.resize(tableau.width, 0.0);
        let allowed: Vec<bool> = (0..tableau.width).map(|j| j < tableau.first_artificial).collect();
        tableau
            .optimize(&cost, &allowed, &mut budget, tol)
            .map_err(|stop| match stop {
                Stop::Unbounded(column) => OptimizerError::Unbounded {
                    variable: form.variable_of(column),
                },
                Stop::IterationCap => OptimizerError::SolverDidNotConverge {
                    iterations: budget.used,
                },
            })?;

        let values = form.recover(&tableau.structural_values(form.structural));
        let objective_value = request.evaluate(&values);
        debug!(
            variables = values.len(),
            pivots = budget.used,
            objective_value,
            "simplex solved allocation"
        );

        Ok(AllocationResult {
            client: request.client,
            devices: request.devices.clone(),
            values,
            objective_value,
            iterations: budget.used,
        })
    }
}

/// How a request variable is expressed through non-negative columns
#[derive(Debug, Clone, Copy)]
enum Substitution {
    /// `x = offset + y`
    Shifted { column: usize, offset: f64 },
    /// `x = offset - y`
    Mirrored { column: usize, offset: f64 },
    /// `x = y⁺ - y⁻`
    Split { positive: usize, negative: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOrigin {
    Constraint(usize),
    UpperBound,
}

#[derive(Debug, Clone)]
struct StandardRow {
    coefficients: Vec<f64>,
    comparison: Comparison,
    rhs: f64,
    origin: RowOrigin,
}

/// `min cost·y` subject to `rows`, `y >= 0`
#[derive(Debug, Clone)]
struct StandardForm {
    substitutions: Vec<Substitution>,
    structural: usize,
    rows: Vec<StandardRow>,
    cost: Vec<f64>,
    rhs_scale: f64,
}

impl StandardForm {
    fn build(request: &AllocationRequest) -> Result<Self, OptimizerError> {
        let mut substitutions = Vec::with_capacity(request.variable_count());
        let mut structural = 0;
        let mut bound_rows: Vec<(usize, f64)> = Vec::new();

        for bounds in &request.bounds {
            if bounds.lower > bounds.upper {
                return Err(OptimizerError::Infeasible { constraint: None });
            }
            let substitution = if bounds.lower.is_finite() {
                if bounds.upper.is_finite() {
                    bound_rows.push((structural, bounds.upper - bounds.lower));
                }
                Substitution::Shifted {
                    column: structural,
                    offset: bounds.lower,
                }
            } else if bounds.upper.is_finite() {
                Substitution::Mirrored {
                    column: structural,
                    offset: bounds.upper,
                }
            } else {
                structural += 1;
                Substitution::Split {
                    positive: structural - 1,
                    negative: structural,
                }
            };
            structural += 1;
            substitutions.push(substitution);
        }

        let sign = match request.sense {
            Sense::Minimize => 1.0,
            Sense::Maximize => -1.0,
        };
        let mut cost = vec![0.0; structural];
        for (c, sub) in request.objective.iter().zip(&substitutions) {
            let c = sign * c;
            match *sub {
                Substitution::Shifted { column, .. } => cost[column] += c,
                Substitution::Mirrored { column, .. } => cost[column] -= c,
                Substitution::Split { positive, negative } => {
                    cost[positive] += c;
                    cost[negative] -= c;
                }
            }
        }

        let mut rows = Vec::with_capacity(request.constraints.len() + bound_rows.len());
        for (index, constraint) in request.constraints.iter().enumerate() {
            let mut coefficients = vec![0.0; structural];
            let mut rhs = constraint.rhs;
            for (a, sub) in constraint.coefficients.iter().zip(&substitutions) {
                match *sub {
                    Substitution::Shifted { column, offset } => {
                        coefficients[column] += a;
                        rhs -= a * offset;
                    }
                    Substitution::Mirrored { column, offset } => {
                        coefficients[column] -= a;
                        rhs -= a * offset;
                    }
                    Substitution::Split { positive, negative } => {
                        coefficients[positive] += a;
                        coefficients[negative] -= a;
                    }
                }
            }
            rows.push(StandardRow {
                coefficients,
                comparison: constraint.comparison,
                rhs,
                origin: RowOrigin::Constraint(index),
            });
        }
        for (column, width) in bound_rows {
            let mut coefficients = vec![0.0; structural];
            coefficients[column] = 1.0;
            rows.push(StandardRow {
                coefficients,
                comparison: Comparison::LessOrEqual,
                rhs: width,
                origin: RowOrigin::UpperBound,
            });
        }

        for row in &mut rows {
            if row.rhs < 0.0 {
                row.rhs = -row.rhs;
                row.coefficients.iter_mut().for_each(|a| *a = -*a);
                row.comparison = row.comparison.flipped();
            }
        }
        let rhs_scale = rows.iter().map(|r| r.rhs).fold(0.0, f64::max);

        Ok(Self {
            substitutions,
            structural,
            rows,
            cost,
            rhs_scale,
        })
    }

    /// Request variable a tableau column stands for, if it is structural
    fn variable_of(&self, column: usize) -> Option<usize> {
        self.substitutions.iter().position(|sub| match *sub {
            Substitution::Shifted { column: c, .. } | Substitution::Mirrored { column: c, .. } => {
                c == column
            }
            Substitution::Split { positive, negative } => positive == column || negative == column,
        })
    }

    fn recover(&self, y: &[f64]) -> Vec<f64> {
        self.substitutions
            .iter()
            .map(|sub| match *sub {
                Substitution::Shifted { column, offset } => offset + y[column],
                Substitution::Mirrored { column, offset } => offset - y[column],
                Substitution::Split { positive, negative } => y[positive] - y[negative],
            })
            .collect()
    }
}

#[derive(Debug)]
struct Budget {
    used: usize,
    max: usize,
}

impl Budget {
    fn new(max: usize) -> Self {
        Self { used: 0, max }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Unbounded(usize),
    IterationCap,
}

/// Rows hold `B⁻¹A | B⁻¹b`; columns are structural, then slack/surplus, then artificial
#[derive(Debug, Clone)]
struct Tableau {
    cells: Vec<Vec<f64>>,
    basis: Vec<usize>,
    origins: Vec<RowOrigin>,
    width: usize,
    first_artificial: usize,
}

impl Tableau {
    fn new(form: &StandardForm) -> Self {
        let slacks = form
            .rows
            .iter()
            .filter(|r| r.comparison != Comparison::Equal)
            .count();
        let artificials = form
            .rows
            .iter()
            .filter(|r| r.comparison != Comparison::LessOrEqual)
            .count();
        let first_artificial = form.structural + slacks;
        let width = first_artificial + artificials;

        let mut cells = Vec::with_capacity(form.rows.len());
        let mut basis = Vec::with_capacity(form.rows.len());
        let mut next_slack = form.structural;
        let mut next_artificial = first_artificial;

        for row in &form.rows {
            let mut cell = vec![0.0; width + 1];
            cell[..form.structural].copy_from_slice(&row.coefficients);
            cell[width] = row.rhs;
            match row.comparison {
                Comparison::LessOrEqual => {
                    cell[next_slack] = 1.0;
                    basis.push(next_slack);
                    next_slack += 1;
                }
                Comparison::GreaterOrEqual => {
                    cell[next_slack] = -1.0;
                    next_slack += 1;
                    cell[next_artificial] = 1.0;
                    basis.push(next_artificial);
                    next_artificial += 1;
                }
                Comparison::Equal => {
                    cell[next_artificial] = 1.0;
                    basis.push(next_artificial);
                    next_artificial += 1;
                }
            }
            cells.push(cell);
        }

        Self {
            cells,
            basis,
            origins: form.rows.iter().map(|r| r.origin).collect(),
            width,
            first_artificial,
        }
    }

    fn has_artificials(&self) -> bool {
        self.width > self.first_artificial
    }

    fn rhs(&self, row: usize) -> f64 {
        self.cells[row][self.width]
    }

    fn objective(&self, cost: &[f64]) -> f64 {
        self.basis
            .iter()
            .enumerate()
            .map(|(i, &b)| cost[b] * self.rhs(i))
            .sum()
    }

    fn reduced_cost(&self, cost: &[f64], column: usize) -> f64 {
        let priced: f64 = self
            .basis
            .iter()
            .enumerate()
            .map(|(i, &b)| cost[b] * self.cells[i][column])
            .sum();
        cost[column] - priced
    }

    /// Bland's rule: lowest-index improving column
    fn entering(&self, cost: &[f64], allowed: &[bool], tol: f64) -> Option<usize> {
        (0..self.width)
            .filter(|&j| allowed[j])
            .find(|&j| self.reduced_cost(cost, j) < -tol)
    }

    /// Minimum ratio row, ties broken by lowest basic column index
    fn leaving(&self, column: usize, tol: f64) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, row) in self.cells.iter().enumerate() {
            let a = row[column];
            if a <= tol {
                continue;
            }
            let ratio = self.rhs(i) / a;
            best = match best {
                None => Some((i, ratio)),
                Some((r, best_ratio)) => {
                    if ratio < best_ratio - tol
                        || ((ratio - best_ratio).abs() <= tol && self.basis[i] < self.basis[r])
                    {
                        Some((i, ratio))
                    } else {
                        Some((r, best_ratio))
                    }
                }
            };
        }
        best.map(|(i, _)| i)
    }

    fn pivot(&mut self, row: usize, column: usize) {
        let p = self.cells[row][column];
        self.cells[row].iter_mut().for_each(|v| *v /= p);
        let pivot_row = self.cells[row].clone();

        for (i, cells) in self.cells.iter_mut().enumerate() {
            if i == row {
                continue;
            }
            let factor = cells[column];
            if factor != 0.0 {
                cells
                    .iter_mut()
                    .zip(&pivot_row)
                    .for_each(|(v, pv)| *v -= factor * pv);
            }
        }
        self.basis[row] = column;
    }

    fn optimize(
        &mut self,
        cost: &[f64],
        allowed: &[bool],
        budget: &mut Budget,
        tol: f64,
    ) -> Result<(), Stop> {
        while let Some(column) = self.entering(cost, allowed, tol) {
            let row = self.leaving(column, tol).ok_or(Stop::Unbounded(column))?;
            if budget.used >= budget.max {
                return Err(Stop::IterationCap);
            }
            trace!(row, column, "pivot");
            self.pivot(row, column);
            budget.used += 1;
        }
        Ok(())
    }

    /// User constraint whose artificial is still positive after phase 1
    fn offending_constraint(&self, tol: f64) -> Option<usize> {
        self.basis
            .iter()
            .enumerate()
            .filter(|&(i, &b)| b >= self.first_artificial && self.rhs(i) > tol)
            .find_map(|(i, _)| match self.origins[i] {
                RowOrigin::Constraint(index) => Some(index),
                RowOrigin::UpperBound => None,
            })
    }

    /// Pivot zero-valued artificials out of the basis, dropping redundant rows
    fn expel_artificials(&mut self, tol: f64) {
        let mut i = 0;
        while i < self.cells.len() {
            if self.basis[i] < self.first_artificial {
                i += 1;
                continue;
            }
            match (0..self.first_artificial).find(|&j| self.cells[i][j].abs() > tol) {
                Some(column) => {
                    self.pivot(i, column);
                    i += 1;
                }
                None => {
                    trace!(row = i, "dropping redundant row");
                    self.cells.remove(i);
                    self.basis.remove(i);
                    self.origins.remove(i);
                }
            }
        }
    }

    fn structural_values(&self, structural: usize) -> Vec<f64> {
        let mut y = vec![0.0; structural];
        for (i, &b) in self.basis.iter().enumerate() {
            if b < structural {
                y[b] = self.rhs(i);
            }
        }
        y
    }
}

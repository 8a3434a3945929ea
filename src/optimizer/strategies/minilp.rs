//! `good_lp` backend
//!
//! Builds the same allocation problem through `good_lp` and solves it with
//! minilp. Useful to cross-check [`SimplexSolver`](crate::optimizer::SimplexSolver)
//! results; minilp does not expose a pivot count or a pivot rule, so results
//! are not guaranteed to be bit-for-bit reproducible across versions.

use good_lp::solvers::minilp::minilp;
use good_lp::{
    constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel,
    Variable,
};

use crate::optimizer::{
    AllocationRequest, AllocationResult, AllocationSolver, Comparison, OptimizerError, Sense,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpSolver;

impl AllocationSolver for GoodLpSolver {
    fn name(&self) -> &'static str {
        "good_lp/minilp"
    }

    fn solve(&self, request: &AllocationRequest) -> Result<AllocationResult, OptimizerError> {
        request.validate()?;
        if request.bounds.iter().any(|b| b.lower > b.upper) {
            return Err(OptimizerError::Infeasible { constraint: None });
        }

        let mut problem = ProblemVariables::new();
        let xs: Vec<Variable> = request
            .bounds
            .iter()
            .map(|b| {
                let mut def = variable();
                if b.lower.is_finite() {
                    def = def.min(b.lower);
                }
                if b.upper.is_finite() {
                    def = def.max(b.upper);
                }
                problem.add(def)
            })
            .collect();

        let objective: Expression = xs
            .iter()
            .zip(&request.objective)
            .map(|(&x, &c)| c * x)
            .sum();

        let unsolved = match request.sense {
            Sense::Minimize => problem.minimise(objective),
            Sense::Maximize => problem.maximise(objective),
        };
        let mut model = unsolved.using(minilp);

        for c in &request.constraints {
            let lhs: Expression = xs
                .iter()
                .zip(&c.coefficients)
                .map(|(&x, &a)| a * x)
                .sum();
            model = model.with(match c.comparison {
                Comparison::LessOrEqual => constraint::leq(lhs, c.rhs),
                Comparison::GreaterOrEqual => constraint::geq(lhs, c.rhs),
                Comparison::Equal => constraint::eq(lhs, c.rhs),
            });
        }

        let solution = model.solve().map_err(|err| match err {
            ResolutionError::Infeasible => OptimizerError::Infeasible { constraint: None },
            ResolutionError::Unbounded => OptimizerError::Unbounded { variable: None },
            other => OptimizerError::InvalidProblem(other.to_string()),
        })?;

        let values: Vec<f64> = xs.iter().map(|&x| solution.value(x)).collect();
        let objective_value = request.evaluate(&values);

        Ok(AllocationResult {
            client: request.client,
            devices: request.devices.clone(),
            values,
            objective_value,
            iterations: 0,
        })
    }
}

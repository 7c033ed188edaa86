//! Result of solving one local subproblem.

use std::fmt;

use nalgebra::DVector;

use crate::core::iterate::Multipliers;

/// Status reported by a subproblem solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubproblemStatus {
    /// The subproblem was solved to optimality.
    Optimal,
    /// The linearized constraints are inconsistent.
    Infeasible,
    /// The subproblem is unbounded below.
    Unbounded,
    /// The solver failed.
    Error,
}

/// Indices at their lower or upper bound.
#[derive(Debug, Clone, Default)]
pub struct ActiveBounds {
    /// Indices active at the lower bound.
    pub at_lower_bound: Vec<usize>,
    /// Indices active at the upper bound.
    pub at_upper_bound: Vec<usize>,
}

/// Active set of a subproblem solution.
#[derive(Debug, Clone, Default)]
pub struct ActiveSet {
    /// Variables at one of their displacement bounds.
    pub bounds: ActiveBounds,
    /// Linearized constraints at one of their bounds.
    pub constraints: ActiveBounds,
}

/// Partition of the constraints produced when the linearization is
/// infeasible.
#[derive(Debug, Clone, Default)]
pub struct ConstraintPartition {
    /// Constraints satisfied by the linearization.
    pub feasible: Vec<usize>,
    /// Constraints violated by the linearization.
    pub infeasible: Vec<usize>,
    /// Violated below their lower bound.
    pub lower_bound_infeasible: Vec<usize>,
    /// Violated above their upper bound.
    pub upper_bound_infeasible: Vec<usize>,
}

/// A primal-dual direction computed by a subproblem.
#[derive(Debug, Clone)]
pub struct Direction {
    /// Primal step `d`.
    pub primals: DVector<f64>,
    /// Dual displacements (new multipliers minus current ones).
    pub multipliers: Multipliers,
    /// Infinity norm of the primal step.
    pub norm: f64,
    /// Value of the subproblem objective model at `d`.
    pub objective: f64,
    /// Objective multiplier `σ` the subproblem was solved with.
    pub objective_multiplier: f64,
    /// Solver status.
    pub status: SubproblemStatus,
    /// Active set of the solution.
    pub active_set: ActiveSet,
    /// Partition of the constraints, present only when the linearization was
    /// infeasible (feasibility-restoration flow).
    pub constraint_partition: Option<ConstraintPartition>,
    /// Largest primal step length allowed by the subproblem (the
    /// fraction-to-the-boundary rule of interior-point subproblems); `1` for
    /// active-set subproblems.
    pub max_primal_step_length: f64,
}

impl Direction {
    /// Creates a zero direction.
    pub fn new(number_variables: usize, number_constraints: usize) -> Self {
        Self {
            primals: DVector::zeros(number_variables),
            multipliers: Multipliers::new(number_variables, number_constraints),
            norm: 0.0,
            objective: 0.0,
            objective_multiplier: 1.0,
            status: SubproblemStatus::Optimal,
            active_set: ActiveSet::default(),
            constraint_partition: None,
            max_primal_step_length: 1.0,
        }
    }

    /// Truncates the direction to the given number of variables, dropping
    /// trailing (elastic) components, and updates the norm.
    pub fn set_number_variables(&mut self, number_variables: usize) {
        if self.primals.len() != number_variables {
            self.primals = self.primals.clone().resize_vertically(number_variables, 0.0);
            self.multipliers.set_number_variables(number_variables);
            self.active_set
                .bounds
                .at_lower_bound
                .retain(|&i| i < number_variables);
            self.active_set
                .bounds
                .at_upper_bound
                .retain(|&i| i < number_variables);
        }
        self.norm = if self.primals.is_empty() { 0.0 } else { self.primals.amax() };
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "direction ({:?}) with norm {:.4e}, model objective {:.4e}, multiplier {}",
            self.status, self.norm, self.objective, self.objective_multiplier
        )
    }
}

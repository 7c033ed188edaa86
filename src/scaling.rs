//! Constant scaling of the objective and constraints.
//!
//! The scaling factors are computed once from the infinity norms of the
//! gradients at the initial point and applied transparently through a
//! delegating [`ScaledProblem`]. Unscaling at postsolve recovers the
//! original functions.

use log::debug;
use nalgebra::DVector;
use sprs::{CsMat, TriMat};

use crate::core::error::NumericalError;
use crate::core::iterate::Iterate;
use crate::core::problem::{BoundType, FunctionType, Norm, Problem, Range};

/// Constant scaling factors of the objective and constraints.
#[derive(Debug, Clone)]
pub struct Scaling {
    objective: f64,
    constraints: DVector<f64>,
}

impl Scaling {
    /// Creates a neutral scaling (all factors one).
    pub fn identity(number_constraints: usize) -> Self {
        Self {
            objective: 1.0,
            constraints: DVector::from_element(number_constraints, 1.0),
        }
    }

    /// Computes the scaling from the gradients at the initial point:
    /// `s = threshold / max(threshold, ‖∇‖_∞)`, so that only functions with
    /// steep gradients are scaled down.
    pub fn compute(
        problem: &dyn Problem,
        first_iterate: &mut Iterate,
        threshold: f64,
    ) -> Result<Self, NumericalError> {
        first_iterate.evaluate_objective_gradient(problem)?;
        first_iterate.evaluate_constraint_jacobian(problem)?;

        let scale = |gradient_norm: f64| threshold / threshold.max(gradient_norm);
        let objective_gradient_norm = if first_iterate.objective_gradient().is_empty() {
            0.0
        } else {
            first_iterate.objective_gradient().amax()
        };
        let objective = scale(objective_gradient_norm);

        let mut constraints = DVector::from_element(problem.number_constraints(), 1.0);
        for (j, row) in first_iterate
            .constraint_jacobian()
            .outer_iterator()
            .enumerate()
        {
            let gradient_norm = Norm::Inf.of(row.iter().map(|(_, &value)| value));
            constraints[j] = scale(gradient_norm);
        }
        debug!(
            "objective scaled by {:.4e}, constraint scalings in [{:.4e}, {:.4e}]",
            objective,
            constraints.iter().copied().fold(f64::INFINITY, f64::min),
            constraints.iter().copied().fold(0.0, f64::max),
        );

        // the scaling evaluations must not leak into the solve
        first_iterate.reset_evaluations();
        Ok(Self {
            objective,
            constraints,
        })
    }

    /// Objective scaling factor.
    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// Scaling factor of a constraint.
    pub fn constraint(&self, constraint_index: usize) -> f64 {
        self.constraints[constraint_index]
    }
}

/// A problem with constant function scaling, implementing the [`Problem`]
/// contract by delegation.
pub struct ScaledProblem<'a> {
    problem: &'a dyn Problem,
    scaling: Scaling,
}

impl<'a> ScaledProblem<'a> {
    /// Wraps a problem with scaling factors.
    pub fn new(problem: &'a dyn Problem, scaling: Scaling) -> Self {
        Self { problem, scaling }
    }

    /// The scaling factors.
    pub fn scaling(&self) -> &Scaling {
        &self.scaling
    }
}

impl Problem for ScaledProblem<'_> {
    fn number_variables(&self) -> usize {
        self.problem.number_variables()
    }

    fn number_constraints(&self) -> usize {
        self.problem.number_constraints()
    }

    fn variable_bounds(&self, variable_index: usize) -> Range {
        self.problem.variable_bounds(variable_index)
    }

    fn constraint_bounds(&self, constraint_index: usize) -> Range {
        let bounds = self.problem.constraint_bounds(constraint_index);
        let factor = self.scaling.constraint(constraint_index);
        Range {
            lower: factor * bounds.lower,
            upper: factor * bounds.upper,
        }
    }

    fn objective_sign(&self) -> f64 {
        self.problem.objective_sign()
    }

    fn evaluate_objective(&self, x: &DVector<f64>) -> f64 {
        self.scaling.objective() * self.problem.evaluate_objective(x)
    }

    fn evaluate_objective_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        self.problem.evaluate_objective_gradient(x) * self.scaling.objective()
    }

    fn evaluate_constraints(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut constraints = self.problem.evaluate_constraints(x);
        for j in 0..constraints.len() {
            constraints[j] *= self.scaling.constraint(j);
        }
        constraints
    }

    fn evaluate_constraint_jacobian(&self, x: &DVector<f64>) -> CsMat<f64> {
        let jacobian = self.problem.evaluate_constraint_jacobian(x);
        let mut scaled = TriMat::new((jacobian.rows(), jacobian.cols()));
        for (j, row) in jacobian.outer_iterator().enumerate() {
            let factor = self.scaling.constraint(j);
            for (i, &value) in row.iter() {
                scaled.add_triplet(j, i, factor * value);
            }
        }
        scaled.to_csr::<usize>()
    }

    fn evaluate_lagrangian_hessian(
        &self,
        x: &DVector<f64>,
        objective_multiplier: f64,
        constraint_multipliers: &DVector<f64>,
    ) -> TriMat<f64> {
        // scale the multipliers instead of the Hessian entries
        let scaled_objective_multiplier = self.scaling.objective() * objective_multiplier;
        let scaled_multipliers = DVector::from_iterator(
            constraint_multipliers.len(),
            constraint_multipliers
                .iter()
                .enumerate()
                .map(|(j, &multiplier)| self.scaling.constraint(j) * multiplier),
        );
        self.problem
            .evaluate_lagrangian_hessian(x, scaled_objective_multiplier, &scaled_multipliers)
    }

    fn number_jacobian_nonzeros(&self) -> usize {
        self.problem.number_jacobian_nonzeros()
    }

    fn number_hessian_nonzeros(&self) -> usize {
        self.problem.number_hessian_nonzeros()
    }

    fn variable_bound_type(&self, variable_index: usize) -> BoundType {
        self.problem.variable_bound_type(variable_index)
    }

    fn constraint_type(&self, constraint_index: usize) -> FunctionType {
        self.problem.constraint_type(constraint_index)
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;
    use crate::testing::SteepProblem;

    #[test]
    fn gentle_gradients_are_not_scaled() {
        let problem = crate::testing::Rosenbrock;
        let mut iterate = Iterate::new(DVector::from_vec(vec![0.0, 0.0]), 0);
        let scaling = Scaling::compute(&problem, &mut iterate, 100.0).unwrap();
        assert_eq!(scaling.objective(), 1.0);
    }

    #[test]
    fn steep_gradients_are_scaled_down() {
        let problem = SteepProblem;
        let mut iterate = Iterate::new(DVector::from_vec(vec![1.0]), 1);
        let scaling = Scaling::compute(&problem, &mut iterate, 100.0).unwrap();
        assert!(scaling.objective() < 1.0);
        assert!(scaling.constraint(0) < 1.0);

        let scaled = ScaledProblem::new(&problem, scaling.clone());
        let x = DVector::from_vec(vec![1.0]);
        assert_approx_eq!(
            f64,
            scaled.evaluate_objective(&x),
            scaling.objective() * problem.evaluate_objective(&x),
            epsilon = 1e-12
        );
    }

    #[test]
    fn scaling_computation_leaves_no_stale_evaluations() {
        let problem = SteepProblem;
        let mut iterate = Iterate::new(DVector::from_vec(vec![1.0]), 1);
        let _ = Scaling::compute(&problem, &mut iterate, 100.0).unwrap();
        // the caches were reset so the next evaluation is recomputed on the
        // scaled problem
        assert!(!iterate.is_objective_gradient_computed());
        assert!(!iterate.are_constraints_computed());
    }
}

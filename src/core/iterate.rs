//! Optimization iterate: a primal-dual point together with lazily cached
//! function evaluations.

use nalgebra::DVector;
use sprs::CsMat;

use crate::core::error::{check_finite, NumericalError};
use crate::core::problem::{Norm, Problem};

/// Lagrange multipliers of the constraints and of the variable bounds.
///
/// Sign convention: multipliers of lower-active constraints and bounds are
/// nonnegative, multipliers of upper-active ones nonpositive, so that the
/// Lagrangian reads `σ f(x) - λᵀc(x) - z_Lᵀ(x - x_L) - z_Uᵀ(x - x_U)`.
#[derive(Debug, Clone)]
pub struct Multipliers {
    /// Multipliers `λ` of the constraints.
    pub constraints: DVector<f64>,
    /// Multipliers `z_L >= 0` of the lower bounds.
    pub lower_bounds: DVector<f64>,
    /// Multipliers `z_U <= 0` of the upper bounds.
    pub upper_bounds: DVector<f64>,
}

impl Multipliers {
    /// Creates zero multipliers for a problem with `number_variables`
    /// variables and `number_constraints` constraints.
    pub fn new(number_variables: usize, number_constraints: usize) -> Self {
        Self {
            constraints: DVector::zeros(number_constraints),
            lower_bounds: DVector::zeros(number_variables),
            upper_bounds: DVector::zeros(number_variables),
        }
    }

    /// Resizes the bound multipliers, preserving the leading entries.
    pub fn set_number_variables(&mut self, number_variables: usize) {
        self.lower_bounds = self.lower_bounds.clone().resize_vertically(number_variables, 0.0);
        self.upper_bounds = self.upper_bounds.clone().resize_vertically(number_variables, 0.0);
    }

    /// Infinity norm over all multipliers.
    pub fn norm_inf(&self) -> f64 {
        let constraints = if self.constraints.is_empty() { 0.0 } else { self.constraints.amax() };
        let lower = if self.lower_bounds.is_empty() { 0.0 } else { self.lower_bounds.amax() };
        let upper = if self.upper_bounds.is_empty() { 0.0 } else { self.upper_bounds.amax() };
        constraints.max(lower).max(upper)
    }
}

/// Residuals of the first-order optimality conditions at an iterate.
#[derive(Debug, Clone, Copy)]
pub struct Residuals {
    /// Norm of the constraint violation.
    pub constraints: f64,
    /// Norm of the Lagrangian gradient (KKT stationarity).
    pub stationarity: f64,
    /// Stationarity of the pure-feasibility Lagrangian (zero objective
    /// multiplier), used to detect Fritz-John points.
    pub feasibility_stationarity: f64,
    /// Complementarity error.
    pub complementarity: f64,
}

impl Default for Residuals {
    fn default() -> Self {
        Self {
            constraints: f64::INFINITY,
            stationarity: f64::INFINITY,
            feasibility_stationarity: f64::INFINITY,
            complementarity: f64::INFINITY,
        }
    }
}

/// The `(feasibility, objective)` pair consumed by globalization strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressMeasures {
    /// Feasibility measure (norm of the constraint violation).
    pub feasibility: f64,
    /// Optimality measure (objective, barrier or restoration value).
    pub objective: f64,
}

impl Default for ProgressMeasures {
    fn default() -> Self {
        Self {
            feasibility: f64::INFINITY,
            objective: f64::INFINITY,
        }
    }
}

/// A point of the optimization process with its dual estimates, cached
/// evaluations, residuals and progress measures.
///
/// Every evaluator is idempotent per point: once a quantity is computed, the
/// cached value is returned. Mutating the primals goes through
/// [`Iterate::set_primals`] (or is followed by
/// [`Iterate::reset_evaluations`]), which invalidates all caches.
///
/// The primal vector may temporarily carry more components than the problem
/// has variables (elastic variables of the restoration phase); evaluators
/// then operate on the leading components.
#[derive(Debug, Clone)]
pub struct Iterate {
    /// Primal variables.
    pub x: DVector<f64>,
    /// Dual variables.
    pub multipliers: Multipliers,
    /// Optimality residuals, maintained by the relaxation strategy.
    pub residuals: Residuals,
    /// Progress measures, maintained by the subproblem.
    pub progress: ProgressMeasures,
    objective: Option<f64>,
    constraints: Option<DVector<f64>>,
    objective_gradient: Option<DVector<f64>>,
    constraint_jacobian: Option<CsMat<f64>>,
}

impl Iterate {
    /// Creates an iterate at the given point with zero multipliers.
    pub fn new(x: DVector<f64>, number_constraints: usize) -> Self {
        let number_variables = x.len();
        Self {
            x,
            multipliers: Multipliers::new(number_variables, number_constraints),
            residuals: Residuals::default(),
            progress: ProgressMeasures::default(),
            objective: None,
            constraints: None,
            objective_gradient: None,
            constraint_jacobian: None,
        }
    }

    /// Replaces the primal point and invalidates all cached evaluations.
    pub fn set_primals(&mut self, x: DVector<f64>) {
        self.x = x;
        self.reset_evaluations();
    }

    /// Invalidates all cached evaluations.
    pub fn reset_evaluations(&mut self) {
        self.objective = None;
        self.constraints = None;
        self.objective_gradient = None;
        self.constraint_jacobian = None;
    }

    /// Resizes the primal point and the bound multipliers, preserving the
    /// leading components. Used when elastic variables enter or leave the
    /// iterate during feasibility restoration.
    pub fn set_number_variables(&mut self, number_variables: usize) {
        self.x = self.x.clone().resize_vertically(number_variables, 0.0);
        self.multipliers.set_number_variables(number_variables);
    }

    fn with_problem_point<T>(
        &self,
        problem: &dyn Problem,
        evaluation: impl FnOnce(&DVector<f64>) -> T,
    ) -> T {
        let n = problem.number_variables();
        if self.x.len() == n {
            evaluation(&self.x)
        } else {
            let leading = self.x.rows(0, n).into_owned();
            evaluation(&leading)
        }
    }

    /// Evaluates (or returns the cached) objective value.
    pub fn evaluate_objective(&mut self, problem: &dyn Problem) -> Result<f64, NumericalError> {
        if let Some(value) = self.objective {
            return Ok(value);
        }
        let value = self.with_problem_point(problem, |x| problem.evaluate_objective(x));
        check_finite([value], "the objective")?;
        self.objective = Some(value);
        Ok(value)
    }

    /// Evaluates (or reuses) the constraint values.
    pub fn evaluate_constraints(&mut self, problem: &dyn Problem) -> Result<(), NumericalError> {
        if self.constraints.is_none() {
            let values = self.with_problem_point(problem, |x| problem.evaluate_constraints(x));
            check_finite(values.iter().copied(), "the constraints")?;
            self.constraints = Some(values);
        }
        Ok(())
    }

    /// Evaluates (or reuses) the objective gradient.
    pub fn evaluate_objective_gradient(
        &mut self,
        problem: &dyn Problem,
    ) -> Result<(), NumericalError> {
        if self.objective_gradient.is_none() {
            let gradient =
                self.with_problem_point(problem, |x| problem.evaluate_objective_gradient(x));
            check_finite(gradient.iter().copied(), "the objective gradient")?;
            self.objective_gradient = Some(gradient);
        }
        Ok(())
    }

    /// Evaluates (or reuses) the constraint Jacobian.
    pub fn evaluate_constraint_jacobian(
        &mut self,
        problem: &dyn Problem,
    ) -> Result<(), NumericalError> {
        if self.constraint_jacobian.is_none() {
            let jacobian =
                self.with_problem_point(problem, |x| problem.evaluate_constraint_jacobian(x));
            check_finite(jacobian.data().iter().copied(), "the constraint Jacobian")?;
            self.constraint_jacobian = Some(jacobian);
        }
        Ok(())
    }

    /// Cached objective value.
    ///
    /// # Panics
    ///
    /// Panics if [`Iterate::evaluate_objective`] has not been called since the
    /// last mutation of the point.
    pub fn objective(&self) -> f64 {
        self.objective.expect("objective has not been evaluated")
    }

    /// Cached constraint values. Panics if not evaluated.
    pub fn constraints(&self) -> &DVector<f64> {
        self.constraints
            .as_ref()
            .expect("constraints have not been evaluated")
    }

    /// Cached objective gradient. Panics if not evaluated.
    pub fn objective_gradient(&self) -> &DVector<f64> {
        self.objective_gradient
            .as_ref()
            .expect("objective gradient has not been evaluated")
    }

    /// Cached constraint Jacobian. Panics if not evaluated.
    pub fn constraint_jacobian(&self) -> &CsMat<f64> {
        self.constraint_jacobian
            .as_ref()
            .expect("constraint Jacobian has not been evaluated")
    }

    /// Whether the constraint values are cached for the current point.
    pub fn are_constraints_computed(&self) -> bool {
        self.constraints.is_some()
    }

    /// Whether the objective gradient is cached for the current point.
    pub fn is_objective_gradient_computed(&self) -> bool {
        self.objective_gradient.is_some()
    }

    /// Computes the gradient of the Lagrangian
    /// `σ ∇f(x) - ∇c(x)ᵀλ - z_L - z_U` with the given multipliers.
    pub fn evaluate_lagrangian_gradient(
        &mut self,
        problem: &dyn Problem,
        objective_multiplier: f64,
        multipliers: &Multipliers,
    ) -> Result<DVector<f64>, NumericalError> {
        let n = problem.number_variables();
        let mut gradient = DVector::zeros(n);

        if objective_multiplier != 0.0 {
            self.evaluate_objective_gradient(problem)?;
            gradient.axpy(objective_multiplier, self.objective_gradient(), 1.0);
        }
        if problem.number_constraints() > 0 {
            self.evaluate_constraint_jacobian(problem)?;
            for (j, row) in self.constraint_jacobian().outer_iterator().enumerate() {
                let multiplier = multipliers.constraints[j];
                if multiplier != 0.0 {
                    for (i, &derivative) in row.iter() {
                        gradient[i] -= multiplier * derivative;
                    }
                }
            }
        }
        for i in 0..n {
            gradient[i] -= multipliers.lower_bounds[i] + multipliers.upper_bounds[i];
        }
        Ok(gradient)
    }

    /// Norm of the constraint violation at this iterate.
    pub fn constraint_violation(&self, problem: &dyn Problem, norm: Norm) -> f64 {
        problem.constraint_violation(self.constraints(), norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Rosenbrock;

    #[test]
    fn caches_are_invalidated_on_mutation() {
        let problem = Rosenbrock;
        let mut iterate = Iterate::new(DVector::from_vec(vec![-1.2, 1.0]), 0);

        let first = iterate.evaluate_objective(&problem).unwrap();
        assert_eq!(iterate.objective(), first);

        iterate.set_primals(DVector::from_vec(vec![1.0, 1.0]));
        let second = iterate.evaluate_objective(&problem).unwrap();
        assert!(second < first);
        assert_eq!(second, 0.0);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let problem = Rosenbrock;
        let mut iterate = Iterate::new(DVector::from_vec(vec![0.5, 0.5]), 0);
        iterate.evaluate_objective_gradient(&problem).unwrap();
        let gradient = iterate.objective_gradient().clone();
        iterate.evaluate_objective_gradient(&problem).unwrap();
        assert_eq!(&gradient, iterate.objective_gradient());
    }

    #[test]
    fn lagrangian_gradient_of_unconstrained_problem() {
        let problem = Rosenbrock;
        let mut iterate = Iterate::new(DVector::from_vec(vec![1.0, 1.0]), 0);
        let multipliers = Multipliers::new(2, 0);
        let gradient = iterate
            .evaluate_lagrangian_gradient(&problem, 1.0, &multipliers)
            .unwrap();
        assert!(gradient.amax() < 1e-12);
    }
}

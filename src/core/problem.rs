//! Definition of an optimization problem.

use nalgebra::DVector;
use sprs::{CsMat, TriMat};

/// A pair of lower and upper bounds, possibly infinite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    /// Lower bound (may be `-inf`).
    pub lower: f64,
    /// Upper bound (may be `+inf`).
    pub upper: f64,
}

impl Range {
    /// Creates a range with the given bounds.
    pub fn new(lower: f64, upper: f64) -> Self {
        debug_assert!(lower <= upper, "invalid range");
        Self { lower, upper }
    }

    /// Creates an unbounded range.
    pub fn unbounded() -> Self {
        Self {
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    /// Creates the nonnegative range `[0, +inf)`.
    pub fn nonnegative() -> Self {
        Self {
            lower: 0.0,
            upper: f64::INFINITY,
        }
    }

    /// Creates a range fixed to a single value.
    pub fn fixed(value: f64) -> Self {
        Self {
            lower: value,
            upper: value,
        }
    }

    /// Checks whether a value lies within the bounds.
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    /// Amount by which a value violates the bounds (zero if feasible).
    pub fn violation(&self, value: f64) -> f64 {
        (self.lower - value).max(value - self.upper).max(0.0)
    }

    /// Clamps a value into the bounds.
    pub fn project(&self, value: f64) -> f64 {
        value.max(self.lower).min(self.upper)
    }

    /// Whether the bounds coincide.
    pub fn is_equality(&self) -> bool {
        self.lower == self.upper
    }

    /// Classifies the range.
    pub fn bound_type(&self) -> BoundType {
        if self.lower == self.upper {
            BoundType::EqualBounds
        } else if self.lower.is_finite() && self.upper.is_finite() {
            BoundType::BoundedBothSides
        } else if self.lower.is_finite() {
            BoundType::BoundedLower
        } else if self.upper.is_finite() {
            BoundType::BoundedUpper
        } else {
            BoundType::Unbounded
        }
    }
}

/// Classification of a variable or constraint with respect to its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundType {
    /// Lower and upper bounds coincide (equality).
    EqualBounds,
    /// Finite bounds on both sides.
    BoundedBothSides,
    /// Finite lower bound only.
    BoundedLower,
    /// Finite upper bound only.
    BoundedUpper,
    /// No finite bound.
    Unbounded,
}

/// Classification of a constraint function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionType {
    /// The constraint is linear in the variables.
    Linear,
    /// The constraint is (potentially) nonlinear.
    Nonlinear,
}

/// Norm used for residuals and progress measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Norm {
    /// Sum of absolute values.
    L1,
    /// Euclidean norm.
    L2,
    /// Maximum absolute value.
    Inf,
}

impl Norm {
    /// Computes the norm of the given values.
    pub fn of(self, values: impl Iterator<Item = f64>) -> f64 {
        match self {
            Norm::L1 => values.map(f64::abs).sum(),
            Norm::L2 => values.map(|v| v * v).sum::<f64>().sqrt(),
            Norm::Inf => values.map(f64::abs).fold(0.0, f64::max),
        }
    }
}

/// A continuous nonlinear optimization problem
///
/// ```text
/// minimize  f(x)
/// subject to  c_L <= c(x) <= c_U
///             x_L <=  x   <= x_U
/// ```
///
/// with twice-differentiable objective and constraints. The handle is
/// read-only: evaluators do not mutate the problem. Reformulations (for
/// instance function scaling) implement the same trait by delegation.
///
/// Derivatives are sparse: the constraint Jacobian is returned row-major and
/// the Lagrangian Hessian as the lower triangle in triplet form. Duplicate
/// triplets sum up at factorization time.
pub trait Problem {
    /// Number of variables.
    fn number_variables(&self) -> usize;

    /// Number of constraints.
    fn number_constraints(&self) -> usize;

    /// Bounds `[x_L, x_U]` of a variable.
    fn variable_bounds(&self, variable_index: usize) -> Range;

    /// Bounds `[c_L, c_U]` of a constraint.
    fn constraint_bounds(&self, constraint_index: usize) -> Range;

    /// `+1` for minimization, `-1` for maximization.
    fn objective_sign(&self) -> f64 {
        1.0
    }

    /// Objective value `f(x)`.
    fn evaluate_objective(&self, x: &DVector<f64>) -> f64;

    /// Dense objective gradient `∇f(x)`.
    fn evaluate_objective_gradient(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Constraint values `c(x)`.
    fn evaluate_constraints(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Sparse constraint Jacobian `∇c(x)`, row-major.
    fn evaluate_constraint_jacobian(&self, x: &DVector<f64>) -> CsMat<f64>;

    /// Lower triangle of the Lagrangian Hessian
    /// `∇²(σ f(x) - Σ λ_j c_j(x))` in triplet form.
    fn evaluate_lagrangian_hessian(
        &self,
        x: &DVector<f64>,
        objective_multiplier: f64,
        constraint_multipliers: &DVector<f64>,
    ) -> TriMat<f64>;

    /// Upper bound on the number of Jacobian nonzeros.
    fn number_jacobian_nonzeros(&self) -> usize {
        self.number_constraints() * self.number_variables()
    }

    /// Upper bound on the number of Hessian nonzeros (lower triangle).
    fn number_hessian_nonzeros(&self) -> usize {
        let n = self.number_variables();
        n * (n + 1) / 2
    }

    /// Classification of a variable with respect to its bounds.
    fn variable_bound_type(&self, variable_index: usize) -> BoundType {
        self.variable_bounds(variable_index).bound_type()
    }

    /// Classification of a constraint with respect to its bounds.
    fn constraint_bound_type(&self, constraint_index: usize) -> BoundType {
        self.constraint_bounds(constraint_index).bound_type()
    }

    /// Linearity classification of a constraint. Conservative default.
    fn constraint_type(&self, _constraint_index: usize) -> FunctionType {
        FunctionType::Nonlinear
    }

    /// Norm of the constraint violation of given constraint values.
    fn constraint_violation(&self, constraints: &DVector<f64>, norm: Norm) -> f64 {
        norm.of(
            (0..self.number_constraints())
                .map(|j| self.constraint_bounds(j).violation(constraints[j])),
        )
    }

    /// Norm of the constraint violation restricted to a subset of constraints.
    fn constraint_subset_violation(
        &self,
        constraints: &DVector<f64>,
        subset: &[usize],
        norm: Norm,
    ) -> f64 {
        norm.of(
            subset
                .iter()
                .map(|&j| self.constraint_bounds(j).violation(constraints[j])),
        )
    }

    /// Projects a point componentwise into the variable bounds. Returns
    /// whether the point had to be moved.
    fn project_point_in_bounds(&self, x: &mut DVector<f64>) -> bool {
        let mut moved = false;
        for i in 0..self.number_variables() {
            let bounds = self.variable_bounds(i);
            let projected = bounds.project(x[i]);
            if projected != x[i] {
                x[i] = projected;
                moved = true;
            }
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_violation() {
        let range = Range::new(-1.0, 2.0);
        assert_eq!(range.violation(0.5), 0.0);
        assert_eq!(range.violation(-3.0), 2.0);
        assert_eq!(range.violation(5.0), 3.0);
    }

    #[test]
    fn range_classification() {
        assert_eq!(Range::fixed(1.0).bound_type(), BoundType::EqualBounds);
        assert_eq!(Range::new(0.0, 1.0).bound_type(), BoundType::BoundedBothSides);
        assert_eq!(
            Range::new(0.0, f64::INFINITY).bound_type(),
            BoundType::BoundedLower
        );
        assert_eq!(
            Range::new(f64::NEG_INFINITY, 0.0).bound_type(),
            BoundType::BoundedUpper
        );
        assert_eq!(Range::unbounded().bound_type(), BoundType::Unbounded);
    }

    #[test]
    fn norms() {
        let values = [1.0, -2.0, 2.0];
        assert_eq!(Norm::L1.of(values.iter().copied()), 5.0);
        assert_eq!(Norm::L2.of(values.iter().copied()), 3.0);
        assert_eq!(Norm::Inf.of(values.iter().copied()), 2.0);
    }
}

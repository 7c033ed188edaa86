//! Testing problems useful for benchmarking, debugging and smoke testing.
//!
//! The constrained problems come from the Hock-Schittkowski collection,
//! with hand-coded derivatives.
//!
//! # References
//!
//! \[1\] [Test Examples for Nonlinear Programming
//! Codes](https://link.springer.com/book/10.1007/978-3-642-48320-2)

#![allow(unused)]

use nalgebra::DVector;
use sprs::{CsMat, TriMat};

use crate::core::problem::{FunctionType, Problem, Range};

fn csr_from_rows(shape: (usize, usize), rows: &[&[(usize, f64)]]) -> CsMat<f64> {
    let mut triplets = TriMat::new(shape);
    for (j, row) in rows.iter().enumerate() {
        for &(i, value) in *row {
            triplets.add_triplet(j, i, value);
        }
    }
    triplets.to_csr::<usize>()
}

/// The [Rosenbrock function](https://en.wikipedia.org/wiki/Rosenbrock_function),
/// unconstrained: `min 100 (x2 - x1^2)^2 + (1 - x1)^2`.
///
/// The global minimum `(1, 1)` lies inside a long, narrow, parabolic
/// valley. The standard initial point is `(-1.2, 1)`.
#[derive(Debug, Clone, Copy)]
pub struct Rosenbrock;

impl Problem for Rosenbrock {
    fn number_variables(&self) -> usize {
        2
    }

    fn number_constraints(&self) -> usize {
        0
    }

    fn variable_bounds(&self, _variable_index: usize) -> Range {
        Range::unbounded()
    }

    fn constraint_bounds(&self, _constraint_index: usize) -> Range {
        unreachable!("the problem has no constraints")
    }

    fn evaluate_objective(&self, x: &DVector<f64>) -> f64 {
        100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2)
    }

    fn evaluate_objective_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(vec![
            -400.0 * x[0] * (x[1] - x[0] * x[0]) - 2.0 * (1.0 - x[0]),
            200.0 * (x[1] - x[0] * x[0]),
        ])
    }

    fn evaluate_constraints(&self, _x: &DVector<f64>) -> DVector<f64> {
        DVector::zeros(0)
    }

    fn evaluate_constraint_jacobian(&self, _x: &DVector<f64>) -> CsMat<f64> {
        CsMat::zero((0, 2))
    }

    fn evaluate_lagrangian_hessian(
        &self,
        x: &DVector<f64>,
        objective_multiplier: f64,
        _constraint_multipliers: &DVector<f64>,
    ) -> TriMat<f64> {
        let mut hessian = TriMat::new((2, 2));
        hessian.add_triplet(
            0,
            0,
            objective_multiplier * (-400.0 * (x[1] - 3.0 * x[0] * x[0]) + 2.0),
        );
        hessian.add_triplet(1, 0, objective_multiplier * (-400.0 * x[0]));
        hessian.add_triplet(1, 1, objective_multiplier * 200.0);
        hessian
    }
}

/// Hock-Schittkowski problem 71:
///
/// ```text
/// minimize  x1 x4 (x1 + x2 + x3) + x3
/// subject to  x1 x2 x3 x4 >= 25
///             x1^2 + x2^2 + x3^2 + x4^2 = 40
///             1 <= x_i <= 5
/// ```
///
/// The optimum from `(1, 5, 5, 1)` is `(1, 4.743, 3.821, 1.379)` with
/// objective `17.014`.
#[derive(Debug, Clone, Copy)]
pub struct Hs071;

impl Problem for Hs071 {
    fn number_variables(&self) -> usize {
        4
    }

    fn number_constraints(&self) -> usize {
        2
    }

    fn variable_bounds(&self, _variable_index: usize) -> Range {
        Range::new(1.0, 5.0)
    }

    fn constraint_bounds(&self, constraint_index: usize) -> Range {
        if constraint_index == 0 {
            Range::new(25.0, f64::INFINITY)
        } else {
            Range::fixed(40.0)
        }
    }

    fn evaluate_objective(&self, x: &DVector<f64>) -> f64 {
        x[0] * x[3] * (x[0] + x[1] + x[2]) + x[2]
    }

    fn evaluate_objective_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(vec![
            x[3] * (2.0 * x[0] + x[1] + x[2]),
            x[0] * x[3],
            x[0] * x[3] + 1.0,
            x[0] * (x[0] + x[1] + x[2]),
        ])
    }

    fn evaluate_constraints(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(vec![
            x[0] * x[1] * x[2] * x[3],
            x[0] * x[0] + x[1] * x[1] + x[2] * x[2] + x[3] * x[3],
        ])
    }

    fn evaluate_constraint_jacobian(&self, x: &DVector<f64>) -> CsMat<f64> {
        csr_from_rows(
            (2, 4),
            &[
                &[
                    (0, x[1] * x[2] * x[3]),
                    (1, x[0] * x[2] * x[3]),
                    (2, x[0] * x[1] * x[3]),
                    (3, x[0] * x[1] * x[2]),
                ],
                &[
                    (0, 2.0 * x[0]),
                    (1, 2.0 * x[1]),
                    (2, 2.0 * x[2]),
                    (3, 2.0 * x[3]),
                ],
            ],
        )
    }

    fn evaluate_lagrangian_hessian(
        &self,
        x: &DVector<f64>,
        objective_multiplier: f64,
        constraint_multipliers: &DVector<f64>,
    ) -> TriMat<f64> {
        let sigma = objective_multiplier;
        let lambda1 = constraint_multipliers[0];
        let lambda2 = constraint_multipliers[1];
        let mut hessian = TriMat::new((4, 4));
        // objective part
        hessian.add_triplet(0, 0, sigma * 2.0 * x[3]);
        hessian.add_triplet(1, 0, sigma * x[3]);
        hessian.add_triplet(2, 0, sigma * x[3]);
        hessian.add_triplet(3, 0, sigma * (2.0 * x[0] + x[1] + x[2]));
        hessian.add_triplet(3, 1, sigma * x[0]);
        hessian.add_triplet(3, 2, sigma * x[0]);
        // product constraint
        hessian.add_triplet(1, 0, -lambda1 * x[2] * x[3]);
        hessian.add_triplet(2, 0, -lambda1 * x[1] * x[3]);
        hessian.add_triplet(2, 1, -lambda1 * x[0] * x[3]);
        hessian.add_triplet(3, 0, -lambda1 * x[1] * x[2]);
        hessian.add_triplet(3, 1, -lambda1 * x[0] * x[2]);
        hessian.add_triplet(3, 2, -lambda1 * x[0] * x[1]);
        // sphere constraint
        for i in 0..4 {
            hessian.add_triplet(i, i, -lambda2 * 2.0);
        }
        hessian
    }
}

/// Hock-Schittkowski problem 15:
///
/// ```text
/// minimize  100 (x2 - x1^2)^2 + (1 - x1)^2
/// subject to  x1 x2 >= 1
///             x1 + x2^2 >= 0
///             x1 <= 0.5
/// ```
///
/// The optimum from `(-2, 1)` is `(0.5, 2)` with objective `306.5`.
#[derive(Debug, Clone, Copy)]
pub struct Hs015;

impl Problem for Hs015 {
    fn number_variables(&self) -> usize {
        2
    }

    fn number_constraints(&self) -> usize {
        2
    }

    fn variable_bounds(&self, variable_index: usize) -> Range {
        if variable_index == 0 {
            Range::new(f64::NEG_INFINITY, 0.5)
        } else {
            Range::unbounded()
        }
    }

    fn constraint_bounds(&self, constraint_index: usize) -> Range {
        let lower = if constraint_index == 0 { 1.0 } else { 0.0 };
        Range::new(lower, f64::INFINITY)
    }

    fn evaluate_objective(&self, x: &DVector<f64>) -> f64 {
        100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2)
    }

    fn evaluate_objective_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(vec![
            -400.0 * x[0] * (x[1] - x[0] * x[0]) - 2.0 * (1.0 - x[0]),
            200.0 * (x[1] - x[0] * x[0]),
        ])
    }

    fn evaluate_constraints(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(vec![x[0] * x[1], x[0] + x[1] * x[1]])
    }

    fn evaluate_constraint_jacobian(&self, x: &DVector<f64>) -> CsMat<f64> {
        csr_from_rows(
            (2, 2),
            &[&[(0, x[1]), (1, x[0])], &[(0, 1.0), (1, 2.0 * x[1])]],
        )
    }

    fn evaluate_lagrangian_hessian(
        &self,
        x: &DVector<f64>,
        objective_multiplier: f64,
        constraint_multipliers: &DVector<f64>,
    ) -> TriMat<f64> {
        let sigma = objective_multiplier;
        let mut hessian = TriMat::new((2, 2));
        hessian.add_triplet(0, 0, sigma * (-400.0 * (x[1] - 3.0 * x[0] * x[0]) + 2.0));
        hessian.add_triplet(1, 0, sigma * (-400.0 * x[0]) - constraint_multipliers[0]);
        hessian.add_triplet(1, 1, sigma * 200.0 - constraint_multipliers[1] * 2.0);
        hessian
    }
}

/// An infeasible linear program: `min x` subject to `x >= 1` and `x <= 0`.
///
/// The minimum-ℓ₁-violation set is the interval `[0, 1]`, on which the sum
/// of the two violations is constantly one.
#[derive(Debug, Clone, Copy)]
pub struct InfeasibleLp;

impl Problem for InfeasibleLp {
    fn number_variables(&self) -> usize {
        1
    }

    fn number_constraints(&self) -> usize {
        2
    }

    fn variable_bounds(&self, _variable_index: usize) -> Range {
        Range::unbounded()
    }

    fn constraint_bounds(&self, constraint_index: usize) -> Range {
        if constraint_index == 0 {
            Range::new(1.0, f64::INFINITY)
        } else {
            Range::new(f64::NEG_INFINITY, 0.0)
        }
    }

    fn evaluate_objective(&self, x: &DVector<f64>) -> f64 {
        x[0]
    }

    fn evaluate_objective_gradient(&self, _x: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(vec![1.0])
    }

    fn evaluate_constraints(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(vec![x[0], x[0]])
    }

    fn evaluate_constraint_jacobian(&self, _x: &DVector<f64>) -> CsMat<f64> {
        csr_from_rows((2, 1), &[&[(0, 1.0)], &[(0, 1.0)]])
    }

    fn evaluate_lagrangian_hessian(
        &self,
        _x: &DVector<f64>,
        _objective_multiplier: f64,
        _constraint_multipliers: &DVector<f64>,
    ) -> TriMat<f64> {
        TriMat::new((1, 1))
    }

    fn constraint_type(&self, _constraint_index: usize) -> FunctionType {
        FunctionType::Linear
    }
}

/// A strictly convex bowl over a linear polytope, for testing the
/// projection of infeasible initial points:
///
/// ```text
/// minimize  x1^2 + x2^2
/// subject to  x1 + x2 <= 1,   x1 - x2 >= -1
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LinearlyConstrainedProblem;

impl Problem for LinearlyConstrainedProblem {
    fn number_variables(&self) -> usize {
        2
    }

    fn number_constraints(&self) -> usize {
        2
    }

    fn variable_bounds(&self, _variable_index: usize) -> Range {
        Range::unbounded()
    }

    fn constraint_bounds(&self, constraint_index: usize) -> Range {
        if constraint_index == 0 {
            Range::new(f64::NEG_INFINITY, 1.0)
        } else {
            Range::new(-1.0, f64::INFINITY)
        }
    }

    fn evaluate_objective(&self, x: &DVector<f64>) -> f64 {
        x[0] * x[0] + x[1] * x[1]
    }

    fn evaluate_objective_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(vec![2.0 * x[0], 2.0 * x[1]])
    }

    fn evaluate_constraints(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(vec![x[0] + x[1], x[0] - x[1]])
    }

    fn evaluate_constraint_jacobian(&self, _x: &DVector<f64>) -> CsMat<f64> {
        csr_from_rows((2, 2), &[&[(0, 1.0), (1, 1.0)], &[(0, 1.0), (1, -1.0)]])
    }

    fn evaluate_lagrangian_hessian(
        &self,
        _x: &DVector<f64>,
        objective_multiplier: f64,
        _constraint_multipliers: &DVector<f64>,
    ) -> TriMat<f64> {
        let mut hessian = TriMat::new((2, 2));
        hessian.add_triplet(0, 0, objective_multiplier * 2.0);
        hessian.add_triplet(1, 1, objective_multiplier * 2.0);
        hessian
    }

    fn constraint_type(&self, _constraint_index: usize) -> FunctionType {
        FunctionType::Linear
    }
}

/// A poorly scaled problem with steep gradients, for testing the function
/// scaling: `min 1000 x^2` subject to `500 x <= 1`.
#[derive(Debug, Clone, Copy)]
pub struct SteepProblem;

impl Problem for SteepProblem {
    fn number_variables(&self) -> usize {
        1
    }

    fn number_constraints(&self) -> usize {
        1
    }

    fn variable_bounds(&self, _variable_index: usize) -> Range {
        Range::unbounded()
    }

    fn constraint_bounds(&self, _constraint_index: usize) -> Range {
        Range::new(f64::NEG_INFINITY, 1.0)
    }

    fn evaluate_objective(&self, x: &DVector<f64>) -> f64 {
        1000.0 * x[0] * x[0]
    }

    fn evaluate_objective_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(vec![2000.0 * x[0]])
    }

    fn evaluate_constraints(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(vec![500.0 * x[0]])
    }

    fn evaluate_constraint_jacobian(&self, _x: &DVector<f64>) -> CsMat<f64> {
        csr_from_rows((1, 1), &[&[(0, 500.0)]])
    }

    fn evaluate_lagrangian_hessian(
        &self,
        _x: &DVector<f64>,
        objective_multiplier: f64,
        _constraint_multipliers: &DVector<f64>,
    ) -> TriMat<f64> {
        let mut hessian = TriMat::new((1, 1));
        hessian.add_triplet(0, 0, objective_multiplier * 2000.0);
        hessian
    }

    fn constraint_type(&self, _constraint_index: usize) -> FunctionType {
        FunctionType::Linear
    }
}

/// A convex bowl with a narrow feasible strip away from the unconstrained
/// minimizer, on which filter and merit strategies take visibly different
/// paths:
///
/// ```text
/// minimize  x1^2 + x2^2
/// subject to  0.99 <= x1 - x2 + 0.05 x1^2 <= 1.01
/// ```
#[derive(Debug, Clone, Copy)]
pub struct NarrowStrip;

impl Problem for NarrowStrip {
    fn number_variables(&self) -> usize {
        2
    }

    fn number_constraints(&self) -> usize {
        1
    }

    fn variable_bounds(&self, _variable_index: usize) -> Range {
        Range::unbounded()
    }

    fn constraint_bounds(&self, _constraint_index: usize) -> Range {
        Range::new(0.99, 1.01)
    }

    fn evaluate_objective(&self, x: &DVector<f64>) -> f64 {
        x[0] * x[0] + x[1] * x[1]
    }

    fn evaluate_objective_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(vec![2.0 * x[0], 2.0 * x[1]])
    }

    fn evaluate_constraints(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(vec![x[0] - x[1] + 0.05 * x[0] * x[0]])
    }

    fn evaluate_constraint_jacobian(&self, x: &DVector<f64>) -> CsMat<f64> {
        csr_from_rows((1, 2), &[&[(0, 1.0 + 0.1 * x[0]), (1, -1.0)]])
    }

    fn evaluate_lagrangian_hessian(
        &self,
        _x: &DVector<f64>,
        objective_multiplier: f64,
        constraint_multipliers: &DVector<f64>,
    ) -> TriMat<f64> {
        let mut hessian = TriMat::new((2, 2));
        hessian.add_triplet(
            0,
            0,
            objective_multiplier * 2.0 - constraint_multipliers[0] * 0.1,
        );
        hessian.add_triplet(1, 1, objective_multiplier * 2.0);
        hessian
    }
}

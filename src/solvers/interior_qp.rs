//! Solution of quadratic and linear subproblems.
//!
//! The boundary matches active-set QP codes in the BQPD mold: bounds,
//! linearized constraints, gradient, Jacobian, optional Hessian and a warm
//! start go in, a primal-dual solution with a status comes out. The built-in
//! implementation is a primal-dual interior point method in the style of the
//! MATPOWER Interior Point Solver: variable bounds and two-sided linearized
//! constraints are split into equalities and one-sided inequalities with
//! positive slacks, and a damped Newton iteration is applied to the
//! perturbed KKT conditions.
//!
//! Infeasible linearizations are handled with internal exact-penalty elastic
//! variables: the elastic subproblem is always feasible, and elastics that
//! remain active at the solution reveal the infeasible constraints, which
//! are reported as a [`ConstraintPartition`].

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use sprs::{CsMat, TriMat};

use crate::core::direction::{ConstraintPartition, SubproblemStatus};
use crate::core::error::NumericalError;
use crate::core::problem::Range;
use crate::solvers::lbl::{DirectSymmetricIndefiniteSolver, LblFactorization};

/// A local quadratic (or linear) model to be solved.
///
/// ```text
/// minimize  gᵀd + 1/2 dᵀHd
/// subject to  cl <= Ad <= cu,   xl <= d <= xu
/// ```
///
/// `H` covers the leading variables only; trailing variables (elastics added
/// by a relaxation strategy) carry no curvature.
pub struct QuadraticProgram<'a> {
    /// Gradient `g` of the model objective.
    pub gradient: &'a DVector<f64>,
    /// Lower triangle of `H`; `None` for a linear program.
    pub hessian: Option<&'a TriMat<f64>>,
    /// Constraint matrix `A`, row-major.
    pub jacobian: &'a CsMat<f64>,
    /// Bounds `[xl, xu]` on the variables.
    pub variable_bounds: &'a [Range],
    /// Bounds `[cl, cu]` on the rows of `A`.
    pub constraint_bounds: &'a [Range],
    /// Warm-start point.
    pub initial_point: &'a DVector<f64>,
}

/// Primal-dual solution of a [`QuadraticProgram`].
pub struct QpSolution {
    /// Optimal displacement.
    pub primals: DVector<f64>,
    /// Constraint multipliers (lower-active nonnegative, upper-active
    /// nonpositive).
    pub constraint_multipliers: DVector<f64>,
    /// Nonnegative multipliers of the lower variable bounds.
    pub lower_bound_multipliers: DVector<f64>,
    /// Nonpositive multipliers of the upper variable bounds.
    pub upper_bound_multipliers: DVector<f64>,
    /// Model objective value at the solution.
    pub objective: f64,
    /// Solver status.
    pub status: SubproblemStatus,
    /// Partition of the constraints when the linearization is infeasible.
    pub constraint_partition: Option<ConstraintPartition>,
}

/// Interface of a QP/LP solver.
pub trait QpSolver {
    /// Solves a quadratic program.
    fn solve_qp(&mut self, qp: &QuadraticProgram) -> Result<QpSolution, NumericalError>;

    /// Solves a linear program (the Hessian of `lp` is ignored).
    fn solve_lp(&mut self, lp: &QuadraticProgram) -> Result<QpSolution, NumericalError> {
        let lp = QuadraticProgram {
            hessian: None,
            ..*lp
        };
        self.solve_qp(&lp)
    }
}

// one-sided inequality row `coefficients · w <= rhs`
struct SparseRow {
    coefficients: Vec<(usize, f64)>,
    rhs: f64,
}

#[derive(Clone, Copy)]
enum RowOrigin {
    VariableLower(usize),
    VariableUpper(usize),
    ConstraintLower(usize),
    ConstraintUpper(usize),
    Elastic,
}

/// Primal-dual interior point QP/LP solver with elastic infeasibility
/// detection.
pub struct InteriorQpSolver {
    /// Relative convergence tolerance of the Newton iteration.
    pub tolerance: f64,
    /// Maximum number of Newton iterations.
    pub max_iterations: usize,
    /// Fraction-to-the-boundary constant, slightly less than 1.
    pub xi: f64,
    /// Centering parameter.
    pub sigma: f64,
    /// Initial slack value.
    pub initial_slack: f64,
    /// Exact-penalty coefficient of the internal elastic variables.
    pub elastic_penalty: f64,
    /// Elastics larger than this value flag the linearization infeasible.
    pub infeasibility_tolerance: f64,
    /// Newton steps larger than this value flag the subproblem unbounded.
    pub max_step_size: f64,
    factorization: LblFactorization,
}

impl Default for InteriorQpSolver {
    fn default() -> Self {
        Self {
            tolerance: 1e-12,
            max_iterations: 300,
            xi: 0.999_95,
            sigma: 0.1,
            initial_slack: 1.0,
            elastic_penalty: 1e3,
            infeasibility_tolerance: 1e-6,
            max_step_size: 1e10,
            factorization: LblFactorization::new(),
        }
    }
}

impl InteriorQpSolver {
    /// Creates a solver with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_hessian(hessian: Option<&TriMat<f64>>, w: &DVector<f64>, result: &mut DVector<f64>) {
        if let Some(hessian) = hessian {
            for (&value, (i, j)) in hessian.triplet_iter() {
                result[i] += value * w[j];
                if i != j {
                    result[j] += value * w[i];
                }
            }
        }
    }

    fn model_objective(qp: &QuadraticProgram, primals: &DVector<f64>) -> f64 {
        let mut value = qp.gradient.dot(primals);
        if let Some(hessian) = qp.hessian {
            for (&entry, (i, j)) in hessian.triplet_iter() {
                let term = entry * primals[i] * primals[j];
                value += if i == j { 0.5 * term } else { term };
            }
        }
        value
    }

    // Newton matrix of the condensed system, factorized with inertia
    // correction until the inertia is (nw, n_eq, 0)
    #[allow(clippy::too_many_arguments)]
    fn factorize_kkt(
        &mut self,
        newton_matrix: &DMatrix<f64>,
        equalities: &[SparseRow],
        nw: usize,
    ) -> Result<(), NumericalError> {
        let n_eq = equalities.len();
        let dimension = nw + n_eq;
        let mut regularization = 0.0;
        let mut dual_regularization = 0.0;

        for _attempt in 0..60 {
            let mut kkt = TriMat::new((dimension, dimension));
            for i in 0..nw {
                for j in 0..=i {
                    let value = newton_matrix[(i, j)];
                    if value != 0.0 {
                        kkt.add_triplet(i, j, value);
                    }
                }
                if regularization != 0.0 {
                    kkt.add_triplet(i, i, regularization);
                }
            }
            for (k, row) in equalities.iter().enumerate() {
                for &(j, value) in &row.coefficients {
                    kkt.add_triplet(nw + k, j, value);
                }
                if dual_regularization != 0.0 {
                    kkt.add_triplet(nw + k, nw + k, -dual_regularization);
                }
            }
            self.factorization.factorize(&kkt)?;
            if self.factorization.inertia() == (nw, n_eq, 0) {
                if regularization != 0.0 {
                    debug!("KKT matrix regularized with {:e}", regularization);
                }
                return Ok(());
            }
            if self.factorization.matrix_is_singular() && dual_regularization == 0.0 {
                dual_regularization = 1e-8;
            }
            regularization = if regularization == 0.0 {
                1e-4
            } else {
                8.0 * regularization
            };
        }
        Err(NumericalError::Factorization("KKT"))
    }
}

impl QpSolver for InteriorQpSolver {
    fn solve_qp(&mut self, qp: &QuadraticProgram) -> Result<QpSolution, NumericalError> {
        let nv = qp.gradient.len();
        let m = qp.constraint_bounds.len();
        // internal elastics p, n for every constraint row
        let nw = nv + 2 * m;
        let elastic_positive = |j: usize| nv + j;
        let elastic_negative = |j: usize| nv + m + j;

        // extended gradient with the exact elastic penalty
        let mut gradient = DVector::zeros(nw);
        gradient.rows_mut(0, nv).copy_from(qp.gradient);
        for j in 0..2 * m {
            gradient[nv + j] = self.elastic_penalty;
        }

        // sparse rows of the constraint matrix, with elastic contributions
        let constraint_rows: Vec<Vec<(usize, f64)>> = qp
            .jacobian
            .outer_iterator()
            .enumerate()
            .map(|(j, row)| {
                let mut coefficients: Vec<(usize, f64)> =
                    row.iter().map(|(i, &v)| (i, v)).collect();
                coefficients.push((elastic_positive(j), 1.0));
                coefficients.push((elastic_negative(j), -1.0));
                coefficients
            })
            .collect();

        // split everything into equalities and one-sided inequalities
        let mut equalities: Vec<SparseRow> = Vec::new();
        let mut inequalities: Vec<SparseRow> = Vec::new();
        let mut origins: Vec<RowOrigin> = Vec::new();
        let mut equality_origins: Vec<RowOrigin> = Vec::new();

        for (i, bounds) in qp.variable_bounds.iter().enumerate() {
            if bounds.is_equality() {
                equalities.push(SparseRow {
                    coefficients: vec![(i, 1.0)],
                    rhs: bounds.lower,
                });
                equality_origins.push(RowOrigin::VariableLower(i));
            } else {
                if bounds.upper.is_finite() {
                    inequalities.push(SparseRow {
                        coefficients: vec![(i, 1.0)],
                        rhs: bounds.upper,
                    });
                    origins.push(RowOrigin::VariableUpper(i));
                }
                if bounds.lower.is_finite() {
                    inequalities.push(SparseRow {
                        coefficients: vec![(i, -1.0)],
                        rhs: -bounds.lower,
                    });
                    origins.push(RowOrigin::VariableLower(i));
                }
            }
        }
        for (j, bounds) in qp.constraint_bounds.iter().enumerate() {
            if bounds.is_equality() {
                equalities.push(SparseRow {
                    coefficients: constraint_rows[j].clone(),
                    rhs: bounds.lower,
                });
                equality_origins.push(RowOrigin::ConstraintLower(j));
            } else {
                if bounds.upper.is_finite() {
                    inequalities.push(SparseRow {
                        coefficients: constraint_rows[j].clone(),
                        rhs: bounds.upper,
                    });
                    origins.push(RowOrigin::ConstraintUpper(j));
                }
                if bounds.lower.is_finite() {
                    inequalities.push(SparseRow {
                        coefficients: constraint_rows[j]
                            .iter()
                            .map(|&(i, v)| (i, -v))
                            .collect(),
                        rhs: -bounds.lower,
                    });
                    origins.push(RowOrigin::ConstraintLower(j));
                }
            }
        }
        for j in 0..2 * m {
            inequalities.push(SparseRow {
                coefficients: vec![(nv + j, -1.0)],
                rhs: 0.0,
            });
            origins.push(RowOrigin::Elastic);
        }
        let n_eq = equalities.len();
        let n_iq = inequalities.len();

        // primal-dual starting point
        let mut w = DVector::zeros(nw);
        w.rows_mut(0, nv).copy_from(qp.initial_point);
        let row_value = |row: &SparseRow, w: &DVector<f64>| -> f64 {
            row.coefficients.iter().map(|&(i, v)| v * w[i]).sum::<f64>() - row.rhs
        };
        let mut gamma = 1.0;
        let mut lam = DVector::zeros(n_eq);
        let mut h = DVector::from_iterator(n_iq, inequalities.iter().map(|r| row_value(r, &w)));
        let mut z = DVector::from_iterator(
            n_iq,
            h.iter()
                .map(|&hk| if hk < -self.initial_slack { -hk } else { self.initial_slack }),
        );
        let mut mu = DVector::from_iterator(
            n_iq,
            z.iter().map(|&zk| (gamma / zk).max(self.initial_slack)),
        );

        let objective_gradient = |w: &DVector<f64>| -> DVector<f64> {
            let mut value = gradient.clone();
            Self::apply_hessian(qp.hessian, w, &mut value);
            value
        };
        let lagrangian_gradient = |w: &DVector<f64>,
                                   lam: &DVector<f64>,
                                   mu: &DVector<f64>,
                                   equalities: &[SparseRow],
                                   inequalities: &[SparseRow]|
         -> DVector<f64> {
            let mut value = objective_gradient(w);
            for (k, row) in equalities.iter().enumerate() {
                for &(i, v) in &row.coefficients {
                    value[i] += lam[k] * v;
                }
            }
            for (k, row) in inequalities.iter().enumerate() {
                for &(i, v) in &row.coefficients {
                    value[i] += mu[k] * v;
                }
            }
            value
        };

        let mut status = SubproblemStatus::Error;
        for iteration in 1..=self.max_iterations {
            let l_x = lagrangian_gradient(&w, &lam, &mu, &equalities, &inequalities);

            // Newton matrix M = H + Aiᵀ Z⁻¹ U Ai and right-hand side
            let mut newton_matrix = DMatrix::zeros(nw, nw);
            if let Some(hessian) = qp.hessian {
                for (&value, (i, j)) in hessian.triplet_iter() {
                    newton_matrix[(i, j)] += value;
                    if i != j {
                        newton_matrix[(j, i)] += value;
                    }
                }
            }
            let mut newton_rhs = l_x.clone();
            for (k, row) in inequalities.iter().enumerate() {
                let weight = mu[k] / z[k];
                for &(i, vi) in &row.coefficients {
                    for &(j, vj) in &row.coefficients {
                        newton_matrix[(i, j)] += weight * vi * vj;
                    }
                }
                let residual = (mu[k] * h[k] + gamma) / z[k];
                for &(i, vi) in &row.coefficients {
                    newton_rhs[i] += residual * vi;
                }
            }

            self.factorize_kkt(&newton_matrix, &equalities, nw)?;
            let mut rhs = DVector::zeros(nw + n_eq);
            for i in 0..nw {
                rhs[i] = -newton_rhs[i];
            }
            for (k, row) in equalities.iter().enumerate() {
                rhs[nw + k] = -row_value(row, &w);
            }
            let solution = self.factorization.solve(&rhs)?;
            if solution.iter().any(|v| !v.is_finite()) {
                return Err(NumericalError::NonFinite("the Newton step"));
            }
            let dw = solution.rows(0, nw).into_owned();
            let dlam = solution.rows(nw, n_eq).into_owned();
            if dw.norm() > self.max_step_size {
                debug!("Newton step blew up, flagging the subproblem unbounded");
                status = SubproblemStatus::Unbounded;
                break;
            }

            let mut dz = DVector::zeros(n_iq);
            let mut dmu = DVector::zeros(n_iq);
            for (k, row) in inequalities.iter().enumerate() {
                let advance: f64 = row.coefficients.iter().map(|&(i, v)| v * dw[i]).sum();
                dz[k] = -h[k] - z[k] - advance;
                dmu[k] = -mu[k] + (gamma - mu[k] * dz[k]) / z[k];
            }

            // fraction-to-the-boundary step lengths
            let mut alpha_primal: f64 = 1.0;
            let mut alpha_dual: f64 = 1.0;
            for k in 0..n_iq {
                if dz[k] < 0.0 {
                    alpha_primal = alpha_primal.min(self.xi * z[k] / -dz[k]);
                }
                if dmu[k] < 0.0 {
                    alpha_dual = alpha_dual.min(self.xi * mu[k] / -dmu[k]);
                }
            }

            w.axpy(alpha_primal, &dw, 1.0);
            z.axpy(alpha_primal, &dz, 1.0);
            lam.axpy(alpha_dual, &dlam, 1.0);
            mu.axpy(alpha_dual, &dmu, 1.0);
            if n_iq > 0 {
                gamma = self.sigma * z.dot(&mu) / n_iq as f64;
            }

            for (k, row) in inequalities.iter().enumerate() {
                h[k] = row_value(row, &w);
            }
            let l_x = lagrangian_gradient(&w, &lam, &mu, &equalities, &inequalities);
            let equality_residual = equalities
                .iter()
                .map(|row| row_value(row, &w).abs())
                .fold(0.0, f64::max);
            let max_h = h.iter().copied().fold(0.0f64, f64::max);
            let w_norm = if nw > 0 { w.amax() } else { 0.0 };
            let z_norm = if n_iq > 0 { z.amax() } else { 0.0 };
            let multiplier_norm = {
                let lam_norm = if n_eq > 0 { lam.amax() } else { 0.0 };
                let mu_norm = if n_iq > 0 { mu.amax() } else { 0.0 };
                lam_norm.max(mu_norm)
            };
            let feasibility_condition =
                equality_residual.max(max_h) / (1.0 + w_norm.max(z_norm));
            let gradient_condition = l_x.amax() / (1.0 + multiplier_norm);
            let complementarity_condition = z.dot(&mu) / (1.0 + w_norm);

            debug!(
                "QP Newton iteration {}: feas {:.2e}, grad {:.2e}, comp {:.2e}",
                iteration, feasibility_condition, gradient_condition, complementarity_condition
            );
            if feasibility_condition < self.tolerance
                && gradient_condition < self.tolerance
                && complementarity_condition < self.tolerance
            {
                status = SubproblemStatus::Optimal;
                break;
            }
            // loose fallback when the last iterations stall
            if iteration == self.max_iterations
                && feasibility_condition < 1e-6
                && gradient_condition < 1e-6
                && complementarity_condition < 1e-6
            {
                warn!("QP solver stalled with loose accuracy, accepting the solution");
                status = SubproblemStatus::Optimal;
            }
        }

        if status == SubproblemStatus::Unbounded {
            return Ok(QpSolution {
                primals: DVector::zeros(nv),
                constraint_multipliers: DVector::zeros(m),
                lower_bound_multipliers: DVector::zeros(nv),
                upper_bound_multipliers: DVector::zeros(nv),
                objective: f64::NEG_INFINITY,
                status,
                constraint_partition: None,
            });
        }
        if status != SubproblemStatus::Optimal {
            return Err(NumericalError::SubproblemFailure);
        }

        // map the internal multipliers back to the caller's constraints and
        // bounds
        let mut constraint_multipliers = DVector::zeros(m);
        let mut bound_duals: DVector<f64> = DVector::zeros(nv);
        for (k, origin) in equality_origins.iter().enumerate() {
            match *origin {
                RowOrigin::VariableLower(i) | RowOrigin::VariableUpper(i) => {
                    bound_duals[i] -= lam[k];
                }
                RowOrigin::ConstraintLower(j) | RowOrigin::ConstraintUpper(j) => {
                    constraint_multipliers[j] -= lam[k];
                }
                RowOrigin::Elastic => {}
            }
        }
        for (k, origin) in origins.iter().enumerate() {
            match *origin {
                RowOrigin::VariableLower(i) => bound_duals[i] += mu[k],
                RowOrigin::VariableUpper(i) => bound_duals[i] -= mu[k],
                RowOrigin::ConstraintLower(j) => constraint_multipliers[j] += mu[k],
                RowOrigin::ConstraintUpper(j) => constraint_multipliers[j] -= mu[k],
                RowOrigin::Elastic => {}
            }
        }
        let lower_bound_multipliers =
            DVector::from_iterator(nv, bound_duals.iter().map(|&v| v.max(0.0)));
        let upper_bound_multipliers =
            DVector::from_iterator(nv, bound_duals.iter().map(|&v| v.min(0.0)));

        // elastics still active at the solution reveal infeasible rows
        let mut partition = ConstraintPartition::default();
        for j in 0..m {
            let positive = w[elastic_positive(j)];
            let negative = w[elastic_negative(j)];
            debug_assert!(positive >= -1e-12 && negative >= -1e-12);
            if positive > self.infeasibility_tolerance {
                partition.infeasible.push(j);
                partition.lower_bound_infeasible.push(j);
            } else if negative > self.infeasibility_tolerance {
                partition.infeasible.push(j);
                partition.upper_bound_infeasible.push(j);
            } else {
                partition.feasible.push(j);
            }
        }
        let infeasible = !partition.infeasible.is_empty();

        let primals = w.rows(0, nv).into_owned();
        let objective = Self::model_objective(qp, &primals);
        Ok(QpSolution {
            primals,
            constraint_multipliers,
            lower_bound_multipliers,
            upper_bound_multipliers,
            objective,
            status: if infeasible {
                SubproblemStatus::Infeasible
            } else {
                SubproblemStatus::Optimal
            },
            constraint_partition: if infeasible { Some(partition) } else { None },
        })
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    fn unbounded_ranges(n: usize) -> Vec<Range> {
        vec![Range::unbounded(); n]
    }

    #[test]
    fn unconstrained_strictly_convex_qp() {
        // minimize 1/2 (d1^2 + d2^2) - d1: solution (1, 0)
        let gradient = DVector::from_vec(vec![-1.0, 0.0]);
        let mut hessian = TriMat::new((2, 2));
        hessian.add_triplet(0, 0, 1.0);
        hessian.add_triplet(1, 1, 1.0);
        let jacobian = CsMat::zero((0, 2));
        let bounds = unbounded_ranges(2);
        let initial = DVector::zeros(2);
        let qp = QuadraticProgram {
            gradient: &gradient,
            hessian: Some(&hessian),
            jacobian: &jacobian,
            variable_bounds: &bounds,
            constraint_bounds: &[],
            initial_point: &initial,
        };
        let mut solver = InteriorQpSolver::new();
        let solution = solver.solve_qp(&qp).unwrap();
        assert_eq!(solution.status, SubproblemStatus::Optimal);
        assert_approx_eq!(f64, solution.primals[0], 1.0, epsilon = 1e-7);
        assert_approx_eq!(f64, solution.primals[1], 0.0, epsilon = 1e-7);
        assert_approx_eq!(f64, solution.objective, -0.5, epsilon = 1e-7);
    }

    #[test]
    fn bound_constrained_qp_reports_active_multiplier() {
        // minimize 1/2 d^2 - 2d subject to d <= 1: solution d = 1, dual 1
        let gradient = DVector::from_vec(vec![-2.0]);
        let mut hessian = TriMat::new((1, 1));
        hessian.add_triplet(0, 0, 1.0);
        let jacobian = CsMat::zero((0, 1));
        let bounds = vec![Range::new(f64::NEG_INFINITY, 1.0)];
        let initial = DVector::zeros(1);
        let qp = QuadraticProgram {
            gradient: &gradient,
            hessian: Some(&hessian),
            jacobian: &jacobian,
            variable_bounds: &bounds,
            constraint_bounds: &[],
            initial_point: &initial,
        };
        let mut solver = InteriorQpSolver::new();
        let solution = solver.solve_qp(&qp).unwrap();
        assert_approx_eq!(f64, solution.primals[0], 1.0, epsilon = 1e-7);
        assert_approx_eq!(
            f64,
            solution.upper_bound_multipliers[0],
            -1.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn equality_constrained_qp() {
        // minimize 1/2||d||^2 - d1 subject to d1 + d2 = 1
        let gradient = DVector::from_vec(vec![-1.0, 0.0]);
        let mut hessian = TriMat::new((2, 2));
        hessian.add_triplet(0, 0, 1.0);
        hessian.add_triplet(1, 1, 1.0);
        let mut jacobian = TriMat::new((1, 2));
        jacobian.add_triplet(0, 0, 1.0);
        jacobian.add_triplet(0, 1, 1.0);
        let jacobian = jacobian.to_csr::<usize>();
        let bounds = unbounded_ranges(2);
        let constraint_bounds = vec![Range::fixed(1.0)];
        let initial = DVector::zeros(2);
        let qp = QuadraticProgram {
            gradient: &gradient,
            hessian: Some(&hessian),
            jacobian: &jacobian,
            variable_bounds: &bounds,
            constraint_bounds: &constraint_bounds,
            initial_point: &initial,
        };
        let mut solver = InteriorQpSolver::new();
        let solution = solver.solve_qp(&qp).unwrap();
        assert_eq!(solution.status, SubproblemStatus::Optimal);
        assert_approx_eq!(f64, solution.primals[0], 1.0, epsilon = 1e-6);
        assert_approx_eq!(f64, solution.primals[1], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn nonconvex_qp_is_convexified_inside_bounds() {
        // maximize d^2 within [-1, 2]: the regularized model still returns a
        // finite point
        let gradient = DVector::from_vec(vec![0.5]);
        let mut hessian = TriMat::new((1, 1));
        hessian.add_triplet(0, 0, -1.0);
        let jacobian = CsMat::zero((0, 1));
        let bounds = vec![Range::new(-1.0, 2.0)];
        let initial = DVector::zeros(1);
        let qp = QuadraticProgram {
            gradient: &gradient,
            hessian: Some(&hessian),
            jacobian: &jacobian,
            variable_bounds: &bounds,
            constraint_bounds: &[],
            initial_point: &initial,
        };
        let mut solver = InteriorQpSolver::new();
        let solution = solver.solve_qp(&qp).unwrap();
        assert!(solution.primals[0].is_finite());
        assert!((-1.0 - 1e-6..=2.0 + 1e-6).contains(&solution.primals[0]));
    }

    #[test]
    fn infeasible_rows_are_partitioned() {
        // d >= 1 and d <= 0 cannot hold together
        let gradient = DVector::from_vec(vec![1.0]);
        let mut jacobian = TriMat::new((2, 1));
        jacobian.add_triplet(0, 0, 1.0);
        jacobian.add_triplet(1, 0, 1.0);
        let jacobian = jacobian.to_csr::<usize>();
        let bounds = unbounded_ranges(1);
        let constraint_bounds = vec![
            Range::new(1.0, f64::INFINITY),
            Range::new(f64::NEG_INFINITY, 0.0),
        ];
        let initial = DVector::zeros(1);
        let qp = QuadraticProgram {
            gradient: &gradient,
            hessian: None,
            jacobian: &jacobian,
            variable_bounds: &bounds,
            constraint_bounds: &constraint_bounds,
            initial_point: &initial,
        };
        let mut solver = InteriorQpSolver::new();
        let solution = solver.solve_lp(&qp).unwrap();
        assert_eq!(solution.status, SubproblemStatus::Infeasible);
        let partition = solution.constraint_partition.unwrap();
        assert_eq!(partition.infeasible.len(), 1);
        assert_eq!(partition.feasible.len(), 1);
    }

    #[test]
    fn lp_respects_trust_region_box() {
        // minimize d within [-2, 2]: solution at the lower box bound
        let gradient = DVector::from_vec(vec![1.0]);
        let jacobian = CsMat::zero((0, 1));
        let bounds = vec![Range::new(-2.0, 2.0)];
        let initial = DVector::zeros(1);
        let lp = QuadraticProgram {
            gradient: &gradient,
            hessian: None,
            jacobian: &jacobian,
            variable_bounds: &bounds,
            constraint_bounds: &[],
            initial_point: &initial,
        };
        let mut solver = InteriorQpSolver::new();
        let solution = solver.solve_lp(&lp).unwrap();
        assert_approx_eq!(f64, solution.primals[0], -2.0, epsilon = 1e-6);
    }
}

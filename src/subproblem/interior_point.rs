//! Primal-dual interior-point subproblem.
//!
//! Inequality constraints are handled with internal slacks and the variable
//! bounds with logarithmic barrier terms of parameter `μ`. One Newton step
//! on the perturbed KKT conditions is computed per outer iteration by the
//! direct symmetric indefinite solver, with inertia correction of the
//! augmented matrix. The barrier parameter follows the monotone
//! Fiacco-McCormick update and primal and dual steps are bounded by the
//! fraction-to-the-boundary rule.

use log::{debug, warn};
use nalgebra::DVector;
use num_traits::clamp;
use sprs::TriMat;

use crate::core::direction::{ConstraintPartition, Direction, SubproblemStatus};
use crate::core::error::NumericalError;
use crate::core::iterate::{Iterate, Multipliers, ProgressMeasures};
use crate::core::problem::{Norm, Problem, Range};
use crate::options::{ConfigurationError, Options};
use crate::solvers::lbl::{DirectSymmetricIndefiniteSolver, LblFactorization};
use crate::subproblem::{ElasticVariables, PredictedReductionModel, Subproblem};

// bound on the primal-dual Hessian of the barrier terms, relative to mu
const KAPPA_SIGMA: f64 = 1e10;

/// Barrier subproblem: one inertia-corrected Newton step on the perturbed
/// KKT system per outer iteration.
pub struct PrimalDualInteriorPoint {
    barrier_parameter: f64,
    smallest_barrier_parameter: f64,
    decrease_factor: f64,
    superlinear_exponent: f64,
    tau_min: f64,
    tau: f64,
    kappa_epsilon: f64,
    damping_factor: f64,
    push_factor: f64,
    progress_norm: Norm,
    objective_multiplier: f64,
    // internal slack state, one entry per inequality constraint
    inequality_constraints: Vec<usize>,
    slacks: DVector<f64>,
    factorization: LblFactorization,
    definition_changed: bool,
    last_linear_term: f64,
    last_quadratic_term: f64,
}

impl PrimalDualInteriorPoint {
    /// Creates the subproblem from the options map.
    pub fn new(problem: &dyn Problem, options: &Options) -> Result<Self, ConfigurationError> {
        let inequality_constraints: Vec<usize> = (0..problem.number_constraints())
            .filter(|&j| !problem.constraint_bounds(j).is_equality())
            .collect();
        let number_inequalities = inequality_constraints.len();
        Ok(Self {
            barrier_parameter: options.get_f64("barrier_initial_parameter")?,
            smallest_barrier_parameter: options.get_f64("optimality_tolerance")? / 10.0,
            decrease_factor: options.get_f64("barrier_decrease_factor")?,
            superlinear_exponent: options.get_f64("barrier_superlinear_exponent")?,
            tau_min: options.get_f64("barrier_tau_min")?,
            tau: options.get_f64("barrier_tau_min")?,
            kappa_epsilon: options.get_f64("barrier_kappa_epsilon")?,
            damping_factor: options.get_f64("barrier_damping_factor")?,
            push_factor: options.get_f64("barrier_push_factor")?,
            progress_norm: options.get_norm("progress_norm")?,
            objective_multiplier: problem.objective_sign(),
            inequality_constraints,
            slacks: DVector::zeros(number_inequalities),
            factorization: LblFactorization::new(),
            definition_changed: false,
            last_linear_term: 0.0,
            last_quadratic_term: 0.0,
        })
    }

    fn interior_range(&self, bounds: Range) -> Range {
        match (bounds.lower.is_finite(), bounds.upper.is_finite()) {
            (true, true) if bounds.is_equality() => bounds,
            (true, true) => {
                let pad = self.push_factor * (bounds.upper - bounds.lower).min(1.0);
                Range::new(bounds.lower + pad, bounds.upper - pad)
            }
            (true, false) => Range::new(
                bounds.lower + self.push_factor * bounds.lower.abs().max(1.0),
                f64::INFINITY,
            ),
            (false, true) => Range::new(
                f64::NEG_INFINITY,
                bounds.upper - self.push_factor * bounds.upper.abs().max(1.0),
            ),
            (false, false) => bounds,
        }
    }

    fn reset_slacks(&mut self, problem: &dyn Problem, iterate: &mut Iterate) -> Result<(), NumericalError> {
        iterate.evaluate_constraints(problem)?;
        for k in 0..self.inequality_constraints.len() {
            let j = self.inequality_constraints[k];
            let interior = self.interior_range(problem.constraint_bounds(j));
            self.slacks[k] = interior.project(iterate.constraints()[j]);
        }
        Ok(())
    }

    // primal-dual diagonal z/(x - l) - z_U/(u - x) of a variable, with the
    // usual safeguard keeping it within a factor of the primal value mu/d^2
    fn variable_diagonal(&self, bounds: Range, x: f64, z_lower: f64, z_upper: f64) -> f64 {
        let mu = self.barrier_parameter;
        let mut diagonal = 0.0;
        if bounds.lower.is_finite() {
            let distance = x - bounds.lower;
            let z = clamp(
                z_lower,
                mu / (KAPPA_SIGMA * distance),
                KAPPA_SIGMA * mu / distance,
            );
            diagonal += z / distance;
        }
        if bounds.upper.is_finite() {
            let distance = bounds.upper - x;
            let z = clamp(
                -z_upper,
                mu / (KAPPA_SIGMA * distance),
                KAPPA_SIGMA * mu / distance,
            );
            diagonal += z / distance;
        }
        diagonal
    }

    // gradient of the barrier terms of a variable (including damping of
    // single-sided bounds)
    fn barrier_gradient_component(&self, bounds: Range, x: f64) -> f64 {
        let mu = self.barrier_parameter;
        let mut gradient = 0.0;
        match (bounds.lower.is_finite(), bounds.upper.is_finite()) {
            (true, true) => {
                gradient += -mu / (x - bounds.lower) + mu / (bounds.upper - x);
            }
            (true, false) => {
                gradient += -mu / (x - bounds.lower) + self.damping_factor * mu;
            }
            (false, true) => {
                gradient += mu / (bounds.upper - x) - self.damping_factor * mu;
            }
            (false, false) => {}
        }
        gradient
    }

    // error of the perturbed KKT conditions, used for the Fiacco-McCormick
    // update of the barrier parameter
    fn barrier_error(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<f64, NumericalError> {
        let n = problem.number_variables();
        let mu = self.barrier_parameter;
        let multipliers = iterate.multipliers.clone();
        let stationarity = iterate.evaluate_lagrangian_gradient(
            problem,
            self.objective_multiplier,
            &multipliers,
        )?;
        let mut error = stationarity.amax();

        iterate.evaluate_constraints(problem)?;
        for (k, &j) in self.inequality_constraints.iter().enumerate() {
            error = error.max((iterate.constraints()[j] - self.slacks[k]).abs());
        }
        for j in 0..problem.number_constraints() {
            let bounds = problem.constraint_bounds(j);
            if bounds.is_equality() {
                error = error.max((iterate.constraints()[j] - bounds.lower).abs());
            }
        }
        for i in 0..n {
            let bounds = problem.variable_bounds(i);
            if bounds.is_equality() {
                continue;
            }
            if bounds.lower.is_finite() {
                let product = multipliers.lower_bounds[i] * (iterate.x[i] - bounds.lower);
                error = error.max((product - mu).abs());
            }
            if bounds.upper.is_finite() {
                let product = -multipliers.upper_bounds[i] * (bounds.upper - iterate.x[i]);
                error = error.max((product - mu).abs());
            }
        }
        Ok(error)
    }
}

impl Subproblem for PrimalDualInteriorPoint {
    fn initialize(
        &mut self,
        problem: &dyn Problem,
        first_iterate: &mut Iterate,
    ) -> Result<(), NumericalError> {
        // push the initial point strictly inside the bounds
        let n = problem.number_variables();
        let mut x = first_iterate.x.clone();
        for i in 0..n {
            let interior = self.interior_range(problem.variable_bounds(i));
            x[i] = interior.project(x[i]);
        }
        first_iterate.set_primals(x);

        // default bound multipliers
        for i in 0..n {
            let bounds = problem.variable_bounds(i);
            if bounds.lower.is_finite() && !bounds.is_equality() {
                first_iterate.multipliers.lower_bounds[i] = 1.0;
            }
            if bounds.upper.is_finite() && !bounds.is_equality() {
                first_iterate.multipliers.upper_bounds[i] = -1.0;
            }
        }
        self.reset_slacks(problem, first_iterate)?;
        self.compute_progress_measures(problem, first_iterate)
    }

    fn build_current_subproblem(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        objective_multiplier: f64,
        _trust_region_radius: f64,
    ) -> Result<(), NumericalError> {
        self.objective_multiplier = objective_multiplier;
        self.reset_slacks(problem, current_iterate)?;

        // Fiacco-McCormick: decrease mu once the perturbed KKT conditions
        // hold to a multiple of it
        let error = self.barrier_error(problem, current_iterate)?;
        if error <= self.kappa_epsilon * self.barrier_parameter
            && self.smallest_barrier_parameter < self.barrier_parameter
        {
            let mu = self.barrier_parameter;
            self.barrier_parameter = self
                .smallest_barrier_parameter
                .max((self.decrease_factor * mu).min(mu.powf(self.superlinear_exponent)));
            self.tau = self.tau_min.max(1.0 - self.barrier_parameter);
            debug!(
                "barrier parameter decreased from {:e} to {:e}",
                mu, self.barrier_parameter
            );
            // the barrier objective changed: globalization strategies must
            // not compare progress across different barrier parameters
            self.definition_changed = true;
        }
        Ok(())
    }

    fn build_objective_model(
        &mut self,
        _problem: &dyn Problem,
        _current_iterate: &mut Iterate,
        objective_multiplier: f64,
    ) -> Result<(), NumericalError> {
        self.objective_multiplier = objective_multiplier;
        Ok(())
    }

    fn build_feasibility_problem(
        &mut self,
        _problem: &dyn Problem,
        _current_iterate: &mut Iterate,
        _partition: &ConstraintPartition,
    ) -> Result<(), NumericalError> {
        warn!("the barrier subproblem does not form partitioned feasibility problems");
        Ok(())
    }

    fn add_elastic_variables(&mut self, _elastics: &ElasticVariables, _objective_coefficient: f64) {
        warn!("the barrier subproblem does not support elastic variables");
    }

    fn remove_elastic_variables(&mut self) {}

    fn set_initial_point(&mut self, _point: &DVector<f64>) {
        // the Newton step needs no warm start
    }

    fn solve(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
    ) -> Result<Direction, NumericalError> {
        let n = problem.number_variables();
        let m = problem.number_constraints();
        let mu = self.barrier_parameter;
        let dimension = n + m;

        current_iterate.evaluate_objective_gradient(problem)?;
        current_iterate.evaluate_constraints(problem)?;
        current_iterate.evaluate_constraint_jacobian(problem)?;
        let hessian = problem.evaluate_lagrangian_hessian(
            &current_iterate.x.rows(0, n).into_owned(),
            self.objective_multiplier,
            &current_iterate.multipliers.constraints,
        );

        // diagonal of the slack barrier Hessian, one entry per inequality
        let mut slack_diagonals = DVector::zeros(self.inequality_constraints.len());
        let mut slack_residuals = DVector::zeros(self.inequality_constraints.len());
        for (k, &j) in self.inequality_constraints.iter().enumerate() {
            let bounds = problem.constraint_bounds(j);
            let s = self.slacks[k];
            let mut diagonal = 0.0;
            let mut residual = current_iterate.multipliers.constraints[j];
            if bounds.lower.is_finite() {
                diagonal += mu / ((s - bounds.lower) * (s - bounds.lower));
                residual -= mu / (s - bounds.lower);
            }
            if bounds.upper.is_finite() {
                diagonal += mu / ((bounds.upper - s) * (bounds.upper - s));
                residual += mu / (bounds.upper - s);
            }
            slack_diagonals[k] = diagonal;
            slack_residuals[k] = residual;
        }

        // dual residual of the barrier problem (without the bound duals,
        // which are eliminated into the diagonal)
        let mut dual_residual = current_iterate.objective_gradient() * self.objective_multiplier;
        for (j, row) in current_iterate.constraint_jacobian().outer_iterator().enumerate() {
            let multiplier = current_iterate.multipliers.constraints[j];
            if multiplier != 0.0 {
                for (i, &derivative) in row.iter() {
                    dual_residual[i] -= multiplier * derivative;
                }
            }
        }
        let mut barrier_gradient = dual_residual.clone();
        for i in 0..n {
            let bounds = problem.variable_bounds(i);
            let component = self.barrier_gradient_component(bounds, current_iterate.x[i]);
            dual_residual[i] += component;
            barrier_gradient[i] += component;
        }

        // assemble the augmented system
        //   [ W + Σx   Jᵀ ] [dx     ]   [ -dual residual ]
        //   [ J       -D  ] [-dλ    ] = [  primal rhs    ]
        // and correct its inertia to (n, m, 0)
        let mut primal_rhs = DVector::zeros(m);
        for j in 0..m {
            let bounds = problem.constraint_bounds(j);
            if bounds.is_equality() {
                primal_rhs[j] = -(current_iterate.constraints()[j] - bounds.lower);
            }
        }
        for (k, &j) in self.inequality_constraints.iter().enumerate() {
            primal_rhs[j] = -(current_iterate.constraints()[j] - self.slacks[k])
                - slack_residuals[k] / slack_diagonals[k];
        }

        let mut variable_diagonals = DVector::zeros(n);
        for i in 0..n {
            let bounds = problem.variable_bounds(i);
            if bounds.is_equality() {
                // fixed variable: pin it with a large diagonal weight
                variable_diagonals[i] = 1.0 / f64::EPSILON;
            } else {
                variable_diagonals[i] = self.variable_diagonal(
                    bounds,
                    current_iterate.x[i],
                    current_iterate.multipliers.lower_bounds[i],
                    current_iterate.multipliers.upper_bounds[i],
                );
            }
        }

        let mut regularization = 0.0;
        let mut dual_regularization = 0.0;
        let solution = loop {
            let mut kkt = TriMat::new((dimension, dimension));
            for (&value, (i, j)) in hessian.triplet_iter() {
                let (row, column) = if i >= j { (i, j) } else { (j, i) };
                kkt.add_triplet(row, column, value);
            }
            for i in 0..n {
                let diagonal = variable_diagonals[i] + regularization;
                if diagonal != 0.0 {
                    kkt.add_triplet(i, i, diagonal);
                }
            }
            for (j, row) in current_iterate.constraint_jacobian().outer_iterator().enumerate() {
                for (i, &derivative) in row.iter() {
                    kkt.add_triplet(n + j, i, derivative);
                }
            }
            for (k, &j) in self.inequality_constraints.iter().enumerate() {
                kkt.add_triplet(n + j, n + j, -1.0 / slack_diagonals[k]);
            }
            if dual_regularization != 0.0 {
                for j in 0..m {
                    kkt.add_triplet(n + j, n + j, -dual_regularization);
                }
            }
            self.factorization.factorize(&kkt)?;
            if self.factorization.inertia() == (n, m, 0) {
                if regularization != 0.0 {
                    debug!("barrier system regularized with {:e}", regularization);
                }
                let mut rhs = DVector::zeros(dimension);
                for i in 0..n {
                    rhs[i] = -dual_residual[i];
                }
                for j in 0..m {
                    rhs[n + j] = primal_rhs[j];
                }
                break self.factorization.solve(&rhs)?;
            }
            if self.factorization.matrix_is_singular() && dual_regularization == 0.0 {
                dual_regularization = 1e-8;
            }
            regularization = if regularization == 0.0 {
                1e-4
            } else {
                8.0 * regularization
            };
            if regularization > 1e40 {
                return Err(NumericalError::Factorization("barrier KKT"));
            }
        };

        let dx = solution.rows(0, n).into_owned();
        let mut constraint_displacements = DVector::zeros(m);
        for j in 0..m {
            constraint_displacements[j] = -solution[n + j];
        }

        // fraction-to-the-boundary rule for the primal variables and slacks
        let mut alpha_primal: f64 = 1.0;
        for i in 0..n {
            let bounds = problem.variable_bounds(i);
            if bounds.is_equality() {
                continue;
            }
            if bounds.lower.is_finite() && dx[i] < 0.0 {
                alpha_primal =
                    alpha_primal.min(self.tau * (current_iterate.x[i] - bounds.lower) / -dx[i]);
            }
            if bounds.upper.is_finite() && dx[i] > 0.0 {
                alpha_primal =
                    alpha_primal.min(self.tau * (bounds.upper - current_iterate.x[i]) / dx[i]);
            }
        }
        for (k, &j) in self.inequality_constraints.iter().enumerate() {
            let bounds = problem.constraint_bounds(j);
            let ds = (-slack_residuals[k] - constraint_displacements[j]) / slack_diagonals[k];
            if bounds.lower.is_finite() && ds < 0.0 {
                alpha_primal = alpha_primal.min(self.tau * (self.slacks[k] - bounds.lower) / -ds);
            }
            if bounds.upper.is_finite() && ds > 0.0 {
                alpha_primal = alpha_primal.min(self.tau * (bounds.upper - self.slacks[k]) / ds);
            }
        }

        // bound dual displacements, scaled by their own boundary rule so the
        // mechanism can apply a common step length
        let mut lower_displacements = DVector::zeros(n);
        let mut upper_displacements = DVector::zeros(n);
        let mut alpha_dual: f64 = 1.0;
        for i in 0..n {
            let bounds = problem.variable_bounds(i);
            if bounds.is_equality() {
                continue;
            }
            if bounds.lower.is_finite() {
                let distance = current_iterate.x[i] - bounds.lower;
                let z = current_iterate.multipliers.lower_bounds[i];
                let dz = mu / distance - z - z / distance * dx[i];
                lower_displacements[i] = dz;
                if dz < 0.0 {
                    alpha_dual = alpha_dual.min(self.tau * z / -dz);
                }
            }
            if bounds.upper.is_finite() {
                let distance = bounds.upper - current_iterate.x[i];
                let z = current_iterate.multipliers.upper_bounds[i];
                let dz = -mu / distance - z + z / distance * dx[i];
                upper_displacements[i] = dz;
                if dz > 0.0 {
                    alpha_dual = alpha_dual.min(self.tau * -z / dz);
                }
            }
        }
        lower_displacements *= alpha_dual;
        upper_displacements *= alpha_dual;

        // model terms for the predicted reduction
        self.last_linear_term = barrier_gradient.dot(&dx);
        let mut quadratic = 0.0;
        for (&value, (i, j)) in hessian.triplet_iter() {
            let term = value * dx[i] * dx[j];
            quadratic += if i == j { 0.5 * term } else { term };
        }
        for i in 0..n {
            quadratic += 0.5 * variable_diagonals[i] * dx[i] * dx[i];
        }
        self.last_quadratic_term = quadratic;

        let norm = if n > 0 { dx.amax() } else { 0.0 };
        let direction = Direction {
            objective: self.last_linear_term + self.last_quadratic_term,
            objective_multiplier: self.objective_multiplier,
            norm,
            status: SubproblemStatus::Optimal,
            active_set: Default::default(),
            constraint_partition: None,
            max_primal_step_length: alpha_primal,
            primals: dx,
            multipliers: Multipliers {
                constraints: constraint_displacements,
                lower_bounds: lower_displacements,
                upper_bounds: upper_displacements,
            },
        };
        debug!("barrier {} (max step {:.4e})", direction, alpha_primal);
        Ok(direction)
    }

    fn generate_predicted_reduction_model(&self, _direction: &Direction) -> PredictedReductionModel {
        let linear_term = self.last_linear_term;
        let quadratic_term = self.last_quadratic_term;
        PredictedReductionModel::new(
            -(linear_term + quadratic_term),
            Box::new(move |step_length| {
                -step_length * (linear_term + step_length * quadratic_term)
            }),
        )
    }

    fn compute_progress_measures(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<(), NumericalError> {
        iterate.evaluate_constraints(problem)?;
        let feasibility = iterate.constraint_violation(problem, self.progress_norm);

        // optimality measure: the barrier function
        let mu = self.barrier_parameter;
        let mut objective = self.objective_multiplier * iterate.evaluate_objective(problem)?;
        let n = problem.number_variables();
        for i in 0..n {
            let bounds = problem.variable_bounds(i);
            if bounds.is_equality() {
                continue;
            }
            if bounds.lower.is_finite() {
                let distance = iterate.x[i] - bounds.lower;
                if distance <= 0.0 {
                    objective = f64::INFINITY;
                    break;
                }
                objective -= mu * distance.ln();
                if !bounds.upper.is_finite() {
                    objective += self.damping_factor * mu * distance;
                }
            }
            if bounds.upper.is_finite() {
                let distance = bounds.upper - iterate.x[i];
                if distance <= 0.0 {
                    objective = f64::INFINITY;
                    break;
                }
                objective -= mu * distance.ln();
                if !bounds.lower.is_finite() {
                    objective += self.damping_factor * mu * distance;
                }
            }
        }
        if objective.is_finite() {
            for &j in &self.inequality_constraints {
                let bounds = problem.constraint_bounds(j);
                let s = self.interior_range(bounds).project(iterate.constraints()[j]);
                if bounds.lower.is_finite() {
                    objective -= mu * (s - bounds.lower).ln();
                }
                if bounds.upper.is_finite() {
                    objective -= mu * (bounds.upper - s).ln();
                }
            }
        }
        iterate.progress = ProgressMeasures {
            feasibility,
            objective,
        };
        Ok(())
    }

    fn take_definition_changed(&mut self) -> bool {
        let changed = self.definition_changed;
        self.definition_changed = false;
        changed
    }

    fn progress_norm(&self) -> Norm {
        self.progress_norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use crate::testing::Hs071;

    #[test]
    fn initialization_pushes_the_point_inside_the_bounds() {
        let problem = Hs071;
        let options = Options::default();
        let mut subproblem = PrimalDualInteriorPoint::new(&problem, &options).unwrap();
        // start on the boundary of the box [1, 5]^4
        let mut iterate = Iterate::new(DVector::from_vec(vec![1.0, 5.0, 5.0, 1.0]), 2);
        subproblem.initialize(&problem, &mut iterate).unwrap();
        for i in 0..4 {
            assert!(iterate.x[i] > 1.0 && iterate.x[i] < 5.0);
        }
    }

    #[test]
    fn newton_step_respects_the_boundary_rule() {
        let problem = Hs071;
        let options = Options::default();
        let mut subproblem = PrimalDualInteriorPoint::new(&problem, &options).unwrap();
        let mut iterate = Iterate::new(DVector::from_vec(vec![1.0, 5.0, 5.0, 1.0]), 2);
        subproblem.initialize(&problem, &mut iterate).unwrap();
        subproblem
            .build_current_subproblem(&problem, &mut iterate, 1.0, f64::INFINITY)
            .unwrap();
        let direction = subproblem.solve(&problem, &mut iterate).unwrap();

        let alpha = direction.max_primal_step_length;
        assert!(alpha > 0.0 && alpha <= 1.0);
        for i in 0..4 {
            let stepped = iterate.x[i] + alpha * direction.primals[i];
            assert!(stepped > 1.0 - 1e-12 && stepped < 5.0 + 1e-12);
        }
    }
}

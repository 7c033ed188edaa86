//! Single-phase ℓ₁ penalty relaxation with Byrd's steering rule.
//!
//! The constraints are relaxed with elastic variables,
//! `c_j(x) + p_j - n_j ∈ [c_L, c_U]`, and the objective becomes
//! `ρ f(x) + Σ (p_j + n_j)`. The penalty parameter `ρ` is driven by the
//! steering rule: the achievable linearized infeasibility decrease is probed
//! with a zero-penalty solve and `ρ` is reduced until the step realizes a
//! fraction of it.
//!
//! # References
//!
//! \[1\] [An algorithm for nonlinear optimization using linear programming
//! and equality constrained subproblems](https://doi.org/10.1007/s10107-003-0485-4)
//!
//! \[2\] [Steering exact penalty methods for nonlinear
//! programming](https://doi.org/10.1080/10556780802023698)

use log::debug;

use crate::core::direction::Direction;
use crate::core::error::NumericalError;
use crate::core::iterate::{Iterate, Multipliers};
use crate::core::optimality::{compute_complementarity_error, compute_residuals};
use crate::core::problem::{Norm, Problem};
use crate::options::{ConfigurationError, Options};
use crate::relaxation::ConstraintRelaxationStrategy;
use crate::strategy::{create_strategy, GlobalizationStrategy};
use crate::subproblem::{create_subproblem, ElasticVariables, PredictedReductionModel, Subproblem};

// linearized residuals below this value count as zero; the elastic values
// returned by an interior-point subproblem solver are never exactly zero
const RESIDUAL_TOLERANCE: f64 = 1e-8;

/// ℓ₁ relaxation with an adaptive penalty parameter.
pub struct L1Relaxation {
    subproblem: Box<dyn Subproblem>,
    globalization_strategy: Box<dyn GlobalizationStrategy>,
    penalty_parameter: f64,
    decrease_factor: f64,
    epsilon1: f64,
    epsilon2: f64,
    penalty_threshold: f64,
    elastic_variables: ElasticVariables,
    elastic_objective_coefficient: f64,
    small_step_threshold: f64,
    residual_norm: Norm,
}

impl L1Relaxation {
    /// Creates the strategy from the options map.
    pub fn new(problem: &dyn Problem, options: &Options) -> Result<Self, ConfigurationError> {
        Ok(Self {
            subproblem: create_subproblem(problem, options)?,
            globalization_strategy: create_strategy(options)?,
            penalty_parameter: options.get_f64("l1_relaxation_initial_parameter")?,
            decrease_factor: options.get_f64("l1_relaxation_decrease_factor")?,
            epsilon1: options.get_f64("l1_relaxation_epsilon1")?,
            epsilon2: options.get_f64("l1_relaxation_epsilon2")?,
            penalty_threshold: options.get_f64("l1_relaxation_penalty_threshold")?,
            elastic_variables: ElasticVariables::generate(problem, problem.number_variables()),
            elastic_objective_coefficient: 1.0,
            small_step_threshold: options.get_f64("small_step_threshold")?,
            residual_norm: options.get_norm("residual_norm")?,
        })
    }

    /// Current value of the penalty parameter.
    pub fn penalty_parameter(&self) -> f64 {
        self.penalty_parameter
    }

    // multipliers of the violated constraints, from the KKT conditions of
    // the l1 problem
    fn set_multipliers(problem: &dyn Problem, current_iterate: &mut Iterate) {
        for j in 0..problem.number_constraints() {
            let bounds = problem.constraint_bounds(j);
            let value = current_iterate.constraints()[j];
            if value < bounds.lower {
                current_iterate.multipliers.constraints[j] = 1.0;
            } else if bounds.upper < value {
                current_iterate.multipliers.constraints[j] = -1.0;
            }
            // otherwise, leave the multiplier as it is
        }
    }

    // l1 residual of the linearized constraints: sum of the elastics
    fn compute_linearized_constraint_residual(&self, direction: &Direction) -> f64 {
        let mut residual = 0.0;
        for &(_, variable) in self
            .elastic_variables
            .positive
            .iter()
            .chain(self.elastic_variables.negative.iter())
        {
            if variable < direction.primals.len() {
                let value = direction.primals[variable];
                debug_assert!(value >= -RESIDUAL_TOLERANCE, "elastics must be nonnegative");
                residual += value;
            }
        }
        residual
    }

    // measure combining the KKT error of the l1 problem and the
    // complementarity error
    fn compute_error(
        &self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        multiplier_displacements: &Multipliers,
        penalty_parameter: f64,
    ) -> Result<f64, NumericalError> {
        let m = problem.number_constraints();
        let n = problem.number_variables();
        let mut multipliers = Multipliers::new(n, m);
        for j in 0..m {
            multipliers.constraints[j] = iterate.multipliers.constraints[j]
                + multiplier_displacements.constraints[j];
        }
        for i in 0..n {
            multipliers.lower_bounds[i] = multiplier_displacements.lower_bounds[i];
            multipliers.upper_bounds[i] = multiplier_displacements.upper_bounds[i];
        }

        iterate.evaluate_constraints(problem)?;
        let mut error = compute_complementarity_error(
            problem,
            &iterate.x,
            iterate.constraints(),
            &multipliers,
            0.0,
        );
        let gradient =
            iterate.evaluate_lagrangian_gradient(problem, penalty_parameter, &multipliers)?;
        error += Norm::L1.of(gradient.iter().copied());
        Ok(error)
    }

    fn solve_subproblem(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
    ) -> Result<Direction, NumericalError> {
        let mut direction = self.subproblem.solve(problem, current_iterate)?;
        if let Some(partition) = &direction.constraint_partition {
            debug_assert!(
                partition.infeasible.is_empty(),
                "the relaxed subproblem must be feasible"
            );
        }
        direction.objective_multiplier = self.penalty_parameter;
        debug!("l1 relaxation: {}", direction);
        self.subproblem.remove_elastic_variables();
        Ok(direction)
    }

    fn resolve_subproblem(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        objective_multiplier: f64,
    ) -> Result<Direction, NumericalError> {
        self.subproblem
            .build_objective_model(problem, current_iterate, objective_multiplier)?;
        self.subproblem
            .add_elastic_variables(&self.elastic_variables, self.elastic_objective_coefficient);
        let mut direction = self.subproblem.solve(problem, current_iterate)?;
        direction.objective_multiplier = objective_multiplier;
        debug!("l1 relaxation (resolve): {}", direction);
        self.subproblem.remove_elastic_variables();
        Ok(direction)
    }

    fn solve_with_steering_rule(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
    ) -> Result<Direction, NumericalError> {
        // stage a: compute the step at the current penalty parameter
        let mut direction = self.solve_subproblem(problem, current_iterate)?;

        // if the penalty parameter is already 0, nothing to steer
        if self.penalty_parameter <= 0.0 {
            return Ok(direction);
        }
        let mut linearized_residual = self.compute_linearized_constraint_residual(&direction);
        debug!("linearized residual m(d): {:.4e}", linearized_residual);

        // the problem had to be relaxed
        if linearized_residual > RESIDUAL_TOLERANCE {
            let current_penalty_parameter = self.penalty_parameter;
            current_iterate.evaluate_constraints(problem)?;
            let current_residual =
                problem.constraint_violation(current_iterate.constraints(), Norm::L1);

            // stage c: lowest possible linearized violation (penalty = 0)
            let direction_lowest_violation =
                self.resolve_subproblem(problem, current_iterate, 0.0)?;
            let residual_lowest_violation =
                self.compute_linearized_constraint_residual(&direction_lowest_violation);
            debug!(
                "ideal linearized residual m(d): {:.4e}",
                residual_lowest_violation
            );

            // nothing to gain if the nonlinear residual is already ideal
            let nothing_to_gain = current_residual > 0.0
                && (residual_lowest_violation - current_residual).abs() <= RESIDUAL_TOLERANCE;
            if !nothing_to_gain {
                let error_lowest_violation = self.compute_error(
                    problem,
                    current_iterate,
                    &direction_lowest_violation.multipliers,
                    0.0,
                )?;
                debug!("ideal error: {:.4e}", error_lowest_violation);
                if error_lowest_violation <= RESIDUAL_TOLERANCE {
                    // stage f: the ideal subproblem solves the relaxation
                    self.penalty_parameter = 0.0;
                    direction = direction_lowest_violation;
                } else {
                    // clamp the penalty parameter with the ideal error
                    let updated_penalty_parameter = self.penalty_parameter;
                    let term = error_lowest_violation / current_residual.max(1.0);
                    self.penalty_parameter = self.penalty_parameter.min(term * term);
                    if self.penalty_parameter < updated_penalty_parameter {
                        if self.penalty_parameter <= 0.0 {
                            direction = direction_lowest_violation.clone();
                        } else {
                            direction = self.resolve_subproblem(
                                problem,
                                current_iterate,
                                self.penalty_parameter,
                            )?;
                            linearized_residual =
                                self.compute_linearized_constraint_residual(&direction);
                        }
                    }

                    // stages d and e: decrease the penalty parameter until
                    // both steering conditions hold
                    let mut condition1 = false;
                    let mut condition2 = false;
                    while !condition2 {
                        if !condition1 {
                            let ideal_residual_zero =
                                residual_lowest_violation <= RESIDUAL_TOLERANCE;
                            if (ideal_residual_zero
                                && linearized_residual <= RESIDUAL_TOLERANCE)
                                || (!ideal_residual_zero
                                    && current_residual - linearized_residual
                                        >= self.epsilon1
                                            * (current_residual - residual_lowest_violation))
                            {
                                condition1 = true;
                                debug!("steering condition 1 holds");
                            }
                        }
                        if condition1
                            && current_residual - direction.objective
                                >= self.epsilon2
                                    * (current_residual - direction_lowest_violation.objective)
                        {
                            condition2 = true;
                            debug!("steering condition 2 holds");
                        }
                        if !condition2 {
                            self.penalty_parameter /= self.decrease_factor;
                            if self.penalty_parameter < self.penalty_threshold {
                                self.penalty_parameter = 0.0;
                                direction = direction_lowest_violation.clone();
                                condition2 = true;
                            } else {
                                debug!(
                                    "resolving with penalty parameter {:.4e}",
                                    self.penalty_parameter
                                );
                                direction = self.resolve_subproblem(
                                    problem,
                                    current_iterate,
                                    self.penalty_parameter,
                                )?;
                                linearized_residual =
                                    self.compute_linearized_constraint_residual(&direction);
                            }
                        }
                    }
                }
            }

            if self.penalty_parameter < current_penalty_parameter {
                debug!(
                    "penalty parameter updated to {:.4e}, resetting the strategy",
                    self.penalty_parameter
                );
                // the merit surface changed
                self.globalization_strategy.reset();
            }
        }
        Ok(direction)
    }

    // predicted reduction of the l1 relaxation: the subproblem model plus
    // the linearized infeasibility decrease
    fn compute_predicted_reduction(
        &self,
        problem: &dyn Problem,
        current_iterate: &Iterate,
        direction: &Direction,
        predicted_reduction_model: &PredictedReductionModel,
        step_length: f64,
    ) -> f64 {
        if step_length == 1.0 {
            current_iterate.progress.feasibility + predicted_reduction_model.evaluate(step_length)
        } else {
            // linearized constraint violation at the partial step
            let jacobian = current_iterate.constraint_jacobian();
            let mut linearized_violation = 0.0;
            for (j, row) in jacobian.outer_iterator().enumerate() {
                let mut value = current_iterate.constraints()[j];
                for (i, &derivative) in row.iter() {
                    if i < direction.primals.len() {
                        value += step_length * derivative * direction.primals[i];
                    }
                }
                linearized_violation += problem.constraint_bounds(j).violation(value);
            }
            current_iterate.progress.feasibility - linearized_violation
                + predicted_reduction_model.evaluate(step_length)
        }
    }
}

impl ConstraintRelaxationStrategy for L1Relaxation {
    fn initialize(
        &mut self,
        problem: &dyn Problem,
        first_iterate: &mut Iterate,
    ) -> Result<(), NumericalError> {
        self.subproblem.initialize(problem, first_iterate)?;
        compute_residuals(
            problem,
            first_iterate,
            self.penalty_parameter,
            self.residual_norm,
        )?;
        self.globalization_strategy.initialize(first_iterate);
        Ok(())
    }

    fn create_current_subproblem(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        trust_region_radius: f64,
    ) -> Result<(), NumericalError> {
        debug!("penalty parameter: {:.4e}", self.penalty_parameter);
        self.subproblem.build_current_subproblem(
            problem,
            current_iterate,
            self.penalty_parameter,
            trust_region_radius,
        )?;
        self.subproblem
            .add_elastic_variables(&self.elastic_variables, self.elastic_objective_coefficient);
        Self::set_multipliers(problem, current_iterate);
        Ok(())
    }

    fn compute_feasible_direction(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
    ) -> Result<Direction, NumericalError> {
        let mut direction = self.solve_with_steering_rule(problem, current_iterate)?;
        // remove the temporary elastic variables from the direction
        direction.set_number_variables(problem.number_variables());
        Ok(direction)
    }

    fn compute_second_order_correction(
        &mut self,
        problem: &dyn Problem,
        trial_iterate: &mut Iterate,
        direction: &Direction,
    ) -> Result<Option<Direction>, NumericalError> {
        let correction =
            self.subproblem
                .compute_second_order_correction(problem, trial_iterate, direction)?;
        Ok(correction.map(|mut correction| {
            correction.set_number_variables(problem.number_variables());
            correction.objective_multiplier = self.penalty_parameter;
            correction
        }))
    }

    fn generate_predicted_reduction_model(&self, direction: &Direction) -> PredictedReductionModel {
        self.subproblem.generate_predicted_reduction_model(direction)
    }

    fn is_acceptable(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        trial_iterate: &mut Iterate,
        direction: &Direction,
        predicted_reduction_model: &PredictedReductionModel,
        step_length: f64,
    ) -> Result<bool, NumericalError> {
        if self.subproblem.take_definition_changed() {
            self.globalization_strategy.reset();
            self.subproblem
                .compute_progress_measures(problem, current_iterate)?;
        }

        let accept = if direction.norm <= self.small_step_threshold {
            self.subproblem
                .compute_progress_measures(problem, trial_iterate)?;
            true
        } else {
            self.subproblem
                .compute_progress_measures(problem, trial_iterate)?;
            let predicted_reduction = self.compute_predicted_reduction(
                problem,
                current_iterate,
                direction,
                predicted_reduction_model,
                step_length,
            );
            self.globalization_strategy.check_acceptance(
                &current_iterate.progress,
                &trial_iterate.progress,
                self.penalty_parameter,
                predicted_reduction,
            )
        };
        if accept {
            compute_residuals(
                problem,
                trial_iterate,
                direction.objective_multiplier,
                self.residual_norm,
            )?;
        }
        Ok(accept)
    }

    fn uses_filter_strategy(&self) -> bool {
        self.globalization_strategy.is_filter()
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;

    use super::*;
    use crate::options::Options;
    use crate::testing::InfeasibleLp;

    fn relaxation(options: &Options) -> L1Relaxation {
        L1Relaxation::new(&InfeasibleLp, options).unwrap()
    }

    #[test]
    fn penalty_parameter_is_monotone_and_nonnegative() {
        let problem = InfeasibleLp;
        let mut options = Options::default();
        options.set("mechanism", "TR").unwrap();
        let mut l1 = relaxation(&options);

        let mut iterate = Iterate::new(DVector::from_vec(vec![0.5]), 2);
        l1.initialize(&problem, &mut iterate).unwrap();

        let mut previous = l1.penalty_parameter();
        for _ in 0..3 {
            l1.create_current_subproblem(&problem, &mut iterate, 10.0)
                .unwrap();
            let _ = l1
                .compute_feasible_direction(&problem, &mut iterate)
                .unwrap();
            let penalty = l1.penalty_parameter();
            assert!(penalty >= 0.0);
            assert!(penalty <= previous);
            previous = penalty;
        }
    }

    #[test]
    fn violated_constraints_receive_unit_multipliers() {
        let problem = InfeasibleLp;
        let mut options = Options::default();
        options.set("mechanism", "TR").unwrap();
        let mut l1 = relaxation(&options);

        // x = 0.5 violates x >= 1 from below and x <= 0 from above
        let mut iterate = Iterate::new(DVector::from_vec(vec![0.5]), 2);
        l1.initialize(&problem, &mut iterate).unwrap();
        l1.create_current_subproblem(&problem, &mut iterate, 10.0)
            .unwrap();
        assert_eq!(iterate.multipliers.constraints[0], 1.0);
        assert_eq!(iterate.multipliers.constraints[1], -1.0);
    }
}

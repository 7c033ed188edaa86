//! Two-phase feasibility restoration.
//!
//! The optimality subproblem is solved as long as its linearization is
//! consistent. When it turns infeasible, a feasibility subproblem (either
//! restricted to the violated constraints of the reported partition, or the
//! fully elastic-relaxed problem) takes over until the linearization is
//! consistent again. Each phase owns its own globalization strategy, since
//! their accepted-point histories must not mix.

use log::debug;
use nalgebra::DVector;

use crate::core::direction::{ConstraintPartition, Direction, SubproblemStatus};
use crate::core::error::NumericalError;
use crate::core::iterate::Iterate;
use crate::core::optimality::compute_residuals;
use crate::core::problem::{Norm, Problem};
use crate::options::{ConfigurationError, Options};
use crate::relaxation::ConstraintRelaxationStrategy;
use crate::strategy::{create_strategy, GlobalizationStrategy};
use crate::subproblem::{create_subproblem, ElasticVariables, PredictedReductionModel, Subproblem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Optimality,
    Restoration,
}

/// Two-phase constraint relaxation: optimality and feasibility restoration.
pub struct FeasibilityRestoration {
    subproblem: Box<dyn Subproblem>,
    phase_1_strategy: Box<dyn GlobalizationStrategy>,
    phase_2_strategy: Box<dyn GlobalizationStrategy>,
    current_phase: Phase,
    elastic_variables: ElasticVariables,
    elastic_objective_coefficient: f64,
    use_proximal_term: bool,
    number_problem_variables: usize,
    small_step_threshold: f64,
    residual_norm: Norm,
}

impl FeasibilityRestoration {
    /// Creates the strategy from the options map.
    pub fn new(problem: &dyn Problem, options: &Options) -> Result<Self, ConfigurationError> {
        let subproblem = create_subproblem(problem, options)?;
        let use_proximal_term = subproblem.proximal_coefficient() > 0.0;
        Ok(Self {
            subproblem,
            // one globalization strategy for each phase
            phase_1_strategy: create_strategy(options)?,
            phase_2_strategy: create_strategy(options)?,
            current_phase: Phase::Optimality,
            elastic_variables: ElasticVariables::generate(problem, problem.number_variables()),
            elastic_objective_coefficient: 1.0,
            use_proximal_term,
            number_problem_variables: problem.number_variables(),
            small_step_threshold: options.get_f64("small_step_threshold")?,
            residual_norm: options.get_norm("residual_norm")?,
        })
    }

    fn proximal_weights(&self, current_iterate: &Iterate) -> DVector<f64> {
        DVector::from_iterator(
            self.number_problem_variables,
            (0..self.number_problem_variables).map(|i| {
                let reference = current_iterate.x[i].abs();
                (1.0_f64).min(1.0 / reference.max(f64::MIN_POSITIVE)).powi(2)
            }),
        )
    }

    // {1, -1} from the KKT conditions of the feasibility problem
    fn set_restoration_multipliers(iterate: &mut Iterate, partition: &ConstraintPartition) {
        for &j in &partition.lower_bound_infeasible {
            iterate.multipliers.constraints[j] = 1.0;
        }
        for &j in &partition.upper_bound_infeasible {
            iterate.multipliers.constraints[j] = -1.0;
        }
        // otherwise, leave the multiplier as it is
    }

    fn create_current_feasibility_problem(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        phase_2_primal_direction: Option<&DVector<f64>>,
        partition: Option<&ConstraintPartition>,
    ) -> Result<(), NumericalError> {
        match partition {
            Some(partition) => {
                debug_assert!(
                    !partition.infeasible.is_empty(),
                    "the subproblem is infeasible but no constraint is infeasible"
                );
                Self::set_restoration_multipliers(current_iterate, partition);
                self.subproblem
                    .build_objective_model(problem, current_iterate, 0.0)?;
                if self.use_proximal_term {
                    let weights = self.proximal_weights(current_iterate);
                    self.subproblem.set_proximal_weights(Some(weights));
                }
                self.subproblem
                    .build_feasibility_problem(problem, current_iterate, partition)?;
            }
            None => {
                // no partition: relax all constraints with elastic variables
                // and zero the objective
                current_iterate.multipliers.constraints.fill(0.0);
                self.subproblem
                    .build_objective_model(problem, current_iterate, 0.0)?;
                if self.use_proximal_term {
                    let weights = self.proximal_weights(current_iterate);
                    self.subproblem.set_proximal_weights(Some(weights));
                }
                self.subproblem.add_elastic_variables(
                    &self.elastic_variables,
                    self.elastic_objective_coefficient,
                );
                // the iterate carries the elastic values of the relaxed
                // constraints
                current_iterate.evaluate_constraints(problem)?;
                let extended =
                    self.number_problem_variables + self.elastic_variables.number_elastics();
                current_iterate.set_number_variables(extended);
                for &(j, variable) in &self.elastic_variables.positive {
                    let bounds = problem.constraint_bounds(j);
                    let violation = (bounds.lower - current_iterate.constraints()[j]).max(0.0);
                    current_iterate.x[variable] = violation;
                }
                for &(j, variable) in &self.elastic_variables.negative {
                    let bounds = problem.constraint_bounds(j);
                    let violation = (current_iterate.constraints()[j] - bounds.upper).max(0.0);
                    current_iterate.x[variable] = violation;
                }
            }
        }
        // start from the phase-2 solution
        if let Some(phase_2_direction) = phase_2_primal_direction {
            self.subproblem.set_initial_point(phase_2_direction);
        }
        Ok(())
    }

    fn solve_feasibility_problem(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        phase_2_primal_direction: Option<&DVector<f64>>,
        partition: Option<&ConstraintPartition>,
    ) -> Result<Direction, NumericalError> {
        self.create_current_feasibility_problem(
            problem,
            current_iterate,
            phase_2_primal_direction,
            partition,
        )?;
        debug!("solving the feasibility subproblem");
        let mut direction = self.subproblem.solve(problem, current_iterate)?;
        direction.objective_multiplier = 0.0;
        if direction.status != SubproblemStatus::Optimal {
            return Err(NumericalError::SubproblemFailure);
        }
        match partition {
            Some(partition) => {
                // transfer the phase-2 partition to the phase-1 direction
                direction.constraint_partition = Some(partition.clone());
            }
            None => {
                self.subproblem.remove_elastic_variables();
            }
        }
        Ok(direction)
    }

    fn compute_infeasibility_measures(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        partition: Option<&ConstraintPartition>,
    ) -> Result<(), NumericalError> {
        match partition {
            Some(partition) => {
                // feasibility: all constraints; optimality: the infeasible ones
                iterate.evaluate_constraints(problem)?;
                let norm = self.subproblem.progress_norm();
                let feasibility = problem.constraint_violation(iterate.constraints(), norm);
                let objective = problem.constraint_subset_violation(
                    iterate.constraints(),
                    &partition.infeasible,
                    norm,
                );
                iterate.progress.feasibility = feasibility;
                iterate.progress.objective = objective;
            }
            None => {
                self.subproblem.compute_progress_measures(problem, iterate)?;
                // the elastic components contribute to the optimality measure
                for &(_, variable) in self
                    .elastic_variables
                    .positive
                    .iter()
                    .chain(self.elastic_variables.negative.iter())
                {
                    if variable < iterate.x.len() {
                        iterate.progress.objective +=
                            self.elastic_objective_coefficient * iterate.x[variable];
                    }
                }
            }
        }
        Ok(())
    }

    fn add_proximal_term_to_progress_measures(
        &self,
        current_iterate: &Iterate,
        trial_iterate: &mut Iterate,
    ) {
        let coefficient = self.subproblem.proximal_coefficient();
        for i in 0..self.number_problem_variables {
            let reference = (1.0_f64).min(1.0 / current_iterate.x[i].abs().max(f64::MIN_POSITIVE));
            let distance = reference * (trial_iterate.x[i] - current_iterate.x[i]);
            trial_iterate.progress.objective += coefficient * distance * distance;
        }
    }

    // possibly switch between restoration and optimality, and evaluate the
    // progress measures of the trial iterate in the active phase
    fn switch_phase(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        trial_iterate: &mut Iterate,
        direction: &Direction,
    ) -> Result<Phase, NumericalError> {
        if self.current_phase == Phase::Restoration && direction.objective_multiplier > 0.0 {
            // the linearization became consistent again
            self.current_phase = Phase::Optimality;
            debug!("switching from restoration to optimality phase");
            current_iterate.set_number_variables(self.number_problem_variables);
            current_iterate.evaluate_constraints(problem)?;
            self.subproblem
                .compute_progress_measures(problem, current_iterate)?;
            self.subproblem.set_proximal_weights(None);
        } else if self.current_phase == Phase::Optimality
            && direction.objective_multiplier == 0.0
        {
            self.current_phase = Phase::Restoration;
            debug!("switching from optimality to restoration phase");
            self.phase_2_strategy.notify(current_iterate);
            self.phase_1_strategy.reset();
            self.compute_infeasibility_measures(
                problem,
                current_iterate,
                direction.constraint_partition.as_ref(),
            )?;
            self.phase_1_strategy.notify(current_iterate);
        }

        match self.current_phase {
            Phase::Optimality => {
                trial_iterate.set_number_variables(self.number_problem_variables);
                trial_iterate.evaluate_constraints(problem)?;
                self.subproblem
                    .compute_progress_measures(problem, trial_iterate)?;
            }
            Phase::Restoration => {
                self.compute_infeasibility_measures(
                    problem,
                    trial_iterate,
                    direction.constraint_partition.as_ref(),
                )?;
                if self.use_proximal_term {
                    self.add_proximal_term_to_progress_measures(current_iterate, trial_iterate);
                }
            }
        }
        Ok(self.current_phase)
    }
}

impl ConstraintRelaxationStrategy for FeasibilityRestoration {
    fn initialize(
        &mut self,
        problem: &dyn Problem,
        first_iterate: &mut Iterate,
    ) -> Result<(), NumericalError> {
        self.subproblem.initialize(problem, first_iterate)?;
        compute_residuals(
            problem,
            first_iterate,
            problem.objective_sign(),
            self.residual_norm,
        )?;
        self.phase_1_strategy.initialize(first_iterate);
        self.phase_2_strategy.initialize(first_iterate);
        Ok(())
    }

    fn create_current_subproblem(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        trust_region_radius: f64,
    ) -> Result<(), NumericalError> {
        self.subproblem.set_proximal_weights(None);
        self.subproblem.build_current_subproblem(
            problem,
            current_iterate,
            problem.objective_sign(),
            trust_region_radius,
        )
    }

    fn compute_feasible_direction(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
    ) -> Result<Direction, NumericalError> {
        // solve the original subproblem
        let mut direction = self.subproblem.solve(problem, current_iterate)?;
        direction.objective_multiplier = problem.objective_sign();
        debug!("restoration: {}", direction);

        // infeasible linearization: form the feasibility problem
        if direction.status == SubproblemStatus::Infeasible {
            let phase_2_primals = direction.primals.clone();
            let partition = direction.constraint_partition.clone();
            direction = self.solve_feasibility_problem(
                problem,
                current_iterate,
                Some(&phase_2_primals),
                partition.as_ref(),
            )?;
            debug!("restoration (feasibility): {}", direction);
        }
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
            correction.objective_multiplier = direction.objective_multiplier;
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
            debug!("the subproblem definition changed, recomputing the progress measures");
            self.phase_2_strategy.reset();
            self.subproblem
                .compute_progress_measures(problem, current_iterate)?;
        }

        let accept = if direction.norm <= self.small_step_threshold {
            self.subproblem
                .compute_progress_measures(problem, trial_iterate)?;
            true
        } else {
            let phase = self.switch_phase(problem, current_iterate, trial_iterate, direction)?;
            let predicted_reduction = predicted_reduction_model.evaluate(step_length);
            let strategy = match phase {
                Phase::Optimality => &mut self.phase_2_strategy,
                Phase::Restoration => &mut self.phase_1_strategy,
            };
            strategy.check_acceptance(
                &current_iterate.progress,
                &trial_iterate.progress,
                direction.objective_multiplier,
                predicted_reduction,
            )
        };

        if accept {
            // correct the multipliers of the partitioned feasibility problem
            if direction.objective_multiplier == 0.0 {
                if let Some(partition) = &direction.constraint_partition {
                    Self::set_restoration_multipliers(trial_iterate, partition);
                }
            }
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
        match self.current_phase {
            Phase::Optimality => self.phase_2_strategy.is_filter(),
            Phase::Restoration => self.phase_1_strategy.is_filter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;

    use super::*;
    use crate::options::Options;
    use crate::testing::Hs015;

    #[test]
    fn starts_in_the_optimality_phase() {
        let problem = Hs015;
        let mut options = Options::default();
        options.set("mechanism", "TR").unwrap();
        let restoration = FeasibilityRestoration::new(&problem, &options).unwrap();
        assert_eq!(restoration.current_phase, Phase::Optimality);
    }

    #[test]
    fn restoration_multipliers_follow_the_partition() {
        let mut iterate = Iterate::new(DVector::zeros(2), 3);
        let partition = ConstraintPartition {
            feasible: vec![1],
            infeasible: vec![0, 2],
            lower_bound_infeasible: vec![0],
            upper_bound_infeasible: vec![2],
        };
        FeasibilityRestoration::set_restoration_multipliers(&mut iterate, &partition);
        assert_eq!(iterate.multipliers.constraints[0], 1.0);
        assert_eq!(iterate.multipliers.constraints[1], 0.0);
        assert_eq!(iterate.multipliers.constraints[2], -1.0);
    }
}

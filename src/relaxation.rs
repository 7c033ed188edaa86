//! Constraint-relaxation strategies.
//!
//! A relaxation strategy reformulates the nonlinear program into a sequence
//! of subproblems that are always feasible: either a single-phase ℓ₁
//! penalty reformulation with Byrd's steering rule
//! ([`L1Relaxation`](l1_relaxation::L1Relaxation)) or a two-phase scheme
//! that switches between optimality and feasibility restoration
//! ([`FeasibilityRestoration`](feasibility_restoration::FeasibilityRestoration)).

pub mod feasibility_restoration;
pub mod l1_relaxation;

use crate::core::direction::Direction;
use crate::core::error::NumericalError;
use crate::core::iterate::Iterate;
use crate::core::problem::Problem;
use crate::options::{ConfigurationError, Options};
use crate::subproblem::PredictedReductionModel;

/// Interface of a constraint-relaxation strategy.
pub trait ConstraintRelaxationStrategy {
    /// Initializes the subproblem and the globalization strategies at the
    /// first iterate and computes its residuals.
    fn initialize(
        &mut self,
        problem: &dyn Problem,
        first_iterate: &mut Iterate,
    ) -> Result<(), NumericalError>;

    /// Builds the subproblem of the current outer iteration with the given
    /// trust-region radius (infinite when no trust region is used).
    fn create_current_subproblem(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        trust_region_radius: f64,
    ) -> Result<(), NumericalError>;

    /// Solves the subproblem for a feasible direction, relaxing the
    /// constraints when necessary.
    fn compute_feasible_direction(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
    ) -> Result<Direction, NumericalError>;

    /// Computes a second-order correction after a rejected step, if the
    /// subproblem supports one.
    fn compute_second_order_correction(
        &mut self,
        problem: &dyn Problem,
        trial_iterate: &mut Iterate,
        direction: &Direction,
    ) -> Result<Option<Direction>, NumericalError>;

    /// Predicted-reduction model of the direction.
    fn generate_predicted_reduction_model(&self, direction: &Direction) -> PredictedReductionModel;

    /// Judges a trial iterate; on acceptance, the residuals of the trial
    /// iterate are updated.
    fn is_acceptable(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        trial_iterate: &mut Iterate,
        direction: &Direction,
        predicted_reduction_model: &PredictedReductionModel,
        step_length: f64,
    ) -> Result<bool, NumericalError>;

    /// Lets the ingredients observe the newly accepted iterate.
    fn register_accepted_iterate(
        &mut self,
        _problem: &dyn Problem,
        _iterate: &mut Iterate,
    ) -> Result<(), NumericalError> {
        Ok(())
    }

    /// Whether the globalization strategy judging the current trial iterates
    /// is a filter. The line-search mechanism only attempts second-order
    /// corrections after filter rejections.
    fn uses_filter_strategy(&self) -> bool {
        false
    }
}

/// Creates a constraint-relaxation strategy from the options map.
pub fn create_constraint_relaxation_strategy(
    problem: &dyn Problem,
    options: &Options,
) -> Result<Box<dyn ConstraintRelaxationStrategy>, ConfigurationError> {
    match options.get("constraint-relaxation")? {
        "l1-relaxation" => Ok(Box::new(l1_relaxation::L1Relaxation::new(problem, options)?)),
        "feasibility-restoration" => Ok(Box::new(
            feasibility_restoration::FeasibilityRestoration::new(problem, options)?,
        )),
        name => Err(ConfigurationError::UnknownIngredient {
            family: "constraint-relaxation",
            name: name.to_string(),
        }),
    }
}

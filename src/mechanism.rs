//! Globalization mechanisms: step retraction on rejection.
//!
//! A mechanism drives the inner loop of one outer iteration: it asks the
//! constraint-relaxation strategy for a direction, assembles a trial
//! iterate, submits it for acceptance and, on rejection, retracts the step
//! by shrinking the trust-region radius
//! ([`TrustRegion`](trust_region::TrustRegion)) or the step length
//! ([`BacktrackingLineSearch`](line_search::BacktrackingLineSearch)).

pub mod line_search;
pub mod trust_region;

use thiserror::Error;

use crate::core::direction::Direction;
use crate::core::error::NumericalError;
use crate::core::iterate::Iterate;
use crate::core::problem::Problem;
use crate::options::{ConfigurationError, Options};
use crate::relaxation::create_constraint_relaxation_strategy;

/// Failure of a globalization mechanism. Divergence failures are terminal
/// for the driver, which reports them as a not-optimal status.
#[derive(Debug, Error)]
pub enum MechanismError {
    /// The trust-region radius shrank below its minimum.
    #[error("the trust-region radius became too small")]
    TrustRegionRadiusTooSmall,
    /// The line-search step length shrank below its minimum.
    #[error("the line-search step length became too small")]
    StepLengthTooSmall,
    /// An unrecoverable numerical error.
    #[error(transparent)]
    Numerical(#[from] NumericalError),
}

/// Interface of a globalization mechanism.
pub trait GlobalizationMechanism {
    /// Initializes the relaxation strategy (and, transitively, the
    /// subproblem and globalization strategies) at the first iterate.
    fn initialize(
        &mut self,
        problem: &dyn Problem,
        first_iterate: &mut Iterate,
    ) -> Result<(), NumericalError>;

    /// Produces an accepted trial iterate and the norm of the accepted
    /// step.
    fn compute_acceptable_iterate(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
    ) -> Result<(Iterate, f64), MechanismError>;
}

/// Creates a globalization mechanism (with its relaxation strategy) from
/// the options map.
pub fn create_mechanism(
    problem: &dyn Problem,
    options: &Options,
) -> Result<Box<dyn GlobalizationMechanism>, ConfigurationError> {
    let relaxation = create_constraint_relaxation_strategy(problem, options)?;
    match options.get("mechanism")? {
        "TR" => Ok(Box::new(trust_region::TrustRegion::new(relaxation, options)?)),
        "LS" => Ok(Box::new(line_search::BacktrackingLineSearch::new(
            relaxation, options,
        )?)),
        name => Err(ConfigurationError::UnknownIngredient {
            family: "mechanism",
            name: name.to_string(),
        }),
    }
}

/// Assembles the trial iterate `x + α d` with the dual displacements
/// applied at the same step length. Components beyond the direction (or the
/// iterate) are carried unchanged.
pub(crate) fn assemble_trial_iterate(
    current_iterate: &Iterate,
    direction: &Direction,
    step_length: f64,
) -> Iterate {
    let mut trial_iterate = Iterate::new(current_iterate.x.clone(), 0);
    trial_iterate.multipliers = current_iterate.multipliers.clone();

    let primal_length = current_iterate.x.len().min(direction.primals.len());
    for i in 0..primal_length {
        trial_iterate.x[i] += step_length * direction.primals[i];
    }
    for j in 0..trial_iterate
        .multipliers
        .constraints
        .len()
        .min(direction.multipliers.constraints.len())
    {
        trial_iterate.multipliers.constraints[j] +=
            step_length * direction.multipliers.constraints[j];
    }
    let bound_length = trial_iterate
        .multipliers
        .lower_bounds
        .len()
        .min(direction.multipliers.lower_bounds.len());
    for i in 0..bound_length {
        trial_iterate.multipliers.lower_bounds[i] +=
            step_length * direction.multipliers.lower_bounds[i];
        trial_iterate.multipliers.upper_bounds[i] +=
            step_length * direction.multipliers.upper_bounds[i];
    }
    trial_iterate
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;

    use super::*;
    use crate::core::iterate::Multipliers;

    #[test]
    fn trial_iterate_combines_primal_and_dual_steps() {
        let mut current = Iterate::new(DVector::from_vec(vec![1.0, 2.0]), 1);
        current.multipliers.constraints[0] = 3.0;

        let mut direction = Direction::new(2, 1);
        direction.primals = DVector::from_vec(vec![2.0, -2.0]);
        direction.multipliers = Multipliers::new(2, 1);
        direction.multipliers.constraints[0] = -1.0;

        let trial = assemble_trial_iterate(&current, &direction, 0.5);
        assert_eq!(trial.x[0], 2.0);
        assert_eq!(trial.x[1], 1.0);
        assert_eq!(trial.multipliers.constraints[0], 2.5);
    }
}

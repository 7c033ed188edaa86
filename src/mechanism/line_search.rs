//! Backtracking line-search globalization mechanism.

use getset::{CopyGetters, Setters};
use log::{debug, warn};

use crate::core::error::NumericalError;
use crate::core::iterate::Iterate;
use crate::core::problem::Problem;
use crate::mechanism::{assemble_trial_iterate, GlobalizationMechanism, MechanismError};
use crate::options::{ConfigurationError, Options};
use crate::relaxation::ConstraintRelaxationStrategy;

/// Options of the [`BacktrackingLineSearch`] mechanism.
#[derive(Debug, Clone, Copy, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct LineSearchOptions {
    /// Ratio applied to the step length after a rejection, in `(0, 1)`.
    /// Default: `0.5`.
    backtracking_ratio: f64,
    /// Step length below which the mechanism fails. Default: `1e-9`.
    min_step_length: f64,
    /// Whether a second-order correction is attempted when a filter
    /// strategy rejects the first trial. Default: `true`.
    second_order_correction: bool,
}

impl LineSearchOptions {
    fn from_options(options: &Options) -> Result<Self, ConfigurationError> {
        Ok(Self {
            backtracking_ratio: options.get_f64("LS_backtracking_ratio")?,
            min_step_length: options.get_f64("LS_min_step_length")?,
            second_order_correction: options.get_bool("LS_second_order_correction")?,
        })
    }
}

/// Backtracking line search: one direction per outer iteration, geometric
/// step-length decrease on rejection.
pub struct BacktrackingLineSearch {
    relaxation_strategy: Box<dyn ConstraintRelaxationStrategy>,
    options: LineSearchOptions,
}

impl BacktrackingLineSearch {
    /// Creates the mechanism around a relaxation strategy.
    pub fn new(
        relaxation_strategy: Box<dyn ConstraintRelaxationStrategy>,
        options: &Options,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            relaxation_strategy,
            options: LineSearchOptions::from_options(options)?,
        })
    }
}

impl GlobalizationMechanism for BacktrackingLineSearch {
    fn initialize(
        &mut self,
        problem: &dyn Problem,
        first_iterate: &mut Iterate,
    ) -> Result<(), NumericalError> {
        self.relaxation_strategy.initialize(problem, first_iterate)
    }

    fn compute_acceptable_iterate(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
    ) -> Result<(Iterate, f64), MechanismError> {
        // the subproblem is built once, without a trust region
        self.relaxation_strategy
            .create_current_subproblem(problem, current_iterate, f64::INFINITY)?;
        let direction = self
            .relaxation_strategy
            .compute_feasible_direction(problem, current_iterate)?;
        let predicted_reduction_model = self
            .relaxation_strategy
            .generate_predicted_reduction_model(&direction);

        let mut step_length = direction.max_primal_step_length.min(1.0);
        let mut number_inner_iterations = 0;
        let mut correction_attempted = false;

        while step_length >= self.options.min_step_length() {
            number_inner_iterations += 1;
            debug!(
                "line-search iteration {}, step length {:.4e}",
                number_inner_iterations, step_length
            );
            let mut trial_iterate =
                assemble_trial_iterate(current_iterate, &direction, step_length);

            match self.relaxation_strategy.is_acceptable(
                problem,
                current_iterate,
                &mut trial_iterate,
                &direction,
                &predicted_reduction_model,
                step_length,
            ) {
                Ok(true) => {
                    self.relaxation_strategy
                        .register_accepted_iterate(problem, &mut trial_iterate)?;
                    debug!(
                        "step accepted after {} inner iterations",
                        number_inner_iterations
                    );
                    return Ok((trial_iterate, step_length * direction.norm));
                }
                Ok(false) => {
                    // one second-order correction after the first rejection,
                    // only when a filter strategy did the rejecting
                    if !correction_attempted
                        && number_inner_iterations == 1
                        && self.options.second_order_correction()
                        && self.relaxation_strategy.uses_filter_strategy()
                    {
                        correction_attempted = true;
                        if let Some(corrected_direction) =
                            self.relaxation_strategy.compute_second_order_correction(
                                problem,
                                &mut trial_iterate,
                                &direction,
                            )?
                        {
                            debug!("trying a second-order correction");
                            let mut corrected_trial = assemble_trial_iterate(
                                current_iterate,
                                &corrected_direction,
                                1.0,
                            );
                            let corrected_model = self
                                .relaxation_strategy
                                .generate_predicted_reduction_model(&corrected_direction);
                            if self.relaxation_strategy.is_acceptable(
                                problem,
                                current_iterate,
                                &mut corrected_trial,
                                &corrected_direction,
                                &corrected_model,
                                1.0,
                            )? {
                                self.relaxation_strategy
                                    .register_accepted_iterate(problem, &mut corrected_trial)?;
                                return Ok((corrected_trial, corrected_direction.norm));
                            }
                        }
                    }
                    step_length *= self.options.backtracking_ratio();
                }
                Err(error) => {
                    // evaluation error: retreat along the direction
                    warn!("{}, decreasing the step length", error);
                    step_length *= self.options.backtracking_ratio();
                }
            }
        }
        Err(MechanismError::StepLengthTooSmall)
    }
}

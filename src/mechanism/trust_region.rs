//! Trust-region globalization mechanism.
//!
//! The subproblem is solved inside the box `-Δ <= d_i <= Δ` intersected
//! with the variable bounds. Rejected steps shrink the radius, accepted
//! steps that push against the trust region enlarge it.
//!
//! # References
//!
//! \[1\] [Trust-Region Methods](https://epubs.siam.org/doi/book/10.1137/1.9780898719857)

use getset::{CopyGetters, Setters};
use log::{debug, warn};

use crate::core::direction::{Direction, SubproblemStatus};
use crate::core::error::NumericalError;
use crate::core::iterate::Iterate;
use crate::core::problem::Problem;
use crate::mechanism::{assemble_trial_iterate, GlobalizationMechanism, MechanismError};
use crate::options::{ConfigurationError, Options};
use crate::relaxation::ConstraintRelaxationStrategy;

/// Options of the [`TrustRegion`] mechanism.
#[derive(Debug, Clone, Copy, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct TrustRegionOptions {
    /// Initial radius. Default: `10`.
    radius: f64,
    /// Factor applied to the radius after an active accepted step. Default:
    /// `2`.
    increase_factor: f64,
    /// Factor dividing the radius after a rejection. Default: `2`.
    decrease_factor: f64,
    /// Tolerance for declaring the trust region active. Default: `1e-6`.
    activity_tolerance: f64,
    /// Radius below which the mechanism fails. Default: `1e-16`.
    min_radius: f64,
    /// Radius cap. Default: `1e12`.
    max_radius: f64,
}

impl TrustRegionOptions {
    fn from_options(options: &Options) -> Result<Self, ConfigurationError> {
        Ok(Self {
            radius: options.get_f64("TR_radius")?,
            increase_factor: options.get_f64("TR_increase_factor")?,
            decrease_factor: options.get_f64("TR_decrease_factor")?,
            activity_tolerance: options.get_f64("TR_activity_tolerance")?,
            min_radius: options.get_f64("TR_min_radius")?,
            max_radius: options.get_f64("TR_max_radius")?,
        })
    }
}

/// Trust-region mechanism.
pub struct TrustRegion {
    relaxation_strategy: Box<dyn ConstraintRelaxationStrategy>,
    options: TrustRegionOptions,
    radius: f64,
    number_inner_iterations: usize,
}

impl TrustRegion {
    /// Creates the mechanism around a relaxation strategy.
    pub fn new(
        relaxation_strategy: Box<dyn ConstraintRelaxationStrategy>,
        options: &Options,
    ) -> Result<Self, ConfigurationError> {
        let options = TrustRegionOptions::from_options(options)?;
        Ok(Self {
            relaxation_strategy,
            radius: options.radius(),
            options,
            number_inner_iterations: 0,
        })
    }

    /// Current trust-region radius.
    pub fn radius(&self) -> f64 {
        self.radius
    }

    // bound multipliers of components active at the trust region are
    // cleared: the activity is against the trust region, not the problem
    fn rectify_active_set(
        direction: &mut Direction,
        current_iterate: &Iterate,
        radius: f64,
        activity_tolerance: f64,
    ) {
        debug_assert!(radius > 0.0);
        let primals = &direction.primals;
        let multipliers = &mut direction.multipliers;
        direction.active_set.bounds.at_lower_bound.retain(|&i| {
            if (primals[i] + radius).abs() <= activity_tolerance {
                let current = if i < current_iterate.multipliers.lower_bounds.len() {
                    current_iterate.multipliers.lower_bounds[i]
                } else {
                    0.0
                };
                multipliers.lower_bounds[i] = -current;
                false
            } else {
                true
            }
        });
        direction.active_set.bounds.at_upper_bound.retain(|&i| {
            if (primals[i] - radius).abs() <= activity_tolerance {
                let current = if i < current_iterate.multipliers.upper_bounds.len() {
                    current_iterate.multipliers.upper_bounds[i]
                } else {
                    0.0
                };
                multipliers.upper_bounds[i] = -current;
                false
            } else {
                true
            }
        });
    }

    fn try_inner_iteration(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
    ) -> Result<Option<(Iterate, f64)>, NumericalError> {
        debug_assert!(self.radius > 0.0);
        self.number_inner_iterations += 1;
        debug!(
            "trust-region iteration {}, radius {:.4e}",
            self.number_inner_iterations, self.radius
        );

        self.relaxation_strategy
            .create_current_subproblem(problem, current_iterate, self.radius)?;
        let mut direction = self
            .relaxation_strategy
            .compute_feasible_direction(problem, current_iterate)?;
        assert!(
            direction.status != SubproblemStatus::Unbounded,
            "the trust-region subproblem cannot be unbounded"
        );
        Self::rectify_active_set(
            &mut direction,
            current_iterate,
            self.radius,
            self.options.activity_tolerance(),
        );

        // take the full step (capped by the subproblem's own rule)
        let step_length = direction.max_primal_step_length;
        let mut trial_iterate = assemble_trial_iterate(current_iterate, &direction, step_length);
        let predicted_reduction_model = self
            .relaxation_strategy
            .generate_predicted_reduction_model(&direction);

        if self.relaxation_strategy.is_acceptable(
            problem,
            current_iterate,
            &mut trial_iterate,
            &direction,
            &predicted_reduction_model,
            step_length,
        )? {
            // enlarge an active trust region
            if direction.norm >= self.radius - self.options.activity_tolerance() {
                self.radius =
                    (self.radius * self.options.increase_factor()).min(self.options.max_radius());
            }
            self.relaxation_strategy
                .register_accepted_iterate(problem, &mut trial_iterate)?;
            debug!(
                "step accepted after {} inner iterations, radius now {:.4e}",
                self.number_inner_iterations, self.radius
            );
            Ok(Some((trial_iterate, direction.norm)))
        } else {
            self.radius = self.radius.min(direction.norm) / self.options.decrease_factor();
            Ok(None)
        }
    }
}

impl GlobalizationMechanism for TrustRegion {
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
        self.number_inner_iterations = 0;
        while self.radius >= self.options.min_radius() {
            match self.try_inner_iteration(problem, current_iterate) {
                Ok(Some(accepted)) => return Ok(accepted),
                Ok(None) => {}
                Err(error) => {
                    // evaluation error: retreat into a smaller region
                    warn!("{}, decreasing the trust-region radius", error);
                    self.radius /= self.options.decrease_factor();
                }
            }
        }
        Err(MechanismError::TrustRegionRadiusTooSmall)
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;

    use super::*;
    use crate::core::iterate::Multipliers;

    #[test]
    fn active_set_rectification_clears_trust_region_bounds() {
        let current = Iterate::new(DVector::zeros(2), 0);
        let mut direction = Direction::new(2, 0);
        direction.primals = DVector::from_vec(vec![-1.0, 0.3]);
        direction.multipliers = Multipliers::new(2, 0);
        direction.multipliers.lower_bounds[0] = 2.0;
        direction.active_set.bounds.at_lower_bound = vec![0];
        direction.active_set.bounds.at_upper_bound = vec![];

        // component 0 sits exactly at -radius: its activity is against the
        // trust region
        TrustRegion::rectify_active_set(&mut direction, &current, 1.0, 1e-6);
        assert!(direction.active_set.bounds.at_lower_bound.is_empty());
        assert_eq!(direction.multipliers.lower_bounds[0], 0.0);
    }

    #[test]
    fn radius_stays_within_its_bounds_during_a_solve() {
        use crate::options::Options;
        use crate::relaxation::create_constraint_relaxation_strategy;
        use crate::testing::Rosenbrock;

        let problem = Rosenbrock;
        let mut options = Options::default();
        options.set("preset", "filtersqp").unwrap();
        let relaxation = create_constraint_relaxation_strategy(&problem, &options).unwrap();
        let mut mechanism = TrustRegion::new(relaxation, &options).unwrap();

        let mut iterate = Iterate::new(DVector::from_vec(vec![-1.2, 1.0]), 0);
        mechanism.initialize(&problem, &mut iterate).unwrap();
        let min_radius = mechanism.options.min_radius();
        let max_radius = mechanism.options.max_radius();
        for _ in 0..20 {
            let (accepted, _) = mechanism
                .compute_acceptable_iterate(&problem, &mut iterate)
                .unwrap();
            iterate = accepted;
            assert!(mechanism.radius() >= min_radius);
            assert!(mechanism.radius() <= max_radius);
        }
    }
}

//! Funnel globalization strategy.
//!
//! The funnel is a single upper bound `τ` on the feasibility measure that
//! contracts along the run: every accepted iterate must live inside the
//! funnel, and feasibility-improving steps pull the funnel tighter.

use log::debug;

use crate::core::iterate::{Iterate, ProgressMeasures};
use crate::options::{ConfigurationError, Options};
use crate::strategy::GlobalizationStrategy;

/// Acceptance inside a shrinking feasibility funnel.
pub struct FunnelStrategy {
    funnel_radius: f64,
    initial_radius: f64,
    initial_multiplier: f64,
    contraction_floor: f64,
    contraction: f64,
    beta: f64,
    armijo_decrease_fraction: f64,
}

impl FunnelStrategy {
    /// Creates the strategy from the options map.
    pub fn new(options: &Options) -> Result<Self, ConfigurationError> {
        Ok(Self {
            funnel_radius: f64::INFINITY,
            initial_radius: f64::INFINITY,
            initial_multiplier: options.get_f64("funnel_initial_multiplier")?,
            contraction_floor: options.get_f64("funnel_contraction_floor")?,
            contraction: options.get_f64("funnel_contraction")?,
            beta: options.get_f64("filter_beta")?,
            armijo_decrease_fraction: options.get_f64("armijo_decrease_fraction")?,
        })
    }

    /// Current funnel radius.
    pub fn funnel_radius(&self) -> f64 {
        self.funnel_radius
    }
}

impl GlobalizationStrategy for FunnelStrategy {
    fn initialize(&mut self, first_iterate: &Iterate) {
        self.initial_radius =
            (self.initial_multiplier * first_iterate.progress.feasibility).max(1.0);
        self.funnel_radius = self.initial_radius;
    }

    fn check_acceptance(
        &mut self,
        current_progress: &ProgressMeasures,
        trial_progress: &ProgressMeasures,
        objective_multiplier: f64,
        predicted_reduction: f64,
    ) -> bool {
        if trial_progress.feasibility > self.funnel_radius {
            debug!(
                "funnel: trial feasibility {:.4e} outside the funnel {:.4e}",
                trial_progress.feasibility, self.funnel_radius
            );
            return false;
        }
        if objective_multiplier > 0.0 && predicted_reduction > 0.0 {
            let actual_reduction = current_progress.objective - trial_progress.objective;
            let accept =
                actual_reduction >= self.armijo_decrease_fraction * predicted_reduction;
            debug!(
                "funnel: f-type step, actual {:.4e} vs predicted {:.4e} -> {}",
                actual_reduction, predicted_reduction, accept
            );
            accept
        } else {
            let accept = trial_progress.feasibility <= self.beta * current_progress.feasibility;
            if accept {
                // contract the funnel towards the achieved feasibility
                let contracted = trial_progress.feasibility
                    + self.contraction * (self.funnel_radius - trial_progress.feasibility);
                self.funnel_radius =
                    (self.contraction_floor * self.funnel_radius).max(contracted);
                debug!("funnel: h-type step, radius contracted to {:.4e}", self.funnel_radius);
            }
            accept
        }
    }

    fn reset(&mut self) {
        self.funnel_radius = self.initial_radius;
    }

    fn notify(&mut self, iterate: &Iterate) {
        // make sure the funnel can hold the notified iterate
        self.funnel_radius = self
            .funnel_radius
            .max(self.initial_multiplier * iterate.progress.feasibility);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::iterate::Iterate;
    use nalgebra::DVector;

    fn strategy() -> FunnelStrategy {
        FunnelStrategy {
            funnel_radius: f64::INFINITY,
            initial_radius: f64::INFINITY,
            initial_multiplier: 10.0,
            contraction_floor: 0.1,
            contraction: 0.5,
            beta: 0.999,
            armijo_decrease_fraction: 1e-4,
        }
    }

    fn progress(feasibility: f64, objective: f64) -> ProgressMeasures {
        ProgressMeasures {
            feasibility,
            objective,
        }
    }

    #[test]
    fn funnel_contracts_after_h_type_steps() {
        let mut funnel = strategy();
        let mut first = Iterate::new(DVector::zeros(1), 0);
        first.progress = progress(1.0, 0.0);
        funnel.initialize(&first);
        let before = funnel.funnel_radius();

        let current = progress(1.0, 0.0);
        let trial = progress(0.1, 0.0);
        assert!(funnel.check_acceptance(&current, &trial, 0.0, 0.0));
        assert!(funnel.funnel_radius() < before);
    }

    #[test]
    fn trial_outside_the_funnel_is_rejected() {
        let mut funnel = strategy();
        let mut first = Iterate::new(DVector::zeros(1), 0);
        first.progress = progress(0.1, 0.0);
        funnel.initialize(&first);

        let current = progress(0.1, 0.0);
        let trial = progress(50.0, -1e6);
        assert!(!funnel.check_acceptance(&current, &trial, 1.0, 1.0));
    }

    #[test]
    fn f_type_steps_require_armijo_decrease() {
        let mut funnel = strategy();
        let mut first = Iterate::new(DVector::zeros(1), 0);
        first.progress = progress(0.5, 10.0);
        funnel.initialize(&first);

        let current = progress(0.5, 10.0);
        let good_trial = progress(0.5, 9.0);
        let bad_trial = progress(0.5, 10.0 + 1.0);
        assert!(funnel.check_acceptance(&current, &good_trial, 1.0, 1.0));
        assert!(!funnel.check_acceptance(&current, &bad_trial, 1.0, 1.0));
    }
}

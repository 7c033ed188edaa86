//! Exact-penalty merit function.

use log::debug;

use crate::core::iterate::{Iterate, ProgressMeasures};
use crate::options::{ConfigurationError, Options};
use crate::strategy::GlobalizationStrategy;

/// Armijo test on the ℓ₁ merit function `φ(x) = σ f(x) + feasibility(x)`:
/// a trial iterate is accepted when the actual merit reduction reaches a
/// fraction of the predicted reduction.
pub struct L1MeritFunction {
    armijo_decrease_fraction: f64,
}

impl L1MeritFunction {
    /// Creates the strategy from the options map.
    pub fn new(options: &Options) -> Result<Self, ConfigurationError> {
        Ok(Self {
            armijo_decrease_fraction: options.get_f64("armijo_decrease_fraction")?,
        })
    }
}

impl GlobalizationStrategy for L1MeritFunction {
    fn initialize(&mut self, _first_iterate: &Iterate) {}

    fn check_acceptance(
        &mut self,
        current_progress: &ProgressMeasures,
        trial_progress: &ProgressMeasures,
        objective_multiplier: f64,
        predicted_reduction: f64,
    ) -> bool {
        if predicted_reduction <= 0.0 {
            debug!(
                "merit: nonpositive predicted reduction {:.4e}, rejecting",
                predicted_reduction
            );
            return false;
        }
        let current_merit =
            objective_multiplier * current_progress.objective + current_progress.feasibility;
        let trial_merit =
            objective_multiplier * trial_progress.objective + trial_progress.feasibility;
        let actual_reduction = current_merit - trial_merit;
        debug!(
            "merit: actual reduction {:.4e}, predicted {:.4e}",
            actual_reduction, predicted_reduction
        );
        // a tiny margin absorbs cancellation in the merit difference
        let margin = 1e-15 * current_merit.abs().max(1.0);
        actual_reduction + margin >= self.armijo_decrease_fraction * predicted_reduction
    }

    fn reset(&mut self) {}

    fn notify(&mut self, _iterate: &Iterate) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> L1MeritFunction {
        L1MeritFunction {
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
    fn accepts_sufficient_merit_decrease() {
        let mut merit = strategy();
        let current = progress(1.0, 10.0);
        let trial = progress(0.5, 9.5);
        assert!(merit.check_acceptance(&current, &trial, 1.0, 1.0));
    }

    #[test]
    fn rejects_merit_increase() {
        let mut merit = strategy();
        let current = progress(1.0, 10.0);
        let trial = progress(2.0, 10.0);
        assert!(!merit.check_acceptance(&current, &trial, 1.0, 1.0));
    }

    #[test]
    fn rejects_nonpositive_predicted_reduction() {
        let mut merit = strategy();
        let current = progress(1.0, 10.0);
        let trial = progress(0.0, 0.0);
        assert!(!merit.check_acceptance(&current, &trial, 1.0, -1.0));
    }

    #[test]
    fn penalty_weight_scales_the_objective_part() {
        let mut merit = strategy();
        // with a zero objective multiplier only feasibility counts
        let current = progress(1.0, 0.0);
        let trial = progress(0.2, 100.0);
        assert!(merit.check_acceptance(&current, &trial, 0.0, 0.8));
    }
}

//! Globalization strategies: acceptance tests for trial iterates.

pub mod filter;
pub mod funnel;
pub mod merit;

use crate::core::iterate::{Iterate, ProgressMeasures};
use crate::options::{ConfigurationError, Options};

/// Interface of a globalization strategy.
///
/// A strategy judges a trial iterate from the `(feasibility, objective)`
/// progress pairs of the current and trial iterates, the objective
/// multiplier of the direction and the predicted reduction of the
/// subproblem model.
pub trait GlobalizationStrategy {
    /// Initializes the strategy at the first iterate.
    fn initialize(&mut self, first_iterate: &Iterate);

    /// Decides whether the trial iterate is acceptable.
    fn check_acceptance(
        &mut self,
        current_progress: &ProgressMeasures,
        trial_progress: &ProgressMeasures,
        objective_multiplier: f64,
        predicted_reduction: f64,
    ) -> bool;

    /// Forgets the acceptance history (called when the merit surface
    /// changes, for instance after a penalty or barrier update).
    fn reset(&mut self);

    /// Takes note of an iterate without judging it (used by the restoration
    /// strategy to seed acceptance histories).
    fn notify(&mut self, iterate: &Iterate);

    /// Whether this is a filter strategy. Second-order corrections are only
    /// attempted after a trial rejected by a filter.
    fn is_filter(&self) -> bool {
        false
    }
}

/// Creates a globalization strategy from the options map.
pub fn create_strategy(
    options: &Options,
) -> Result<Box<dyn GlobalizationStrategy>, ConfigurationError> {
    match options.get("strategy")? {
        "l1-merit" => Ok(Box::new(merit::L1MeritFunction::new(options)?)),
        "filter" => Ok(Box::new(filter::FilterStrategy::new(options)?)),
        "funnel" => Ok(Box::new(funnel::FunnelStrategy::new(options)?)),
        name => Err(ConfigurationError::UnknownIngredient {
            family: "strategy",
            name: name.to_string(),
        }),
    }
}

//! Filter globalization strategy.
//!
//! A filter keeps the `(feasibility, objective)` pairs of past iterates that
//! are not dominated by one another. A trial iterate is acceptable when it
//! is not dominated, up to a small envelope, by any filter entry or by the
//! current iterate.
//!
//! # References
//!
//! \[1\] [Nonlinear programming without a penalty
//! function](https://link.springer.com/article/10.1007/s101070100244)

use log::debug;

use crate::core::iterate::{Iterate, ProgressMeasures};
use crate::options::{ConfigurationError, Options};
use crate::strategy::GlobalizationStrategy;

/// Set of mutually non-dominated `(feasibility, objective)` pairs with an
/// envelope and an upper bound on feasibility.
pub struct Filter {
    entries: Vec<(f64, f64)>,
    beta: f64,
    gamma: f64,
    capacity: usize,
    upper_bound: f64,
}

impl Filter {
    /// Creates an empty filter.
    pub fn new(beta: f64, gamma: f64, capacity: usize, upper_bound: f64) -> Self {
        Self {
            entries: Vec::new(),
            beta,
            gamma,
            capacity,
            upper_bound,
        }
    }

    /// Sets the upper bound on acceptable feasibility.
    pub fn set_upper_bound(&mut self, upper_bound: f64) {
        self.upper_bound = upper_bound;
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Current entries, mutually non-dominated.
    pub fn entries(&self) -> &[(f64, f64)] {
        &self.entries
    }

    /// Checks whether the pair is acceptable to the filter: within the
    /// feasibility upper bound and not dominated by any entry under the
    /// envelope.
    pub fn acceptable(&self, feasibility: f64, objective: f64) -> bool {
        if feasibility > self.beta * self.upper_bound {
            return false;
        }
        // strict on the feasibility side, so a pair with zero feasibility
        // still forces objective decrease
        self.entries.iter().all(|&(entry_feasibility, entry_objective)| {
            feasibility < self.beta * entry_feasibility
                || objective <= entry_objective - self.gamma * entry_feasibility
        })
    }

    /// Checks whether the trial pair improves on the current pair under the
    /// envelope.
    pub fn improves_current_iterate(
        &self,
        current_feasibility: f64,
        current_objective: f64,
        trial_feasibility: f64,
        trial_objective: f64,
    ) -> bool {
        trial_feasibility < self.beta * current_feasibility
            || trial_objective <= current_objective - self.gamma * current_feasibility
    }

    /// Adds a pair, dropping entries it dominates. When the filter is full,
    /// the entry with the largest feasibility is evicted and the upper bound
    /// tightened accordingly.
    pub fn add(&mut self, feasibility: f64, objective: f64) {
        self.entries.retain(|&(entry_feasibility, entry_objective)| {
            entry_feasibility < feasibility || entry_objective < objective
        });
        self.entries.push((feasibility, objective));
        if self.entries.len() > self.capacity {
            if let Some(worst) = self
                .entries
                .iter()
                .enumerate()
                .max_by(|a, b| a.1 .0.total_cmp(&b.1 .0))
                .map(|(index, _)| index)
            {
                let (worst_feasibility, _) = self.entries.swap_remove(worst);
                self.upper_bound = self.upper_bound.min(self.beta * worst_feasibility);
            }
        }
    }
}

/// Globalization strategy driven by a [`Filter`].
pub struct FilterStrategy {
    filter: Filter,
    armijo_decrease_fraction: f64,
    initial_upper_bound: f64,
    upper_bound_factor: f64,
}

impl FilterStrategy {
    /// Creates the strategy from the options map.
    pub fn new(options: &Options) -> Result<Self, ConfigurationError> {
        let initial_upper_bound = options.get_f64("filter_upper_bound")?;
        Ok(Self {
            filter: Filter::new(
                options.get_f64("filter_beta")?,
                options.get_f64("filter_gamma")?,
                options.get_usize("filter_capacity")?,
                initial_upper_bound,
            ),
            armijo_decrease_fraction: options.get_f64("armijo_decrease_fraction")?,
            initial_upper_bound,
            upper_bound_factor: options.get_f64("filter_upper_bound_factor")?,
        })
    }

    /// Read access to the filter, mainly for tests and diagnostics.
    pub fn filter(&self) -> &Filter {
        &self.filter
    }
}

impl GlobalizationStrategy for FilterStrategy {
    fn initialize(&mut self, first_iterate: &Iterate) {
        let upper_bound = self
            .initial_upper_bound
            .max(self.upper_bound_factor * first_iterate.progress.feasibility);
        self.filter.set_upper_bound(upper_bound);
    }

    fn check_acceptance(
        &mut self,
        current_progress: &ProgressMeasures,
        trial_progress: &ProgressMeasures,
        objective_multiplier: f64,
        predicted_reduction: f64,
    ) -> bool {
        if !self
            .filter
            .acceptable(trial_progress.feasibility, trial_progress.objective)
        {
            debug!("filter: trial iterate dominated by the filter");
            return false;
        }
        if !self.filter.improves_current_iterate(
            current_progress.feasibility,
            current_progress.objective,
            trial_progress.feasibility,
            trial_progress.objective,
        ) {
            debug!("filter: trial iterate does not improve on the current one");
            return false;
        }

        // switching condition: the step is an f-type step when the model
        // predicts objective descent
        if objective_multiplier > 0.0 && predicted_reduction > 0.0 {
            let actual_reduction = current_progress.objective - trial_progress.objective;
            let accept =
                actual_reduction >= self.armijo_decrease_fraction * predicted_reduction;
            debug!(
                "filter: f-type step, actual {:.4e} vs predicted {:.4e} -> {}",
                actual_reduction, predicted_reduction, accept
            );
            accept
        } else {
            // h-type step: the envelope tests above guarantee sufficient
            // progress; the current pair enters the filter
            self.filter
                .add(current_progress.feasibility, current_progress.objective);
            debug!("filter: h-type step accepted, current pair added to the filter");
            true
        }
    }

    fn reset(&mut self) {
        self.filter.clear();
        self.filter.set_upper_bound(self.initial_upper_bound);
    }

    fn notify(&mut self, iterate: &Iterate) {
        self.filter
            .add(iterate.progress.feasibility, iterate.progress.objective);
    }

    fn is_filter(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_filter() -> Filter {
        Filter::new(0.999, 0.001, 10, 100.0)
    }

    #[test]
    fn entries_stay_non_dominated() {
        let mut filter = small_filter();
        filter.add(1.0, 5.0);
        filter.add(0.5, 6.0);
        filter.add(2.0, 4.0);
        // a pair dominating two entries evicts them
        filter.add(0.4, 4.5);
        for &(h1, f1) in filter.entries() {
            for &(h2, f2) in filter.entries() {
                if (h1, f1) != (h2, f2) {
                    assert!(
                        h1 < h2 || f1 < f2,
                        "({h1}, {f1}) is dominated by ({h2}, {f2})"
                    );
                }
            }
        }
    }

    #[test]
    fn dominated_pair_is_not_acceptable() {
        let mut filter = small_filter();
        filter.add(1.0, 5.0);
        assert!(!filter.acceptable(1.5, 6.0));
        assert!(filter.acceptable(0.5, 10.0));
        assert!(filter.acceptable(1.5, 4.0));
    }

    #[test]
    fn feasibility_upper_bound_is_enforced() {
        let filter = small_filter();
        assert!(!filter.acceptable(200.0, -1e9));
    }

    #[test]
    fn capacity_eviction_tightens_the_upper_bound() {
        let mut filter = Filter::new(0.999, 0.001, 2, 100.0);
        filter.add(10.0, 1.0);
        filter.add(5.0, 2.0);
        filter.add(1.0, 3.0);
        assert_eq!(filter.entries().len(), 2);
        assert!(filter.entries().iter().all(|&(h, _)| h < 10.0));
    }
}

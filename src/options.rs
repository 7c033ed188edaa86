//! String-keyed options and presets.
//!
//! All ingredients are configured through a single [`Options`] map with
//! typed accessors. Factories consume the map and fail early on unknown
//! keys or values. A preset overrides a consistent tuple of ingredients,
//! reproducing classical solvers.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::problem::Norm;

/// A fatal configuration problem, surfaced at construction time.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The option key does not exist.
    #[error("unknown option `{0}`")]
    UnknownOption(String),
    /// The option value cannot be parsed.
    #[error("invalid value `{value}` for option `{key}`")]
    InvalidValue {
        /// Offending key.
        key: String,
        /// Offending value.
        value: String,
    },
    /// A factory received an unknown ingredient name.
    #[error("unknown {family} `{name}`")]
    UnknownIngredient {
        /// Ingredient family (mechanism, strategy, ...).
        family: &'static str,
        /// Offending name.
        name: String,
    },
}

const DEFAULT_OPTIONS: &[(&str, &str)] = &[
    // ingredient selection
    ("mechanism", "TR"),
    ("strategy", "filter"),
    ("constraint-relaxation", "feasibility-restoration"),
    ("subproblem", "QP"),
    ("QP_solver", "IPM"),
    ("LP_solver", "IPM"),
    ("hessian_model", "exact"),
    // trust region
    ("TR_radius", "10"),
    ("TR_increase_factor", "2"),
    ("TR_decrease_factor", "2"),
    ("TR_activity_tolerance", "1e-6"),
    ("TR_min_radius", "1e-16"),
    ("TR_max_radius", "1e12"),
    // line search
    ("LS_backtracking_ratio", "0.5"),
    ("LS_min_step_length", "1e-9"),
    ("LS_second_order_correction", "yes"),
    // l1 relaxation
    ("l1_relaxation_initial_parameter", "1"),
    ("l1_relaxation_decrease_factor", "10"),
    ("l1_relaxation_epsilon1", "0.1"),
    ("l1_relaxation_epsilon2", "0.1"),
    ("l1_relaxation_penalty_threshold", "1e-10"),
    // globalization strategies
    ("armijo_decrease_fraction", "1e-4"),
    ("filter_beta", "0.999"),
    ("filter_gamma", "0.001"),
    ("filter_capacity", "50"),
    ("filter_upper_bound", "1e2"),
    ("filter_upper_bound_factor", "1.25"),
    ("funnel_initial_multiplier", "10"),
    ("funnel_contraction", "0.5"),
    ("funnel_contraction_floor", "0.1"),
    // barrier subproblem
    ("barrier_initial_parameter", "0.1"),
    ("barrier_decrease_factor", "0.2"),
    ("barrier_superlinear_exponent", "1.5"),
    ("barrier_tau_min", "0.99"),
    ("barrier_kappa_epsilon", "10"),
    ("barrier_damping_factor", "1e-5"),
    ("barrier_push_factor", "1e-2"),
    // subproblem assembly
    ("proximal_coefficient", "0"),
    ("activity_tolerance", "1e-6"),
    ("progress_norm", "L1"),
    // driver
    ("optimality_tolerance", "1e-6"),
    ("feasibility_tolerance", "1e-6"),
    ("complementarity_tolerance", "1e-6"),
    ("small_step_threshold", "1e-9"),
    ("residual_norm", "INF"),
    ("max_iterations", "1000"),
    ("time_limit", "inf"),
    // preprocessing and reporting
    ("scale_functions", "yes"),
    ("scaling_threshold", "100"),
    ("enforce_linear_constraints", "no"),
    ("print_solution", "no"),
    ("logger", "INFO"),
];

/// String-keyed option map with typed accessors.
#[derive(Debug, Clone)]
pub struct Options {
    values: BTreeMap<String, String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            values: DEFAULT_OPTIONS
                .iter()
                .map(|&(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }
}

impl Options {
    /// Sets an option. The key must exist in the defaults; `preset` applies
    /// a consistent tuple of ingredient choices instead.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigurationError> {
        if key == "preset" {
            return self.apply_preset(value);
        }
        if !self.values.contains_key(key) {
            return Err(ConfigurationError::UnknownOption(key.to_string()));
        }
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Applies a preset: a consistent choice of mechanism, relaxation,
    /// strategy and subproblem reproducing a classical solver.
    pub fn apply_preset(&mut self, name: &str) -> Result<(), ConfigurationError> {
        let tuple: &[(&str, &str)] = match name {
            // Byrd-style S l1 QP
            "byrd" => &[
                ("mechanism", "LS"),
                ("constraint-relaxation", "l1-relaxation"),
                ("strategy", "l1-merit"),
                ("subproblem", "QP"),
            ],
            // filterSQP
            "filtersqp" => &[
                ("mechanism", "TR"),
                ("constraint-relaxation", "feasibility-restoration"),
                ("strategy", "filter"),
                ("subproblem", "QP"),
            ],
            // IPOPT
            "ipopt" => &[
                ("mechanism", "LS"),
                ("constraint-relaxation", "feasibility-restoration"),
                ("strategy", "filter"),
                ("subproblem", "barrier"),
            ],
            _ => {
                return Err(ConfigurationError::UnknownIngredient {
                    family: "preset",
                    name: name.to_string(),
                })
            }
        };
        for &(key, value) in tuple {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Raw string value of an option.
    pub fn get(&self, key: &str) -> Result<&str, ConfigurationError> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigurationError::UnknownOption(key.to_string()))
    }

    /// Floating-point value of an option.
    pub fn get_f64(&self, key: &str) -> Result<f64, ConfigurationError> {
        let value = self.get(key)?;
        value.parse().map_err(|_| ConfigurationError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Integer value of an option.
    pub fn get_usize(&self, key: &str) -> Result<usize, ConfigurationError> {
        let value = self.get(key)?;
        value.parse().map_err(|_| ConfigurationError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Boolean value of a `yes`/`no` option.
    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigurationError> {
        match self.get(key)? {
            "yes" => Ok(true),
            "no" => Ok(false),
            value => Err(ConfigurationError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Norm value of an option (`L1`, `L2` or `INF`).
    pub fn get_norm(&self, key: &str) -> Result<Norm, ConfigurationError> {
        match self.get(key)? {
            "L1" => Ok(Norm::L1),
            "L2" => Ok(Norm::L2),
            "INF" => Ok(Norm::Inf),
            value => Err(ConfigurationError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_fail_early() {
        let mut options = Options::default();
        assert!(options.set("TR_radius", "5").is_ok());
        assert!(matches!(
            options.set("TR_radis", "5"),
            Err(ConfigurationError::UnknownOption(_))
        ));
    }

    #[test]
    fn typed_accessors_parse_the_defaults() {
        let options = Options::default();
        assert_eq!(options.get_f64("TR_radius").unwrap(), 10.0);
        assert_eq!(options.get_usize("filter_capacity").unwrap(), 50);
        assert!(options.get_bool("scale_functions").unwrap());
        assert_eq!(options.get_norm("residual_norm").unwrap(), Norm::Inf);
        assert_eq!(options.get_f64("time_limit").unwrap(), f64::INFINITY);
    }

    #[test]
    fn invalid_values_are_reported() {
        let mut options = Options::default();
        options.set("TR_radius", "ten").unwrap();
        assert!(matches!(
            options.get_f64("TR_radius"),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn presets_select_consistent_tuples() {
        let mut options = Options::default();
        options.set("preset", "byrd").unwrap();
        assert_eq!(options.get("mechanism").unwrap(), "LS");
        assert_eq!(options.get("constraint-relaxation").unwrap(), "l1-relaxation");
        assert_eq!(options.get("strategy").unwrap(), "l1-merit");

        options.set("preset", "filtersqp").unwrap();
        assert_eq!(options.get("mechanism").unwrap(), "TR");
        assert_eq!(options.get("strategy").unwrap(), "filter");

        options.set("preset", "ipopt").unwrap();
        assert_eq!(options.get("subproblem").unwrap(), "barrier");
        assert!(options.set("preset", "slsqp").is_err());
    }
}

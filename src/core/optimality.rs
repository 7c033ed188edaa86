//! Residuals of the first-order optimality conditions.

use nalgebra::DVector;

use crate::core::error::NumericalError;
use crate::core::iterate::{Iterate, Multipliers};
use crate::core::problem::{Norm, Problem};

/// Complementarity error of the constraints and bounds, optionally shifted
/// (barrier methods measure complementarity against `μ` instead of zero).
pub fn compute_complementarity_error(
    problem: &dyn Problem,
    x: &DVector<f64>,
    constraints: &DVector<f64>,
    multipliers: &Multipliers,
    shift_value: f64,
) -> f64 {
    let mut error = 0.0;
    for j in 0..problem.number_constraints() {
        let multiplier = multipliers.constraints[j];
        let bounds = problem.constraint_bounds(j);
        if multiplier > 0.0 && bounds.lower.is_finite() {
            error += (multiplier * (constraints[j] - bounds.lower) - shift_value).abs();
        } else if multiplier < 0.0 && bounds.upper.is_finite() {
            error += (multiplier * (constraints[j] - bounds.upper) - shift_value).abs();
        }
    }
    for i in 0..problem.number_variables() {
        let bounds = problem.variable_bounds(i);
        if bounds.is_equality() {
            continue;
        }
        let lower_multiplier = multipliers.lower_bounds[i];
        if lower_multiplier > 0.0 && bounds.lower.is_finite() {
            error += (lower_multiplier * (x[i] - bounds.lower) - shift_value).abs();
        }
        let upper_multiplier = multipliers.upper_bounds[i];
        if upper_multiplier < 0.0 && bounds.upper.is_finite() {
            error += (upper_multiplier * (x[i] - bounds.upper) - shift_value).abs();
        }
    }
    error
}

/// Computes the optimality residuals of an iterate: constraint violation,
/// KKT stationarity with the given objective multiplier, stationarity of
/// the pure-feasibility Lagrangian, and complementarity error.
pub fn compute_residuals(
    problem: &dyn Problem,
    iterate: &mut Iterate,
    objective_multiplier: f64,
    residual_norm: Norm,
) -> Result<(), NumericalError> {
    iterate.evaluate_constraints(problem)?;
    let multipliers = iterate.multipliers.clone();

    let constraints = problem.constraint_violation(iterate.constraints(), residual_norm);
    let stationarity_gradient =
        iterate.evaluate_lagrangian_gradient(problem, objective_multiplier, &multipliers)?;
    let stationarity = residual_norm.of(stationarity_gradient.iter().copied());
    let feasibility_gradient =
        iterate.evaluate_lagrangian_gradient(problem, 0.0, &multipliers)?;
    let feasibility_stationarity = residual_norm.of(feasibility_gradient.iter().copied());
    let complementarity = compute_complementarity_error(
        problem,
        &iterate.x,
        iterate.constraints(),
        &multipliers,
        0.0,
    );

    iterate.residuals.constraints = constraints;
    iterate.residuals.stationarity = stationarity;
    iterate.residuals.feasibility_stationarity = feasibility_stationarity;
    iterate.residuals.complementarity = complementarity;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Hs071;

    #[test]
    fn complementarity_vanishes_with_zero_multipliers() {
        let problem = Hs071;
        let x = DVector::from_vec(vec![1.0, 5.0, 5.0, 1.0]);
        let constraints = problem.evaluate_constraints(&x);
        let multipliers = Multipliers::new(4, 2);
        let error = compute_complementarity_error(&problem, &x, &constraints, &multipliers, 0.0);
        assert_eq!(error, 0.0);
    }

    #[test]
    fn residuals_detect_an_infeasible_point() {
        let problem = Hs071;
        // product constraint x1 x2 x3 x4 >= 25 is violated at the lower
        // bound corner
        let mut iterate = Iterate::new(DVector::from_vec(vec![1.0, 1.0, 1.0, 1.0]), 2);
        compute_residuals(&problem, &mut iterate, 1.0, Norm::Inf).unwrap();
        assert!(iterate.residuals.constraints > 1.0);
    }
}

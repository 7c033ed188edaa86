//! Evaluation models of the Lagrangian Hessian.

use log::debug;
use nalgebra::DVector;
use sprs::TriMat;

use crate::core::error::NumericalError;
use crate::core::problem::Problem;
use crate::options::{ConfigurationError, Options};
use crate::solvers::lbl::{DirectSymmetricIndefiniteSolver, LblFactorization};

/// Interface of a Hessian model.
pub trait HessianModel {
    /// Evaluates the (possibly modified) Lagrangian Hessian.
    fn evaluate(
        &mut self,
        problem: &dyn Problem,
        x: &DVector<f64>,
        objective_multiplier: f64,
        constraint_multipliers: &DVector<f64>,
    ) -> Result<TriMat<f64>, NumericalError>;

    /// Number of Hessian evaluations performed so far.
    fn evaluation_count(&self) -> usize;
}

/// Creates a Hessian model from the options map. Without a trust region the
/// model is convexified to guarantee boundedness and a descent direction.
pub fn create_hessian_model(
    options: &Options,
    convexify: bool,
) -> Result<Box<dyn HessianModel>, ConfigurationError> {
    match options.get("hessian_model")? {
        "exact" => {
            if convexify {
                Ok(Box::new(ConvexifiedHessian::new()))
            } else {
                Ok(Box::new(ExactHessian::new()))
            }
        }
        name => Err(ConfigurationError::UnknownIngredient {
            family: "hessian_model",
            name: name.to_string(),
        }),
    }
}

/// The exact Lagrangian Hessian.
#[derive(Default)]
pub struct ExactHessian {
    evaluation_count: usize,
}

impl ExactHessian {
    /// Creates the model.
    pub fn new() -> Self {
        Self::default()
    }
}

impl HessianModel for ExactHessian {
    fn evaluate(
        &mut self,
        problem: &dyn Problem,
        x: &DVector<f64>,
        objective_multiplier: f64,
        constraint_multipliers: &DVector<f64>,
    ) -> Result<TriMat<f64>, NumericalError> {
        let hessian =
            problem.evaluate_lagrangian_hessian(x, objective_multiplier, constraint_multipliers);
        if hessian.triplet_iter().any(|(&value, _)| !value.is_finite()) {
            return Err(NumericalError::NonFinite("the Lagrangian Hessian"));
        }
        self.evaluation_count += 1;
        Ok(hessian)
    }

    fn evaluation_count(&self) -> usize {
        self.evaluation_count
    }
}

/// The exact Hessian, shifted by a multiple of the identity until it has no
/// negative eigenvalue (Nocedal and Wright, p. 51).
pub struct ConvexifiedHessian {
    exact: ExactHessian,
    factorization: LblFactorization,
}

impl Default for ConvexifiedHessian {
    fn default() -> Self {
        Self::new()
    }
}

impl ConvexifiedHessian {
    /// Creates the model.
    pub fn new() -> Self {
        Self {
            exact: ExactHessian::new(),
            factorization: LblFactorization::new(),
        }
    }

    fn modify_inertia(&mut self, mut hessian: TriMat<f64>) -> Result<TriMat<f64>, NumericalError> {
        const BETA: f64 = 1e-4;
        let dimension = hessian.rows();

        let mut smallest_diagonal_entry = f64::INFINITY;
        for i in 0..dimension {
            let diagonal: f64 = hessian
                .triplet_iter()
                .filter(|&(_, (row, column))| row == i && column == i)
                .map(|(&value, _)| value)
                .sum();
            smallest_diagonal_entry = smallest_diagonal_entry.min(diagonal);
        }
        debug!(
            "smallest diagonal entry of the Hessian: {:e}",
            smallest_diagonal_entry
        );

        let mut inertia_term = if smallest_diagonal_entry <= 0.0 {
            BETA - smallest_diagonal_entry
        } else {
            0.0
        };
        if inertia_term > 0.0 {
            for i in 0..dimension {
                hessian.add_triplet(i, i, inertia_term);
            }
        }

        loop {
            self.factorization.factorize(&hessian)?;
            if !self.factorization.matrix_is_singular()
                && self.factorization.number_negative_eigenvalues() == 0
            {
                debug!("Hessian convexified with inertia term {:e}", inertia_term);
                return Ok(hessian);
            }
            let previous_inertia_term = inertia_term;
            inertia_term = if inertia_term == 0.0 {
                BETA
            } else {
                2.0 * inertia_term
            };
            if inertia_term > 1e40 {
                return Err(NumericalError::Factorization("convexified Hessian"));
            }
            for i in 0..dimension {
                hessian.add_triplet(i, i, inertia_term - previous_inertia_term);
            }
        }
    }
}

impl HessianModel for ConvexifiedHessian {
    fn evaluate(
        &mut self,
        problem: &dyn Problem,
        x: &DVector<f64>,
        objective_multiplier: f64,
        constraint_multipliers: &DVector<f64>,
    ) -> Result<TriMat<f64>, NumericalError> {
        let hessian = self
            .exact
            .evaluate(problem, x, objective_multiplier, constraint_multipliers)?;
        self.modify_inertia(hessian)
    }

    fn evaluation_count(&self) -> usize {
        self.exact.evaluation_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Rosenbrock;

    #[test]
    fn exact_hessian_counts_evaluations() {
        let problem = Rosenbrock;
        let mut model = ExactHessian::new();
        let x = DVector::from_vec(vec![-1.2, 1.0]);
        let multipliers = DVector::zeros(0);
        model.evaluate(&problem, &x, 1.0, &multipliers).unwrap();
        model.evaluate(&problem, &x, 1.0, &multipliers).unwrap();
        assert_eq!(model.evaluation_count(), 2);
    }

    #[test]
    fn convexified_hessian_has_no_negative_eigenvalue() {
        let problem = Rosenbrock;
        let mut model = ConvexifiedHessian::new();
        // saddle region of the Rosenbrock function
        let x = DVector::from_vec(vec![0.0, 1.0]);
        let multipliers = DVector::zeros(0);
        let hessian = model.evaluate(&problem, &x, 1.0, &multipliers).unwrap();

        let mut factorization = LblFactorization::new();
        factorization.factorize(&hessian).unwrap();
        assert_eq!(factorization.number_negative_eigenvalues(), 0);
        assert!(!factorization.matrix_is_singular());
    }
}

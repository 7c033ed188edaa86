//! Boundaries to the numerical solvers and their built-in implementations.

pub mod interior_qp;
pub mod lbl;

use crate::options::ConfigurationError;
use crate::solvers::interior_qp::{InteriorQpSolver, QpSolver};

/// Creates a QP/LP solver by name.
pub fn create_qp_solver(name: &str) -> Result<Box<dyn QpSolver>, ConfigurationError> {
    match name {
        "IPM" => Ok(Box::new(InteriorQpSolver::new())),
        name => Err(ConfigurationError::UnknownIngredient {
            family: "QP solver",
            name: name.to_string(),
        }),
    }
}

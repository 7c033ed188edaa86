//! Errors shared by the solver ingredients.

use thiserror::Error;

/// A numerical failure during function evaluation or linear algebra.
///
/// These errors are recoverable: the globalization mechanism responds by
/// shrinking the trust-region radius or the step length. They never
/// propagate out of the driver.
#[derive(Debug, Clone, Error)]
pub enum NumericalError {
    /// An evaluation produced a NaN or infinite value.
    #[error("{0} produced a non-finite value")]
    NonFinite(&'static str),
    /// A matrix factorization broke down.
    #[error("the factorization of the {0} matrix failed")]
    Factorization(&'static str),
    /// The subproblem solver failed to produce a usable direction.
    #[error("the subproblem solver did not converge")]
    SubproblemFailure,
}

/// Checks that all values are finite, mapping failures to [`NumericalError`].
pub fn check_finite(
    values: impl IntoIterator<Item = f64>,
    what: &'static str,
) -> Result<(), NumericalError> {
    if values.into_iter().all(f64::is_finite) {
        Ok(())
    } else {
        Err(NumericalError::NonFinite(what))
    }
}

//! Preprocessing of the initial iterate.

use log::{debug, warn};
use nalgebra::DVector;
use sprs::TriMat;

use crate::core::error::NumericalError;
use crate::core::iterate::Iterate;
use crate::core::problem::{FunctionType, Problem, Range};
use crate::solvers::interior_qp::{InteriorQpSolver, QpSolver, QuadraticProgram};

/// Projects the first iterate onto the polytope of the linear constraints
/// by solving one least-displacement QP restricted to the linear rows:
///
/// ```text
/// minimize 1/2 ||d||^2
/// subject to  c_L - c(x) <= A d <= c_U - c(x)  (linear rows only)
///             x_L - x <= d <= x_U - x
/// ```
pub fn enforce_linear_constraints(
    problem: &dyn Problem,
    first_iterate: &mut Iterate,
) -> Result<(), NumericalError> {
    let n = problem.number_variables();
    let m = problem.number_constraints();
    let linear_constraints: Vec<usize> = (0..m)
        .filter(|&j| problem.constraint_type(j) == FunctionType::Linear)
        .collect();
    if linear_constraints.is_empty() {
        return Ok(());
    }
    debug!(
        "projecting the initial point onto {} linear constraints",
        linear_constraints.len()
    );

    first_iterate.evaluate_constraints(problem)?;
    first_iterate.evaluate_constraint_jacobian(problem)?;

    // identity Hessian: least-displacement projection
    let mut hessian = TriMat::new((n, n));
    for i in 0..n {
        hessian.add_triplet(i, i, 1.0);
    }
    let gradient = DVector::zeros(n);

    let mut jacobian = TriMat::new((linear_constraints.len(), n));
    let mut constraint_bounds = Vec::with_capacity(linear_constraints.len());
    for (row, &j) in linear_constraints.iter().enumerate() {
        if let Some(jacobian_row) = first_iterate.constraint_jacobian().outer_view(j) {
            for (i, &value) in jacobian_row.iter() {
                jacobian.add_triplet(row, i, value);
            }
        }
        let bounds = problem.constraint_bounds(j);
        constraint_bounds.push(Range::new(
            bounds.lower - first_iterate.constraints()[j],
            bounds.upper - first_iterate.constraints()[j],
        ));
    }
    let variable_bounds: Vec<Range> = (0..n)
        .map(|i| {
            let bounds = problem.variable_bounds(i);
            Range::new(
                bounds.lower - first_iterate.x[i],
                bounds.upper - first_iterate.x[i],
            )
        })
        .collect();
    let initial_point = DVector::zeros(n);
    let jacobian = jacobian.to_csr::<usize>();

    let qp = QuadraticProgram {
        gradient: &gradient,
        hessian: Some(&hessian),
        jacobian: &jacobian,
        variable_bounds: &variable_bounds,
        constraint_bounds: &constraint_bounds,
        initial_point: &initial_point,
    };
    let mut solver = InteriorQpSolver::new();
    match solver.solve_qp(&qp) {
        Ok(solution) => {
            let x = first_iterate.x.clone() + solution.primals;
            first_iterate.set_primals(x);
            debug!("initial point moved onto the linear constraints");
            Ok(())
        }
        Err(error) => {
            // an infeasible polytope is a problem property, not a solver
            // failure: keep the original point
            warn!("projection onto the linear constraints failed: {}", error);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::LinearlyConstrainedProblem;

    #[test]
    fn initial_point_becomes_linearly_feasible() {
        let problem = LinearlyConstrainedProblem;
        // start far outside the polytope x1 + x2 <= 1, x1 - x2 >= -1
        let mut iterate = Iterate::new(DVector::from_vec(vec![2.0, 3.0]), 2);
        enforce_linear_constraints(&problem, &mut iterate).unwrap();

        iterate.evaluate_constraints(&problem).unwrap();
        for j in 0..2 {
            let bounds = problem.constraint_bounds(j);
            assert!(bounds.violation(iterate.constraints()[j]) <= 1e-6);
        }
    }
}

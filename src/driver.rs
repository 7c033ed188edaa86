//! High-level driver for the optimization process.
//!
//! The [`Uno`] driver owns a globalization mechanism (which transitively
//! owns the constraint relaxation strategy, the subproblem and the
//! globalization strategies) and runs the outer loop: ask the mechanism for
//! an accepted iterate, classify termination, repeat.

use std::fmt;
use std::time::Instant;

use log::{debug, info, warn};

use crate::core::iterate::{Iterate, ProgressMeasures};
use crate::core::optimality::compute_residuals;
use crate::core::problem::{Norm, Problem};
use crate::mechanism::{create_mechanism, GlobalizationMechanism};
use crate::options::{ConfigurationError, Options};
use crate::preprocessing;
use crate::scaling::Scaling;

/// Terminal classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationStatus {
    /// Feasible stationary point with vanishing complementarity error.
    KktPoint,
    /// Infeasible stationary point of the feasibility measure.
    FjPoint,
    /// The step vanished at a feasible point.
    FeasibleSmallStep,
    /// The step vanished at an infeasible point.
    InfeasibleSmallStep,
    /// The iteration limit was reached.
    MaxIterationsReached,
    /// The wall-clock limit was reached.
    Timeout,
    /// No termination test triggered.
    NotOptimal,
}

impl fmt::Display for TerminationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            TerminationStatus::KktPoint => "converged with KKT point",
            TerminationStatus::FjPoint => "converged with FJ point (infeasible stationary point)",
            TerminationStatus::FeasibleSmallStep => "terminated with feasible small step",
            TerminationStatus::InfeasibleSmallStep => "terminated with infeasible small step",
            TerminationStatus::MaxIterationsReached => "reached the iteration limit",
            TerminationStatus::Timeout => "reached the time limit",
            TerminationStatus::NotOptimal => "not optimal",
        };
        f.write_str(description)
    }
}

#[derive(Debug, Clone, Copy)]
struct Tolerances {
    optimality: f64,
    feasibility: f64,
    complementarity: f64,
    small_step: f64,
}

/// Outcome of a [`Uno::solve`] run.
pub struct UnoResult {
    /// Final primal-dual iterate.
    pub solution: Iterate,
    /// Terminal status.
    pub status: TerminationStatus,
    /// Number of outer iterations.
    pub iterations: usize,
    /// Objective value at the solution (on the problem handed to the
    /// driver, which may be scaled).
    pub objective: f64,
    /// Wall-clock seconds spent in the solve.
    pub cpu_time: f64,
    /// Progress measures of the accepted iterates, in order.
    pub history: Vec<ProgressMeasures>,
    postsolved: bool,
}

impl UnoResult {
    /// Whether the result has already been postsolved.
    pub fn is_postsolved(&self) -> bool {
        self.postsolved
    }

    /// Reports the outcome through the logging facade.
    pub fn print(&self, print_solution: bool) {
        info!(
            "{} after {} iterations ({:.3} s), objective {:.8e}",
            self.status, self.iterations, self.cpu_time, self.objective
        );
        if print_solution {
            info!("primal solution: {:?}", self.solution.x.as_slice());
            info!(
                "constraint multipliers: {:?}",
                self.solution.multipliers.constraints.as_slice()
            );
        }
    }
}

/// Unscales a result computed on a [`ScaledProblem`](crate::scaling::ScaledProblem).
/// Calling it twice is a no-op.
pub fn postsolve_solution(result: &mut UnoResult, scaling: &Scaling) {
    if result.postsolved {
        return;
    }
    result.objective /= scaling.objective();
    for j in 0..result.solution.multipliers.constraints.len() {
        result.solution.multipliers.constraints[j] *=
            scaling.constraint(j) / scaling.objective();
    }
    result.solution.multipliers.lower_bounds /= scaling.objective();
    result.solution.multipliers.upper_bounds /= scaling.objective();
    result.postsolved = true;
}

/// The solver driver.
pub struct Uno {
    mechanism: Box<dyn GlobalizationMechanism>,
    max_iterations: usize,
    time_limit: f64,
    tolerances: Tolerances,
    residual_norm: Norm,
}

impl Uno {
    /// Builds the whole ingredient stack from the options map.
    pub fn from_options(
        problem: &dyn Problem,
        options: &Options,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            mechanism: create_mechanism(problem, options)?,
            max_iterations: options.get_usize("max_iterations")?,
            time_limit: options.get_f64("time_limit")?,
            tolerances: Tolerances {
                optimality: options.get_f64("optimality_tolerance")?,
                feasibility: options.get_f64("feasibility_tolerance")?,
                complementarity: options.get_f64("complementarity_tolerance")?,
                small_step: options.get_f64("small_step_threshold")?,
            },
            residual_norm: options.get_norm("residual_norm")?,
        })
    }

    /// Solves the problem starting from the first iterate.
    ///
    /// When `enforce_linear_constraints` is set, the first iterate is
    /// projected onto the polytope of the linear constraints before the
    /// iteration starts.
    pub fn solve(
        &mut self,
        problem: &dyn Problem,
        mut first_iterate: Iterate,
        enforce_linear_constraints: bool,
    ) -> UnoResult {
        let start_time = Instant::now();

        // committed iterates satisfy the variable bounds
        let mut x = first_iterate.x.clone();
        if problem.project_point_in_bounds(&mut x) {
            first_iterate.set_primals(x);
        }
        if enforce_linear_constraints {
            if let Err(error) = preprocessing::enforce_linear_constraints(problem, &mut first_iterate)
            {
                warn!("linear-constraint preamble failed: {}", error);
            }
        }

        let mut history = Vec::new();

        if problem.number_variables() == 0 {
            // nothing to optimize
            let _ = compute_residuals(
                problem,
                &mut first_iterate,
                problem.objective_sign(),
                self.residual_norm,
            );
            let status = self.check_termination(&first_iterate, 0.0);
            return self.assemble_result(problem, first_iterate, status, 0, history, start_time);
        }

        let mut status = TerminationStatus::NotOptimal;
        if let Err(error) = self.mechanism.initialize(problem, &mut first_iterate) {
            warn!("initialization failed: {}", error);
            return self.assemble_result(problem, first_iterate, status, 0, history, start_time);
        }

        let mut current_iterate = first_iterate;
        let mut iterations = 0;
        loop {
            if iterations >= self.max_iterations {
                status = TerminationStatus::MaxIterationsReached;
                break;
            }
            if start_time.elapsed().as_secs_f64() > self.time_limit {
                status = TerminationStatus::Timeout;
                break;
            }
            iterations += 1;
            debug!("outer iteration {}", iterations);

            match self
                .mechanism
                .compute_acceptable_iterate(problem, &mut current_iterate)
            {
                Ok((trial_iterate, step_norm)) => {
                    current_iterate = trial_iterate;
                    history.push(current_iterate.progress);
                    status = self.check_termination(&current_iterate, step_norm);
                    if status != TerminationStatus::NotOptimal {
                        break;
                    }
                }
                Err(error) => {
                    warn!("{}", error);
                    status = TerminationStatus::NotOptimal;
                    break;
                }
            }
        }
        self.assemble_result(problem, current_iterate, status, iterations, history, start_time)
    }

    fn assemble_result(
        &self,
        problem: &dyn Problem,
        mut solution: Iterate,
        status: TerminationStatus,
        iterations: usize,
        history: Vec<ProgressMeasures>,
        start_time: Instant,
    ) -> UnoResult {
        let objective = solution
            .evaluate_objective(problem)
            .unwrap_or(f64::NAN);
        info!("{} after {} iterations", status, iterations);
        UnoResult {
            solution,
            status,
            iterations,
            objective,
            cpu_time: start_time.elapsed().as_secs_f64(),
            history,
            postsolved: false,
        }
    }

    // classification in the order of decreasing strength
    fn check_termination(&self, iterate: &Iterate, step_norm: f64) -> TerminationStatus {
        let residuals = &iterate.residuals;
        let feasible = residuals.constraints <= self.tolerances.feasibility;
        if residuals.stationarity <= self.tolerances.optimality
            && feasible
            && residuals.complementarity <= self.tolerances.complementarity
        {
            TerminationStatus::KktPoint
        } else if residuals.feasibility_stationarity <= self.tolerances.optimality
            && !feasible
            && iterate.multipliers.norm_inf() > self.tolerances.optimality
        {
            TerminationStatus::FjPoint
        } else if step_norm <= self.tolerances.small_step {
            if feasible {
                TerminationStatus::FeasibleSmallStep
            } else {
                TerminationStatus::InfeasibleSmallStep
            }
        } else {
            TerminationStatus::NotOptimal
        }
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;
    use nalgebra::DVector;
    use sprs::{CsMat, TriMat};

    use super::*;
    use crate::core::problem::Range;
    use crate::scaling::{Scaling, ScaledProblem};
    use crate::testing::{
        Hs015, Hs071, InfeasibleLp, LinearlyConstrainedProblem, NarrowStrip, Rosenbrock,
        SteepProblem,
    };

    fn options_with(settings: &[(&str, &str)]) -> Options {
        let mut options = Options::default();
        for &(key, value) in settings {
            options.set(key, value).unwrap();
        }
        options
    }

    fn solve(
        problem: &dyn Problem,
        options: &Options,
        initial_point: Vec<f64>,
        enforce_linear_constraints: bool,
    ) -> UnoResult {
        let mut uno = Uno::from_options(problem, options).unwrap();
        let first_iterate = Iterate::new(
            DVector::from_vec(initial_point),
            problem.number_constraints(),
        );
        uno.solve(problem, first_iterate, enforce_linear_constraints)
    }

    #[test]
    fn hs071_with_the_filtersqp_preset() {
        let options = options_with(&[("preset", "filtersqp"), ("max_iterations", "500")]);
        let result = solve(&Hs071, &options, vec![1.0, 5.0, 5.0, 1.0], false);

        assert_eq!(result.status, TerminationStatus::KktPoint);
        assert_approx_eq!(f64, result.objective, 17.014_017, epsilon = 1e-4);
        let expected = [1.0, 4.743, 3.821, 1.379];
        for (i, &value) in expected.iter().enumerate() {
            assert_approx_eq!(f64, result.solution.x[i], value, epsilon = 1e-3);
        }
        // committed iterates satisfy the bounds
        for i in 0..4 {
            assert!((1.0 - 1e-8..=5.0 + 1e-8).contains(&result.solution.x[i]));
        }
    }

    #[test]
    fn hs071_with_the_byrd_preset() {
        let options = options_with(&[("preset", "byrd"), ("max_iterations", "500")]);
        let result = solve(&Hs071, &options, vec![1.0, 5.0, 5.0, 1.0], false);

        assert_eq!(result.status, TerminationStatus::KktPoint);
        assert_approx_eq!(f64, result.objective, 17.014_017, epsilon = 1e-4);
    }

    #[test]
    fn hs071_with_the_ipopt_preset() {
        let options = options_with(&[
            ("preset", "ipopt"),
            ("max_iterations", "500"),
            ("optimality_tolerance", "1e-6"),
            ("feasibility_tolerance", "1e-6"),
            ("complementarity_tolerance", "1e-5"),
        ]);
        let result = solve(&Hs071, &options, vec![1.0, 5.0, 5.0, 1.0], false);

        assert!(matches!(
            result.status,
            TerminationStatus::KktPoint | TerminationStatus::FeasibleSmallStep
        ));
        assert_approx_eq!(f64, result.objective, 17.014_017, epsilon = 1e-3);
        assert!(result.solution.residuals.constraints <= 1e-6);
    }

    #[test]
    fn unconstrained_rosenbrock_with_a_trust_region() {
        let options = options_with(&[("preset", "filtersqp"), ("max_iterations", "500")]);
        let result = solve(&Rosenbrock, &options, vec![-1.2, 1.0], false);

        assert_eq!(result.status, TerminationStatus::KktPoint);
        assert!(result.objective <= 1e-6);
        assert_approx_eq!(f64, result.solution.x[0], 1.0, epsilon = 1e-4);
        assert_approx_eq!(f64, result.solution.x[1], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn unconstrained_rosenbrock_with_a_line_search() {
        let options = options_with(&[("preset", "byrd"), ("max_iterations", "500")]);
        let result = solve(&Rosenbrock, &options, vec![-1.2, 1.0], false);

        assert_eq!(result.status, TerminationStatus::KktPoint);
        assert!(result.objective <= 1e-6);
    }

    #[test]
    fn hs015_with_the_filtersqp_preset() {
        let options = options_with(&[("preset", "filtersqp"), ("max_iterations", "500")]);
        let result = solve(&Hs015, &options, vec![-2.0, 1.0], false);

        assert_eq!(result.status, TerminationStatus::KktPoint);
        assert_approx_eq!(f64, result.objective, 306.5, epsilon = 1e-4);
        assert_approx_eq!(f64, result.solution.x[0], 0.5, epsilon = 1e-4);
        assert_approx_eq!(f64, result.solution.x[1], 2.0, epsilon = 1e-4);
    }

    #[test]
    fn infeasible_lp_terminates_at_a_minimum_violation_point() {
        let options = options_with(&[
            ("mechanism", "TR"),
            ("constraint-relaxation", "l1-relaxation"),
            ("strategy", "l1-merit"),
            ("subproblem", "QP"),
            ("max_iterations", "200"),
        ]);
        let result = solve(&InfeasibleLp, &options, vec![0.5], false);

        // the minimum-l1-violation set is [0, 1]; whether the run stops as
        // an FJ point or as an infeasible small step depends on where on
        // the flat face it lands
        assert!(matches!(
            result.status,
            TerminationStatus::FjPoint | TerminationStatus::InfeasibleSmallStep
        ));
        assert!((-1e-6..=1.0 + 1e-6).contains(&result.solution.x[0]));
        // the violation of the two constraints cannot drop below 1 in total
        assert!(result.solution.residuals.constraints >= 0.5 - 1e-6);
        assert!(result.solution.residuals.constraints <= 1.0 + 1e-6);
    }

    #[test]
    fn linear_constraint_preamble_yields_a_linearly_feasible_start() {
        let options = options_with(&[("preset", "filtersqp"), ("max_iterations", "200")]);
        let result = solve(&LinearlyConstrainedProblem, &options, vec![2.0, 3.0], true);

        assert_eq!(result.status, TerminationStatus::KktPoint);
        assert!(result.solution.x[0].abs() <= 1e-5);
        assert!(result.solution.x[1].abs() <= 1e-5);
    }

    #[test]
    fn filter_and_merit_strategies_take_different_paths() {
        let base = [
            ("mechanism", "TR"),
            ("constraint-relaxation", "feasibility-restoration"),
            ("subproblem", "QP"),
            ("max_iterations", "500"),
        ];
        let mut filter_settings = base.to_vec();
        filter_settings.push(("strategy", "filter"));
        let mut merit_settings = base.to_vec();
        merit_settings.push(("strategy", "l1-merit"));
        let filter_options = options_with(&filter_settings);
        let merit_options = options_with(&merit_settings);

        let filter_result = solve(&NarrowStrip, &filter_options, vec![2.0, -2.0], false);
        let merit_result = solve(&NarrowStrip, &merit_options, vec![2.0, -2.0], false);

        assert_eq!(filter_result.status, TerminationStatus::KktPoint);
        assert_eq!(merit_result.status, TerminationStatus::KktPoint);
        // the acceptance histories must differ: the filter rejects steps
        // the merit function would take (and vice versa)
        assert!(
            filter_result.history != merit_result.history,
            "filter and merit produced identical histories"
        );
    }

    #[test]
    fn repeated_solves_are_deterministic() {
        let options = options_with(&[("preset", "filtersqp"), ("max_iterations", "500")]);
        let first = solve(&Hs015, &options, vec![-2.0, 1.0], false);
        let second = solve(&Hs015, &options, vec![-2.0, 1.0], false);

        assert_eq!(first.status, second.status);
        assert_eq!(first.iterations, second.iterations);
        assert_eq!(first.solution.x, second.solution.x);
        assert_eq!(first.history, second.history);
    }

    #[test]
    fn scaled_solve_unscales_to_a_feasible_point() {
        let problem = SteepProblem;
        let mut first_iterate = Iterate::new(DVector::from_vec(vec![1.0]), 1);
        let threshold = Options::default().get_f64("scaling_threshold").unwrap();
        let scaling = Scaling::compute(&problem, &mut first_iterate, threshold).unwrap();
        let scaled_problem = ScaledProblem::new(&problem, scaling.clone());

        let options = options_with(&[("preset", "filtersqp"), ("max_iterations", "200")]);
        let mut uno = Uno::from_options(&scaled_problem, &options).unwrap();
        let mut result = uno.solve(&scaled_problem, first_iterate, false);
        assert_eq!(result.status, TerminationStatus::KktPoint);

        postsolve_solution(&mut result, &scaling);
        assert!(result.is_postsolved());
        // the unscaled solution is feasible for the original problem
        let constraints = problem.evaluate_constraints(&result.solution.x);
        assert!(problem.constraint_violation(&constraints, Norm::Inf) <= 1e-6);
        assert_approx_eq!(
            f64,
            result.objective,
            problem.evaluate_objective(&result.solution.x),
            epsilon = 1e-8
        );

        // postsolving again changes nothing
        let objective = result.objective;
        let multipliers = result.solution.multipliers.constraints.clone();
        postsolve_solution(&mut result, &scaling);
        assert_eq!(result.objective, objective);
        assert_eq!(result.solution.multipliers.constraints, multipliers);
    }

    #[test]
    fn iteration_limit_is_reported() {
        let options = options_with(&[("preset", "filtersqp"), ("max_iterations", "1")]);
        let result = solve(&Rosenbrock, &options, vec![-1.2, 1.0], false);
        assert_eq!(result.status, TerminationStatus::MaxIterationsReached);
        assert_eq!(result.iterations, 1);
    }

    #[test]
    fn time_limit_is_reported() {
        let options = options_with(&[("preset", "filtersqp"), ("time_limit", "0")]);
        let result = solve(&Rosenbrock, &options, vec![-1.2, 1.0], false);
        assert_eq!(result.status, TerminationStatus::Timeout);
        assert_eq!(result.iterations, 0);
    }

    struct EmptyProblem;

    impl Problem for EmptyProblem {
        fn number_variables(&self) -> usize {
            0
        }

        fn number_constraints(&self) -> usize {
            0
        }

        fn variable_bounds(&self, _variable_index: usize) -> Range {
            Range::unbounded()
        }

        fn constraint_bounds(&self, _constraint_index: usize) -> Range {
            Range::unbounded()
        }

        fn evaluate_objective(&self, _x: &DVector<f64>) -> f64 {
            0.0
        }

        fn evaluate_objective_gradient(&self, _x: &DVector<f64>) -> DVector<f64> {
            DVector::zeros(0)
        }

        fn evaluate_constraints(&self, _x: &DVector<f64>) -> DVector<f64> {
            DVector::zeros(0)
        }

        fn evaluate_constraint_jacobian(&self, _x: &DVector<f64>) -> CsMat<f64> {
            CsMat::zero((0, 0))
        }

        fn evaluate_lagrangian_hessian(
            &self,
            _x: &DVector<f64>,
            _objective_multiplier: f64,
            _constraint_multipliers: &DVector<f64>,
        ) -> TriMat<f64> {
            TriMat::new((0, 0))
        }
    }

    #[test]
    fn empty_problem_returns_immediately() {
        let options = Options::default();
        let result = solve(&EmptyProblem, &options, vec![], false);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.status, TerminationStatus::KktPoint);
    }
}

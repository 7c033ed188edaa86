//! Linear subproblem used by sequential linear programming solvers.

use log::debug;
use nalgebra::DVector;

use crate::core::direction::{ConstraintPartition, Direction, SubproblemStatus};
use crate::core::error::NumericalError;
use crate::core::iterate::Iterate;
use crate::core::problem::Problem;
use crate::options::{ConfigurationError, Options};
use crate::solvers::create_qp_solver;
use crate::solvers::interior_qp::{QpSolver, QuadraticProgram};
use crate::subproblem::{
    compute_dual_displacements, ElasticVariables, PredictedReductionModel, Subproblem,
    SubproblemModel,
};

/// Linear model `σ ∇f(x)ᵀd` of the objective subject to the linearized
/// constraints. Only meaningful inside a trust region, which bounds the
/// model.
pub struct LPSubproblem {
    model: SubproblemModel,
    solver: Box<dyn QpSolver>,
    last_gradient: DVector<f64>,
}

impl LPSubproblem {
    /// Creates the subproblem from the options map.
    pub fn new(problem: &dyn Problem, options: &Options) -> Result<Self, ConfigurationError> {
        Ok(Self {
            model: SubproblemModel::new(
                problem,
                options.get_norm("progress_norm")?,
                options.get_f64("activity_tolerance")?,
            ),
            solver: create_qp_solver(options.get("LP_solver")?)?,
            last_gradient: DVector::zeros(problem.number_variables()),
        })
    }
}

impl Subproblem for LPSubproblem {
    fn initialize(
        &mut self,
        problem: &dyn Problem,
        first_iterate: &mut Iterate,
    ) -> Result<(), NumericalError> {
        self.model.compute_progress_measures(problem, first_iterate)
    }

    fn build_current_subproblem(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        objective_multiplier: f64,
        trust_region_radius: f64,
    ) -> Result<(), NumericalError> {
        self.model
            .build(problem, current_iterate, objective_multiplier, trust_region_radius)
    }

    fn build_objective_model(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        objective_multiplier: f64,
    ) -> Result<(), NumericalError> {
        self.model
            .rebuild_objective(problem, current_iterate, objective_multiplier)
    }

    fn build_feasibility_problem(
        &mut self,
        _problem: &dyn Problem,
        _current_iterate: &mut Iterate,
        partition: &ConstraintPartition,
    ) -> Result<(), NumericalError> {
        self.model.build_feasibility_objective(partition);
        Ok(())
    }

    fn add_elastic_variables(&mut self, elastics: &ElasticVariables, objective_coefficient: f64) {
        self.model.add_elastics(elastics, objective_coefficient);
    }

    fn remove_elastic_variables(&mut self) {
        self.model.remove_elastics();
    }

    fn set_initial_point(&mut self, point: &DVector<f64>) {
        self.model.initial_point = point.clone();
    }

    fn solve(
        &mut self,
        _problem: &dyn Problem,
        current_iterate: &mut Iterate,
    ) -> Result<Direction, NumericalError> {
        let gradient = self.model.assemble_gradient();
        let jacobian = self.model.assemble_jacobian();
        let variable_bounds = self.model.assemble_variable_bounds();
        let initial_point = self.model.assemble_initial_point();

        let lp = QuadraticProgram {
            gradient: &gradient,
            hessian: None,
            jacobian: &jacobian,
            variable_bounds: &variable_bounds,
            constraint_bounds: &self.model.constraint_bounds,
            initial_point: &initial_point,
        };
        let solution = self.solver.solve_lp(&lp)?;
        if solution.status == SubproblemStatus::Error {
            return Err(NumericalError::SubproblemFailure);
        }

        let n = self.model.number_problem_variables;
        let norm = if n > 0 {
            solution.primals.rows(0, n).amax()
        } else {
            0.0
        };
        let multipliers = compute_dual_displacements(
            current_iterate,
            &solution.constraint_multipliers,
            &solution.lower_bound_multipliers,
            &solution.upper_bound_multipliers,
        );
        let active_set = self.model.determine_active_set(&solution.primals);
        self.last_gradient = gradient;

        let direction = Direction {
            norm,
            objective: solution.objective,
            objective_multiplier: self.model.objective_multiplier,
            status: solution.status,
            active_set,
            constraint_partition: solution.constraint_partition,
            max_primal_step_length: 1.0,
            primals: solution.primals,
            multipliers,
        };
        debug!("LP {}", direction);
        Ok(direction)
    }

    fn generate_predicted_reduction_model(&self, direction: &Direction) -> PredictedReductionModel {
        // the model is linear: the reduction scales with the step length
        let full_reduction = -direction.objective;
        PredictedReductionModel::new(
            full_reduction,
            Box::new(move |step_length| step_length * full_reduction),
        )
    }

    fn compute_progress_measures(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<(), NumericalError> {
        self.model.compute_progress_measures(problem, iterate)
    }

    fn progress_norm(&self) -> crate::core::problem::Norm {
        self.model.progress_norm
    }
}

//! Quadratic subproblem solved by an external QP solver.

use log::debug;
use nalgebra::DVector;
use sprs::TriMat;

use crate::core::direction::{ConstraintPartition, Direction, SubproblemStatus};
use crate::core::error::NumericalError;
use crate::core::iterate::Iterate;
use crate::core::problem::{Problem, Range};
use crate::options::{ConfigurationError, Options};
use crate::solvers::create_qp_solver;
use crate::solvers::interior_qp::{QpSolver, QuadraticProgram};
use crate::subproblem::hessian_model::{create_hessian_model, HessianModel};
use crate::subproblem::{
    compute_dual_displacements, ElasticVariables, PredictedReductionModel, Subproblem,
    SubproblemModel,
};

/// Quadratic model `σ ∇f(x)ᵀd + 1/2 dᵀHd` of the objective subject to the
/// linearized constraints, solved by an active-set style QP solver.
pub struct QPSubproblem {
    model: SubproblemModel,
    hessian_model: Box<dyn HessianModel>,
    solver: Box<dyn QpSolver>,
    proximal_coefficient: f64,
    proximal_weights: Option<DVector<f64>>,
    last_hessian: Option<TriMat<f64>>,
    last_gradient: DVector<f64>,
}

impl QPSubproblem {
    /// Creates the subproblem from the options map.
    pub fn new(problem: &dyn Problem, options: &Options) -> Result<Self, ConfigurationError> {
        // without a trust region the model must be convexified to guarantee
        // boundedness and a descent direction
        let convexify = options.get("mechanism")? != "TR";
        Ok(Self {
            model: SubproblemModel::new(
                problem,
                options.get_norm("progress_norm")?,
                options.get_f64("activity_tolerance")?,
            ),
            hessian_model: create_hessian_model(options, convexify)?,
            solver: create_qp_solver(options.get("QP_solver")?)?,
            proximal_coefficient: options.get_f64("proximal_coefficient")?,
            proximal_weights: None,
            last_hessian: None,
            last_gradient: DVector::zeros(problem.number_variables()),
        })
    }

    fn evaluate_hessian(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &Iterate,
    ) -> Result<TriMat<f64>, NumericalError> {
        let n = self.model.number_problem_variables;
        let x = current_iterate.x.rows(0, n).into_owned();
        let mut hessian = self.hessian_model.evaluate(
            problem,
            &x,
            self.model.objective_multiplier,
            &current_iterate.multipliers.constraints,
        )?;
        if let Some(weights) = &self.proximal_weights {
            for i in 0..n {
                hessian.add_triplet(i, i, self.proximal_coefficient * weights[i]);
            }
        }
        Ok(hessian)
    }

    fn solve_assembled(
        &mut self,
        current_iterate: &Iterate,
        hessian: TriMat<f64>,
        constraint_bounds: &[Range],
    ) -> Result<Direction, NumericalError> {
        let gradient = self.model.assemble_gradient();
        let jacobian = self.model.assemble_jacobian();
        let variable_bounds = self.model.assemble_variable_bounds();
        let initial_point = self.model.assemble_initial_point();

        let qp = QuadraticProgram {
            gradient: &gradient,
            hessian: Some(&hessian),
            jacobian: &jacobian,
            variable_bounds: &variable_bounds,
            constraint_bounds,
            initial_point: &initial_point,
        };
        let solution = self.solver.solve_qp(&qp)?;
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
        self.last_hessian = Some(hessian);

        Ok(Direction {
            norm,
            objective: solution.objective,
            objective_multiplier: self.model.objective_multiplier,
            status: solution.status,
            active_set,
            constraint_partition: solution.constraint_partition,
            max_primal_step_length: 1.0,
            primals: solution.primals,
            multipliers,
        })
    }
}

impl Subproblem for QPSubproblem {
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
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
    ) -> Result<Direction, NumericalError> {
        let hessian = self.evaluate_hessian(problem, current_iterate)?;
        let constraint_bounds = self.model.constraint_bounds.clone();
        let direction = self.solve_assembled(current_iterate, hessian, &constraint_bounds)?;
        debug!("QP {}", direction);
        Ok(direction)
    }

    fn compute_second_order_correction(
        &mut self,
        problem: &dyn Problem,
        trial_iterate: &mut Iterate,
        direction: &Direction,
    ) -> Result<Option<Direction>, NumericalError> {
        // repair the linearized-constraint error with the constraint values
        // at the rejected trial point
        trial_iterate.evaluate_constraints(problem)?;
        let mut corrected_bounds = Vec::with_capacity(self.model.number_constraints);
        for j in 0..self.model.number_constraints {
            let bounds = problem.constraint_bounds(j);
            let trial_value = trial_iterate.constraints()[j];
            corrected_bounds.push(Range::new(
                bounds.lower - trial_value,
                bounds.upper - trial_value,
            ));
        }
        self.model.initial_point = direction
            .primals
            .rows(0, self.model.number_problem_variables)
            .into_owned();

        let hessian = match &self.last_hessian {
            Some(hessian) => TriMat::from_triplets(
                hessian.shape(),
                hessian.row_inds().to_vec(),
                hessian.col_inds().to_vec(),
                hessian.data().to_vec(),
            ),
            None => return Ok(None),
        };
        // the current iterate only provides the dual reference point here
        let mut correction =
            self.solve_assembled(trial_iterate, hessian, &corrected_bounds)?;
        if correction.status != SubproblemStatus::Optimal {
            return Ok(None);
        }
        let common = correction.primals.len().min(direction.primals.len());
        for i in 0..common {
            correction.primals[i] += direction.primals[i];
        }
        correction.set_number_variables(direction.primals.len());
        debug!("second-order correction {}", correction);
        Ok(Some(correction))
    }

    fn generate_predicted_reduction_model(&self, direction: &Direction) -> PredictedReductionModel {
        // precompute the linear and quadratic terms once; evaluating the
        // model at any step length is then O(1)
        let common = direction.primals.len().min(self.last_gradient.len());
        let mut linear_term = 0.0;
        for i in 0..common {
            linear_term += self.last_gradient[i] * direction.primals[i];
        }
        let mut quadratic_term = 0.0;
        if let Some(hessian) = &self.last_hessian {
            for (&value, (i, j)) in hessian.triplet_iter() {
                if i < direction.primals.len() && j < direction.primals.len() {
                    let term = value * direction.primals[i] * direction.primals[j];
                    quadratic_term += if i == j { 0.5 * term } else { term };
                }
            }
        }
        PredictedReductionModel::new(
            -direction.objective,
            Box::new(move |step_length| {
                -step_length * (linear_term + step_length * quadratic_term)
            }),
        )
    }

    fn compute_progress_measures(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<(), NumericalError> {
        self.model.compute_progress_measures(problem, iterate)
    }

    fn set_proximal_weights(&mut self, weights: Option<DVector<f64>>) {
        self.proximal_weights = weights;
    }

    fn proximal_coefficient(&self) -> f64 {
        self.proximal_coefficient
    }

    fn progress_norm(&self) -> crate::core::problem::Norm {
        self.model.progress_norm
    }
}

//! Local models solved at every outer iteration.
//!
//! A subproblem assembles one local model of the (possibly relaxed) problem
//! around the current iterate and solves it for a primal-dual
//! [`Direction`]: a quadratic model ([`QPSubproblem`](qp::QPSubproblem)), a
//! linear model ([`LPSubproblem`](lp::LPSubproblem)) or a barrier Newton
//! step ([`PrimalDualInteriorPoint`](interior_point::PrimalDualInteriorPoint)).

pub mod hessian_model;
pub mod interior_point;
pub mod lp;
pub mod qp;

use nalgebra::DVector;
use sprs::{CsMat, TriMat};

use crate::core::direction::{ActiveBounds, ActiveSet, ConstraintPartition, Direction};
use crate::core::error::NumericalError;
use crate::core::iterate::{Iterate, Multipliers};
use crate::core::problem::{Norm, Problem, Range};
use crate::options::{ConfigurationError, Options};

/// Elastic variables relaxing the constraints: nonnegative `p_j` (and `n_j`)
/// contribute `p_j - n_j` to constraint `j` and are penalized linearly.
///
/// A positive elastic exists for every constraint with a finite lower bound,
/// a negative one for every finite upper bound.
#[derive(Debug, Clone)]
pub struct ElasticVariables {
    /// `(constraint index, variable index)` pairs of the positive elastics.
    pub positive: Vec<(usize, usize)>,
    /// `(constraint index, variable index)` pairs of the negative elastics.
    pub negative: Vec<(usize, usize)>,
}

impl ElasticVariables {
    /// Generates the elastic variables of a problem, numbering them from
    /// `first_variable_index`.
    pub fn generate(problem: &dyn Problem, first_variable_index: usize) -> Self {
        let mut positive = Vec::new();
        let mut negative = Vec::new();
        let mut index = first_variable_index;
        for j in 0..problem.number_constraints() {
            let bounds = problem.constraint_bounds(j);
            if bounds.upper.is_finite() {
                negative.push((j, index));
                index += 1;
            }
            if bounds.lower.is_finite() {
                positive.push((j, index));
                index += 1;
            }
        }
        Self { positive, negative }
    }

    /// Total number of elastic variables.
    pub fn number_elastics(&self) -> usize {
        self.positive.len() + self.negative.len()
    }
}

/// Model reduction as a function of the step length.
///
/// The expensive terms (gradient and Hessian-vector products) are computed
/// once per direction; evaluating the model at any step length is then O(1).
pub struct PredictedReductionModel {
    full_reduction: f64,
    partial_model: Box<dyn Fn(f64) -> f64>,
}

impl PredictedReductionModel {
    /// Creates a model from the full-step reduction and the step-length
    /// parametrization.
    pub fn new(full_reduction: f64, partial_model: Box<dyn Fn(f64) -> f64>) -> Self {
        Self {
            full_reduction,
            partial_model,
        }
    }

    /// Model reduction at the given step length.
    pub fn evaluate(&self, step_length: f64) -> f64 {
        if step_length == 1.0 {
            self.full_reduction
        } else {
            (self.partial_model)(step_length)
        }
    }
}

/// Interface of a subproblem.
pub trait Subproblem {
    /// Performs the first evaluations and sets up solver state.
    fn initialize(
        &mut self,
        problem: &dyn Problem,
        first_iterate: &mut Iterate,
    ) -> Result<(), NumericalError>;

    /// Assembles the local model around the current iterate: objective model
    /// with multiplier `σ`, linearized constraints, and variable displacement
    /// bounds intersected with the trust region.
    fn build_current_subproblem(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        objective_multiplier: f64,
        trust_region_radius: f64,
    ) -> Result<(), NumericalError>;

    /// Rebuilds only the objective model with a new multiplier `σ`, keeping
    /// the constraint data.
    fn build_objective_model(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        objective_multiplier: f64,
    ) -> Result<(), NumericalError>;

    /// Replaces the objective model with the linear objective of the
    /// partitioned feasibility problem (sum of the violated constraints) and
    /// relaxes the bounds of the violated constraints.
    fn build_feasibility_problem(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        partition: &ConstraintPartition,
    ) -> Result<(), NumericalError>;

    /// Appends elastic columns to the model, penalized with the given
    /// objective coefficient.
    fn add_elastic_variables(&mut self, elastics: &ElasticVariables, objective_coefficient: f64);

    /// Drops previously added elastic columns.
    fn remove_elastic_variables(&mut self);

    /// Sets the warm-start point of the next solve.
    fn set_initial_point(&mut self, point: &DVector<f64>);

    /// Solves the current model.
    fn solve(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
    ) -> Result<Direction, NumericalError>;

    /// Computes a second-order correction of a rejected step, if supported.
    fn compute_second_order_correction(
        &mut self,
        _problem: &dyn Problem,
        _trial_iterate: &mut Iterate,
        _direction: &Direction,
    ) -> Result<Option<Direction>, NumericalError> {
        Ok(None)
    }

    /// Returns the reduction of the model along the direction as a function
    /// of the step length.
    fn generate_predicted_reduction_model(&self, direction: &Direction) -> PredictedReductionModel;

    /// Evaluates the `(feasibility, objective)` progress measures of an
    /// iterate.
    fn compute_progress_measures(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<(), NumericalError>;

    /// Installs diagonal proximal weights added to the objective model.
    fn set_proximal_weights(&mut self, _weights: Option<DVector<f64>>) {}

    /// Coefficient of the proximal term, zero when not configured.
    fn proximal_coefficient(&self) -> f64 {
        0.0
    }

    /// Returns and clears the flag signalling that the model definition
    /// changed (for instance a barrier parameter update), which invalidates
    /// the progress measures seen by the globalization strategies.
    fn take_definition_changed(&mut self) -> bool {
        false
    }

    /// Norm used for the feasibility progress measure.
    fn progress_norm(&self) -> Norm {
        Norm::L1
    }
}

/// Creates a subproblem from the options map.
pub fn create_subproblem(
    problem: &dyn Problem,
    options: &Options,
) -> Result<Box<dyn Subproblem>, ConfigurationError> {
    match options.get("subproblem")? {
        "QP" => Ok(Box::new(qp::QPSubproblem::new(problem, options)?)),
        "LP" => Ok(Box::new(lp::LPSubproblem::new(problem, options)?)),
        "barrier" => Ok(Box::new(interior_point::PrimalDualInteriorPoint::new(
            problem, options,
        )?)),
        name => Err(ConfigurationError::UnknownIngredient {
            family: "subproblem",
            name: name.to_string(),
        }),
    }
}

/// Shared assembly state of the active-set subproblems (QP and LP).
pub(crate) struct SubproblemModel {
    pub number_problem_variables: usize,
    pub number_constraints: usize,
    pub objective_multiplier: f64,
    pub objective_gradient: DVector<f64>,
    pub constraints: DVector<f64>,
    pub jacobian: CsMat<f64>,
    pub variable_bounds: Vec<Range>,
    pub constraint_bounds: Vec<Range>,
    pub initial_point: DVector<f64>,
    pub elastics: Option<(ElasticVariables, f64)>,
    pub progress_norm: Norm,
    pub activity_tolerance: f64,
}

impl SubproblemModel {
    pub fn new(problem: &dyn Problem, progress_norm: Norm, activity_tolerance: f64) -> Self {
        let n = problem.number_variables();
        let m = problem.number_constraints();
        Self {
            number_problem_variables: n,
            number_constraints: m,
            objective_multiplier: problem.objective_sign(),
            objective_gradient: DVector::zeros(n),
            constraints: DVector::zeros(m),
            jacobian: CsMat::zero((m, n)),
            variable_bounds: vec![Range::unbounded(); n],
            constraint_bounds: vec![Range::unbounded(); m],
            initial_point: DVector::zeros(n),
            elastics: None,
            progress_norm,
            activity_tolerance,
        }
    }

    /// Number of variables including elastic columns.
    pub fn number_variables(&self) -> usize {
        self.number_problem_variables
            + self
                .elastics
                .as_ref()
                .map_or(0, |(elastics, _)| elastics.number_elastics())
    }

    /// Evaluates derivatives at the iterate and assembles the model data.
    pub fn build(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        objective_multiplier: f64,
        trust_region_radius: f64,
    ) -> Result<(), NumericalError> {
        current_iterate.evaluate_objective_gradient(problem)?;
        current_iterate.evaluate_constraints(problem)?;
        current_iterate.evaluate_constraint_jacobian(problem)?;

        self.objective_multiplier = objective_multiplier;
        self.objective_gradient = current_iterate.objective_gradient() * objective_multiplier;
        self.constraints = current_iterate.constraints().clone();
        self.jacobian = current_iterate.constraint_jacobian().clone();

        // displacement bounds max(x_L - x, -Δ) <= d <= min(x_U - x, Δ)
        for i in 0..self.number_problem_variables {
            let bounds = problem.variable_bounds(i);
            self.variable_bounds[i] = Range::new(
                (bounds.lower - current_iterate.x[i]).max(-trust_region_radius),
                (bounds.upper - current_iterate.x[i]).min(trust_region_radius),
            );
        }
        // linearized constraint bounds c_L - c(x) <= ∇c(x) d <= c_U - c(x)
        for j in 0..self.number_constraints {
            let bounds = problem.constraint_bounds(j);
            self.constraint_bounds[j] = Range::new(
                bounds.lower - self.constraints[j],
                bounds.upper - self.constraints[j],
            );
        }
        self.initial_point = DVector::zeros(self.number_problem_variables);
        self.elastics = None;
        Ok(())
    }

    /// Rebuilds the objective gradient with a new multiplier.
    pub fn rebuild_objective(
        &mut self,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        objective_multiplier: f64,
    ) -> Result<(), NumericalError> {
        current_iterate.evaluate_objective_gradient(problem)?;
        self.objective_multiplier = objective_multiplier;
        self.objective_gradient = current_iterate.objective_gradient() * objective_multiplier;
        Ok(())
    }

    /// Installs the linear objective and the relaxed constraint bounds of
    /// the partitioned feasibility problem.
    pub fn build_feasibility_objective(&mut self, partition: &ConstraintPartition) {
        self.objective_multiplier = 0.0;
        self.objective_gradient = DVector::zeros(self.number_problem_variables);
        // minimize the violation of the infeasible constraints: the gradient
        // is the sum of the (signed) gradients of the violated constraints
        for &j in &partition.lower_bound_infeasible {
            if let Some(row) = self.jacobian.outer_view(j) {
                for (i, &derivative) in row.iter() {
                    self.objective_gradient[i] -= derivative;
                }
            }
        }
        for &j in &partition.upper_bound_infeasible {
            if let Some(row) = self.jacobian.outer_view(j) {
                for (i, &derivative) in row.iter() {
                    self.objective_gradient[i] += derivative;
                }
            }
        }
        // free the violated side of the infeasible constraints
        for &j in &partition.lower_bound_infeasible {
            self.constraint_bounds[j] = Range::new(f64::NEG_INFINITY, self.constraint_bounds[j].upper);
        }
        for &j in &partition.upper_bound_infeasible {
            self.constraint_bounds[j] = Range::new(self.constraint_bounds[j].lower, f64::INFINITY);
        }
    }

    pub fn add_elastics(&mut self, elastics: &ElasticVariables, objective_coefficient: f64) {
        self.elastics = Some((elastics.clone(), objective_coefficient));
    }

    pub fn remove_elastics(&mut self) {
        self.elastics = None;
    }

    /// Gradient extended with the elastic penalty coefficients.
    pub fn assemble_gradient(&self) -> DVector<f64> {
        let total = self.number_variables();
        let mut gradient = DVector::zeros(total);
        gradient
            .rows_mut(0, self.number_problem_variables)
            .copy_from(&self.objective_gradient);
        if let Some((elastics, coefficient)) = &self.elastics {
            for &(_, variable) in elastics.positive.iter().chain(elastics.negative.iter()) {
                gradient[variable] = *coefficient;
            }
        }
        gradient
    }

    /// Jacobian extended with the ±1 elastic columns.
    pub fn assemble_jacobian(&self) -> CsMat<f64> {
        let total = self.number_variables();
        let mut triplets = TriMat::new((self.number_constraints, total));
        for (j, row) in self.jacobian.outer_iterator().enumerate() {
            for (i, &value) in row.iter() {
                triplets.add_triplet(j, i, value);
            }
        }
        if let Some((elastics, _)) = &self.elastics {
            for &(constraint, variable) in &elastics.positive {
                triplets.add_triplet(constraint, variable, 1.0);
            }
            for &(constraint, variable) in &elastics.negative {
                triplets.add_triplet(constraint, variable, -1.0);
            }
        }
        triplets.to_csr::<usize>()
    }

    /// Displacement bounds extended with the nonnegativity of the elastics.
    pub fn assemble_variable_bounds(&self) -> Vec<Range> {
        let mut bounds = self.variable_bounds.clone();
        bounds.resize(self.number_variables(), Range::nonnegative());
        bounds
    }

    /// Warm-start point padded or truncated to the model dimension.
    pub fn assemble_initial_point(&self) -> DVector<f64> {
        let total = self.number_variables();
        let mut point = DVector::zeros(total);
        let copied = self.initial_point.len().min(total);
        for i in 0..copied {
            point[i] = self.initial_point[i];
        }
        point
    }

    /// Active set of a solution with respect to the model bounds.
    pub fn determine_active_set(&self, primals: &DVector<f64>) -> ActiveSet {
        let variable_bounds = self.assemble_variable_bounds();
        let mut bounds = ActiveBounds::default();
        for (i, range) in variable_bounds.iter().enumerate() {
            if range.lower.is_finite() && (primals[i] - range.lower).abs() <= self.activity_tolerance
            {
                bounds.at_lower_bound.push(i);
            } else if range.upper.is_finite()
                && (primals[i] - range.upper).abs() <= self.activity_tolerance
            {
                bounds.at_upper_bound.push(i);
            }
        }
        let jacobian = self.assemble_jacobian();
        let mut constraints = ActiveBounds::default();
        for (j, row) in jacobian.outer_iterator().enumerate() {
            let value: f64 = row.iter().map(|(i, &v)| v * primals[i]).sum();
            let range = self.constraint_bounds[j];
            if range.lower.is_finite() && (value - range.lower).abs() <= self.activity_tolerance {
                constraints.at_lower_bound.push(j);
            } else if range.upper.is_finite()
                && (value - range.upper).abs() <= self.activity_tolerance
            {
                constraints.at_upper_bound.push(j);
            }
        }
        ActiveSet {
            bounds,
            constraints,
        }
    }

    /// Standard progress measures: constraint violation and objective value.
    pub fn compute_progress_measures(
        &self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<(), NumericalError> {
        iterate.evaluate_constraints(problem)?;
        let feasibility = iterate.constraint_violation(problem, self.progress_norm);
        let objective = iterate.evaluate_objective(problem)?;
        iterate.progress = crate::core::iterate::ProgressMeasures {
            feasibility,
            objective,
        };
        Ok(())
    }
}

/// Turns the multipliers of a subproblem solution into displacements with
/// respect to the current iterate.
pub(crate) fn compute_dual_displacements(
    current_iterate: &Iterate,
    solution_constraints: &DVector<f64>,
    solution_lower_bounds: &DVector<f64>,
    solution_upper_bounds: &DVector<f64>,
) -> Multipliers {
    let m = solution_constraints.len();
    let nv = solution_lower_bounds.len();
    let mut displacements = Multipliers::new(nv, m);
    for j in 0..m {
        displacements.constraints[j] =
            solution_constraints[j] - current_iterate.multipliers.constraints[j];
    }
    for i in 0..nv {
        let current_lower = if i < current_iterate.multipliers.lower_bounds.len() {
            current_iterate.multipliers.lower_bounds[i]
        } else {
            0.0
        };
        let current_upper = if i < current_iterate.multipliers.upper_bounds.len() {
            current_iterate.multipliers.upper_bounds[i]
        } else {
            0.0
        };
        displacements.lower_bounds[i] = solution_lower_bounds[i] - current_lower;
        displacements.upper_bounds[i] = solution_upper_bounds[i] - current_upper;
    }
    displacements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Hs015;

    #[test]
    fn elastic_generation_follows_constraint_bounds() {
        // HS015: two lower-bounded constraints
        let problem = Hs015;
        let elastics = ElasticVariables::generate(&problem, 2);
        assert_eq!(elastics.positive.len(), 2);
        assert_eq!(elastics.negative.len(), 0);
        assert_eq!(elastics.positive[0], (0, 2));
        assert_eq!(elastics.positive[1], (1, 3));
    }

    #[test]
    fn predicted_reduction_model_is_cheap_away_from_full_step() {
        let model = PredictedReductionModel::new(3.0, Box::new(|alpha| alpha * (2.0 - alpha)));
        assert_eq!(model.evaluate(1.0), 3.0);
        assert_eq!(model.evaluate(0.5), 0.75);
    }
}

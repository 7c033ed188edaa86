#![allow(clippy::many_single_char_names)]
#![allow(clippy::too_many_arguments)]
#![warn(missing_docs)]

//! # Uno
//!
//! A modular framework for solving continuous nonlinearly constrained,
//! possibly nonconvex optimization problems
//!
//! ```text
//! minimize  f(x)
//! subject to  c_L <= c(x) <= c_U,   x_L <= x <= x_U
//! ```
//!
//! with twice-differentiable functions and sparse derivatives. Instead of
//! implementing monolithic solvers, the framework composes each solver from
//! four orthogonal ingredients:
//!
//! * a **constraint-relaxation strategy** (how infeasible subproblems are
//!   handled): [ℓ₁ relaxation](relaxation::l1_relaxation) with Byrd's
//!   steering rule, or two-phase
//!   [feasibility restoration](relaxation::feasibility_restoration);
//! * a **subproblem** (the local model solved per iteration):
//!   [QP](subproblem::qp), [LP](subproblem::lp) or a primal-dual
//!   [interior-point](subproblem::interior_point) barrier step;
//! * a **globalization strategy** (how a trial iterate is judged):
//!   [ℓ₁ merit function](strategy::merit), [filter](strategy::filter) or
//!   [funnel](strategy::funnel);
//! * a **globalization mechanism** (how a rejected step is retracted):
//!   [trust region](mechanism::trust_region) or
//!   [backtracking line search](mechanism::line_search).
//!
//! Any consistent combination yields a working solver; the classical
//! presets `filtersqp`, `ipopt` and `byrd` are available through the
//! [`Options`](options::Options) map.
//!
//! ## Problem
//!
//! A problem is any type implementing the [`Problem`](core::problem::Problem)
//! trait, which exposes dimensions, bounds and sparse derivative
//! evaluators:
//!
//! ```rust
//! use nalgebra::DVector;
//! use sprs::{CsMat, TriMat};
//! use uno::{Problem, Range};
//!
//! struct Rosenbrock;
//!
//! impl Problem for Rosenbrock {
//!     fn number_variables(&self) -> usize {
//!         2
//!     }
//!
//!     fn number_constraints(&self) -> usize {
//!         0
//!     }
//!
//!     fn variable_bounds(&self, _i: usize) -> Range {
//!         Range::unbounded()
//!     }
//!
//!     fn constraint_bounds(&self, _j: usize) -> Range {
//!         unreachable!()
//!     }
//!
//!     fn evaluate_objective(&self, x: &DVector<f64>) -> f64 {
//!         100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2)
//!     }
//!
//!     fn evaluate_objective_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
//!         DVector::from_vec(vec![
//!             -400.0 * x[0] * (x[1] - x[0] * x[0]) - 2.0 * (1.0 - x[0]),
//!             200.0 * (x[1] - x[0] * x[0]),
//!         ])
//!     }
//!
//!     fn evaluate_constraints(&self, _x: &DVector<f64>) -> DVector<f64> {
//!         DVector::zeros(0)
//!     }
//!
//!     fn evaluate_constraint_jacobian(&self, _x: &DVector<f64>) -> CsMat<f64> {
//!         CsMat::zero((0, 2))
//!     }
//!
//!     fn evaluate_lagrangian_hessian(
//!         &self,
//!         x: &DVector<f64>,
//!         sigma: f64,
//!         _multipliers: &DVector<f64>,
//!     ) -> TriMat<f64> {
//!         let mut hessian = TriMat::new((2, 2));
//!         hessian.add_triplet(0, 0, sigma * (-400.0 * (x[1] - 3.0 * x[0] * x[0]) + 2.0));
//!         hessian.add_triplet(1, 0, sigma * (-400.0 * x[0]));
//!         hessian.add_triplet(1, 1, sigma * 200.0);
//!         hessian
//!     }
//! }
//! ```
//!
//! ## Solving
//!
//! The [`Uno`](driver::Uno) driver assembles the ingredients from an
//! [`Options`](options::Options) map and runs the outer loop:
//!
//! ```rust
//! use nalgebra::DVector;
//! use uno::{Iterate, Options, TerminationStatus, Uno};
//! # use sprs::{CsMat, TriMat};
//! # use uno::{Problem, Range};
//! #
//! # struct Rosenbrock;
//! #
//! # impl Problem for Rosenbrock {
//! #     fn number_variables(&self) -> usize {
//! #         2
//! #     }
//! #     fn number_constraints(&self) -> usize {
//! #         0
//! #     }
//! #     fn variable_bounds(&self, _i: usize) -> Range {
//! #         Range::unbounded()
//! #     }
//! #     fn constraint_bounds(&self, _j: usize) -> Range {
//! #         unreachable!()
//! #     }
//! #     fn evaluate_objective(&self, x: &DVector<f64>) -> f64 {
//! #         100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2)
//! #     }
//! #     fn evaluate_objective_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
//! #         DVector::from_vec(vec![
//! #             -400.0 * x[0] * (x[1] - x[0] * x[0]) - 2.0 * (1.0 - x[0]),
//! #             200.0 * (x[1] - x[0] * x[0]),
//! #         ])
//! #     }
//! #     fn evaluate_constraints(&self, _x: &DVector<f64>) -> DVector<f64> {
//! #         DVector::zeros(0)
//! #     }
//! #     fn evaluate_constraint_jacobian(&self, _x: &DVector<f64>) -> CsMat<f64> {
//! #         CsMat::zero((0, 2))
//! #     }
//! #     fn evaluate_lagrangian_hessian(
//! #         &self,
//! #         x: &DVector<f64>,
//! #         sigma: f64,
//! #         _multipliers: &DVector<f64>,
//! #     ) -> TriMat<f64> {
//! #         let mut hessian = TriMat::new((2, 2));
//! #         hessian.add_triplet(0, 0, sigma * (-400.0 * (x[1] - 3.0 * x[0] * x[0]) + 2.0));
//! #         hessian.add_triplet(1, 0, sigma * (-400.0 * x[0]));
//! #         hessian.add_triplet(1, 1, sigma * 200.0);
//! #         hessian
//! #     }
//! # }
//!
//! let mut options = Options::default();
//! options.set("preset", "filtersqp").unwrap();
//!
//! let problem = Rosenbrock;
//! let mut uno = Uno::from_options(&problem, &options).unwrap();
//! let first_iterate = Iterate::new(DVector::from_vec(vec![-1.2, 1.0]), 0);
//!
//! let result = uno.solve(&problem, first_iterate, false);
//! assert_eq!(result.status, TerminationStatus::KktPoint);
//! ```
//!
//! ## License
//!
//! Licensed under MIT.

pub mod core;
pub mod driver;
pub mod mechanism;
pub mod options;
pub mod preprocessing;
pub mod relaxation;
pub mod scaling;
pub mod solvers;
pub mod strategy;
pub mod subproblem;

pub use crate::core::*;
pub use driver::{postsolve_solution, TerminationStatus, Uno, UnoResult};
pub use options::{ConfigurationError, Options};
pub use scaling::{ScaledProblem, Scaling};

#[cfg(feature = "testing")]
pub mod testing;

#[cfg(not(feature = "testing"))]
pub(crate) mod testing;

pub use nalgebra;
pub use sprs;

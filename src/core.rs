//! Core data model: problems, iterates, directions and optimality
//! residuals.

pub mod direction;
pub mod error;
pub mod iterate;
pub mod optimality;
pub mod problem;

pub use direction::*;
pub use error::*;
pub use iterate::*;
pub use problem::*;

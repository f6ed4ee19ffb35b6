//! Problem abstraction: the model trait, closure-backed problems, wrappers
//! and box constraints.

pub mod bounds;
pub mod error;
pub mod model;
pub mod problem;
pub mod scaling;
pub mod types;

pub use bounds::Bounds;
pub use model::{CountingModel, EvaluationCounts, Model};
pub use problem::Problem;
pub use scaling::ScaledModel;

//! Linear algebra used by the solvers: operators, sparse storage and direct
//! solvers.

pub mod operator;
pub mod solver;
pub mod sparse;

pub use operator::{mask_vector, quadratic_model, HessianOperator, LinearOperator, MaskedOperator};
pub use solver::{CholeskySolver, LinearSolver, LinearSolverKind, LuSolver};
pub use sparse::CsrMatrix;

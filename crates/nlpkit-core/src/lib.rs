//! Core traits and types for nonlinear programming solvers.
//!
//! This crate defines the contract between optimization problems and the
//! algorithms that solve them, plus the machinery the algorithms share.
//!
//! # Key Concepts
//!
//! - **Models**: problems exposing objective, gradient, Hessian-vector
//!   products and optional bounds through the [`Model`](core::model::Model) trait
//! - **Linear operators**: Hessians seen as matrix-free operators, sparse
//!   matrices or dense matrices, interchangeably
//! - **Line searches**: Armijo backtracking and Wolfe bracketing
//! - **Convergence records**: the immutable outcome of a solve
//!
//! # Modules
//!
//! - [`core`]: the model trait, closure-backed problems, wrappers and bounds
//! - [`error`]: error types for models and solvers
//! - [`linalg`]: linear operators, CSR storage and direct solvers
//! - [`numerical`]: finite-difference derivative checking
//! - [`optimization`]: options, records, observers, line searches and L-BFGS history
//! - [`types`]: the scalar trait, type aliases and numerical constants

pub mod core;
pub mod linalg;
pub mod numerical;
pub mod optimization;
pub mod utils;

pub use crate::core::{error, types};

// Re-export commonly used items at the crate root
pub use error::{ModelError, ModelResult, SolverError, SolverResult};

/// Prelude module for convenient imports.
///
/// # Example
/// ```
/// use nlpkit_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{
        Bounds, CountingModel, EvaluationCounts, Model, Problem, ScaledModel,
    };
    pub use crate::error::{ModelError, ModelResult, SolverError, SolverResult};
    pub use crate::linalg::{
        CsrMatrix, HessianOperator, LinearOperator, LinearSolver, LinearSolverKind,
    };
    pub use crate::numerical::{DerivativeChecker, DerivativeReport};
    pub use crate::optimization::{
        BacktrackingLineSearch, ConvergenceRecord, HistoryObserver, Iterate, IterationInfo,
        IterationObserver, LbfgsHistory, LineSearch, LineSearchKind, LineSearchParams,
        LineSearchResult, LogObserver, NoOpObserver, QuasiNewtonModel, SolverOptions, StepKind,
        TerminationStatus, WolfeLineSearch,
    };
    pub use crate::types::{constants, DMatrix, DVector, Scalar};
}

//! nlpkit Optimization - local solvers for nonlinear programs.
//!
//! This crate provides the algorithms that drive a
//! [`Model`](nlpkit_core::core::Model) to a local minimizer.
//!
//! # Available Solvers
//!
//! - **TRON**: trust-region Newton method for bound-constrained problems,
//!   combining a projected Cauchy step with truncated CG on the free variables
//! - **Trunk**: the unconstrained trust-region Newton-CG specialization, with
//!   a line-search rescue for rejected steps
//! - **L-BFGS**: limited-memory quasi-Newton with Wolfe or Armijo line search
//!
//! All solvers implement [`Solver`] and return a
//! [`ConvergenceRecord`](nlpkit_core::optimization::ConvergenceRecord).
//!
//! # Examples
//!
//! ```rust
//! use nlpkit_core::prelude::*;
//! use nlpkit_optim::{Solver, Tron, TrustRegionConfig};
//!
//! let problem = Problem::new(
//!     2,
//!     |x: &DVector<f64>| Ok(x[0] * x[0] + 4.0 * x[1] * x[1] - x[0]),
//!     |x: &DVector<f64>| Ok(DVector::from_vec(vec![2.0 * x[0] - 1.0, 8.0 * x[1]])),
//! )
//! .with_lower_bound(0.0);
//!
//! let tron = Tron::new(TrustRegionConfig::<f64>::new().with_max_radius(100.0));
//! let options = SolverOptions::new().with_gradient_tolerance(1e-8);
//! let record = tron.minimize(&problem, &DVector::from_vec(vec![2.0, 1.0]), &options).unwrap();
//!
//! assert!(record.is_converged());
//! assert!((record.x()[0] - 0.5).abs() < 1e-6);
//! ```

pub mod lbfgs;
pub mod solver;
pub mod tcg;
pub mod tron;
pub mod trunk;
pub mod trust_region;

mod utils;

// Re-export main solvers for convenience
pub use lbfgs::{LBFGSConfig, LBFGS};
pub use solver::Solver;
pub use tcg::{CgStep, TruncatedCg, TruncatedCgConfig};
pub use tron::Tron;
pub use trunk::Trunk;
pub use trust_region::{reduction_ratio, SubproblemMethod, TrustRegionConfig, TrustRegionState};

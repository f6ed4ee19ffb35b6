//! # nlpkit
//!
//! Local solvers for smooth nonlinear programs with optional bound
//! constraints.
//!
//! This crate ties the workspace together: it re-exports the model contract
//! from [`nlpkit_core`] and the algorithms from [`nlpkit_optim`], and adds a
//! single [`solve`] entry point that picks a solver by [`SolverKind`].
//!
//! ## Quick Start
//!
//! ```rust
//! use nlpkit::prelude::*;
//!
//! // min (x0 - 3)² + (x1 + 1)² subject to 0 ≤ x ≤ 2
//! let problem = Problem::new(
//!     2,
//!     |x: &DVector<f64>| Ok((x[0] - 3.0).powi(2) + (x[1] + 1.0).powi(2)),
//!     |x: &DVector<f64>| Ok(DVector::from_vec(vec![2.0 * (x[0] - 3.0), 2.0 * (x[1] + 1.0)])),
//! )
//! .with_lower_bound(0.0)
//! .with_upper_bound(2.0);
//!
//! let record = nlpkit::solve(&problem, SolverKind::Tron, &SolverOptions::default()).unwrap();
//! assert!(record.is_converged());
//! assert!((record.x()[0] - 2.0).abs() < 1e-10);
//! assert!(record.x()[1].abs() < 1e-10);
//! ```
//!
//! ## Choosing a solver
//!
//! - [`SolverKind::Tron`] handles bounds and uses second-order information
//! - [`SolverKind::Trunk`] is the unconstrained trust-region variant
//! - [`SolverKind::Lbfgs`] only needs gradients but rejects bounded models

pub use nalgebra;
pub use nlpkit_core;
pub use nlpkit_optim;

use nlpkit_core::{
    core::Model,
    error::SolverResult,
    optimization::{ConvergenceRecord, IterationObserver, NoOpObserver, SolverOptions},
    types::{DVector, Scalar},
};
use nlpkit_optim::{LBFGSConfig, Solver, Tron, Trunk, LBFGS};
use std::fmt;

/// Solver selected by [`solve`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SolverKind {
    /// Bound-constrained trust-region Newton
    #[default]
    Tron,
    /// Unconstrained trust-region Newton-CG
    Trunk,
    /// Limited-memory BFGS with line search
    Lbfgs,
}

impl SolverKind {
    /// All available solvers.
    pub const ALL: [Self; 3] = [Self::Tron, Self::Trunk, Self::Lbfgs];

    /// Whether the solver accepts bounded models.
    pub fn supports_bounds(self) -> bool {
        matches!(self, Self::Tron)
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tron => "tron",
            Self::Trunk => "trunk",
            Self::Lbfgs => "lbfgs",
        })
    }
}

/// Minimizes `model` with the chosen solver and default algorithm settings.
///
/// The starting point is [`Model::initial_point`], or the origin when the
/// model has none.
pub fn solve<T, M>(model: &M, kind: SolverKind, options: &SolverOptions<T>) -> SolverResult<ConvergenceRecord<T>>
where
    T: Scalar,
    M: Model<T> + ?Sized,
{
    solve_with_observer(model, kind, options, &mut NoOpObserver)
}

/// Like [`solve`], reporting every iteration to `observer`.
pub fn solve_with_observer<T, M>(
    model: &M,
    kind: SolverKind,
    options: &SolverOptions<T>,
    observer: &mut dyn IterationObserver<T>,
) -> SolverResult<ConvergenceRecord<T>>
where
    T: Scalar,
    M: Model<T> + ?Sized,
{
    let x0 = model
        .initial_point()
        .unwrap_or_else(|| DVector::zeros(model.dimension()));
    log::debug!("solving '{}' (n = {}) with {kind}", model.name(), model.dimension());

    match kind {
        SolverKind::Tron => Tron::default().minimize_observed(model, &x0, options, observer),
        SolverKind::Trunk => Trunk::default().minimize_observed(model, &x0, options, observer),
        SolverKind::Lbfgs => LBFGS::new(LBFGSConfig::new()).minimize_observed(model, &x0, options, observer),
    }
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{solve, solve_with_observer, SolverKind};
    pub use nlpkit_core::prelude::*;
    pub use nlpkit_optim::{
        LBFGSConfig, Solver, SubproblemMethod, TruncatedCgConfig, Tron, Trunk, TrustRegionConfig, LBFGS,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_kind_display() {
        let names: Vec<String> = SolverKind::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(names, ["tron", "trunk", "lbfgs"]);
        assert_eq!(SolverKind::default(), SolverKind::Tron);
        assert!(SolverKind::Tron.supports_bounds());
        assert!(!SolverKind::Lbfgs.supports_bounds());
    }
}

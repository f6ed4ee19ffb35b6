//! The interface every solver implements.

use nlpkit_core::{
    core::Model,
    error::SolverResult,
    optimization::{ConvergenceRecord, IterationObserver, NoOpObserver, SolverOptions},
    types::{DVector, Scalar},
};
use std::fmt::Debug;

/// A local minimization algorithm.
///
/// Solvers hold only their algorithm constants; all per-solve state (iterate,
/// radius, curvature history) lives inside a single call to
/// [`Solver::minimize_observed`] and is dropped when it returns.
///
/// Only invalid configuration and dimension mismatches are returned as
/// errors. Every other way a solve can end, including fatal numerical
/// failures, is reported through the status of the returned
/// [`ConvergenceRecord`].
pub trait Solver<T: Scalar>: Debug {
    /// Name used in records and log lines.
    fn name(&self) -> &str;

    /// Minimizes `model` from `x0`, reporting each iteration to `observer`.
    fn minimize_observed<M: Model<T> + ?Sized>(
        &self,
        model: &M,
        x0: &DVector<T>,
        options: &SolverOptions<T>,
        observer: &mut dyn IterationObserver<T>,
    ) -> SolverResult<ConvergenceRecord<T>>;

    /// Minimizes `model` from `x0`.
    fn minimize<M: Model<T> + ?Sized>(
        &self,
        model: &M,
        x0: &DVector<T>,
        options: &SolverOptions<T>,
    ) -> SolverResult<ConvergenceRecord<T>> {
        self.minimize_observed(model, x0, options, &mut NoOpObserver)
    }
}

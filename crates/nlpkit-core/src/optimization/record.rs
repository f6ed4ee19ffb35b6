//! Iterates, terminal statuses and convergence records.

use crate::{
    core::model::EvaluationCounts,
    error::SolverError,
    types::{DVector, Scalar},
};
use std::fmt;
use std::time::Duration;

/// State of the optimization trajectory at one point.
///
/// Solvers own their iterate exclusively and replace it wholesale when a
/// step is accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct Iterate<T: Scalar> {
    /// Current point
    pub x: DVector<T>,
    /// Objective value at `x`
    pub f: T,
    /// Gradient at `x`
    pub g: DVector<T>,
    /// Bound constraints that are tight with the gradient pointing outward
    pub active: Vec<bool>,
    /// Outer iteration that produced this iterate
    pub iteration: usize,
}

impl<T: Scalar> Iterate<T> {
    /// Creates an iterate with an empty active set.
    pub fn new(x: DVector<T>, f: T, g: DVector<T>, iteration: usize) -> Self {
        let active = vec![false; x.len()];
        Self {
            x,
            f,
            g,
            active,
            iteration,
        }
    }

    /// Replaces the active set.
    pub fn with_active(mut self, active: Vec<bool>) -> Self {
        self.active = active;
        self
    }

    /// Number of active bounds.
    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }
}

/// Why a solve stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TerminationStatus {
    /// Projected-gradient norm below tolerance.
    GradientTolerance,
    /// Objective decrease below tolerance.
    FunctionTolerance,
    /// Step length below tolerance.
    StepTolerance,
    /// Iteration budget exhausted.
    IterationLimit,
    /// Evaluation budget exhausted.
    EvaluationLimit,
    /// Wall-clock budget exhausted.
    TimeLimit,
    /// Too many consecutive rejected trust-region steps.
    Stagnation,
    /// The line search found no acceptable step.
    LineSearchFailure,
    /// Too many consecutive evaluation failures.
    EvaluationFailure,
    /// The linear algebra provider failed.
    SingularSystem,
    /// Non-finite values in the solver state.
    NumericalFailure,
    /// An observer asked to stop.
    UserRequested,
}

impl TerminationStatus {
    /// Whether the solve reached a convergence criterion.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            Self::GradientTolerance | Self::FunctionTolerance | Self::StepTolerance
        )
    }

    /// Whether a budget stopped the solve.
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(
            self,
            Self::IterationLimit | Self::EvaluationLimit | Self::TimeLimit
        )
    }

    /// Whether a fatal failure stopped the solve.
    pub fn is_failure(&self) -> bool {
        !self.is_converged() && !self.is_budget_exceeded() && *self != Self::UserRequested
    }

    /// Compact status tag for tabular output.
    pub fn short_code(&self) -> &'static str {
        match self {
            Self::GradientTolerance | Self::FunctionTolerance | Self::StepTolerance => "opt",
            Self::IterationLimit => "itr",
            Self::EvaluationLimit => "eval",
            Self::TimeLimit => "time",
            Self::Stagnation => "stg",
            Self::LineSearchFailure => "lsf",
            Self::EvaluationFailure => "fev",
            Self::SingularSystem => "sng",
            Self::NumericalFailure => "num",
            Self::UserRequested => "usr",
        }
    }

    /// Maps a fatal solver error to its terminal status.
    pub fn from_error(err: &SolverError) -> Self {
        match err {
            SolverError::Model(_) | SolverError::EvaluationFailures { .. } => {
                Self::EvaluationFailure
            }
            SolverError::Stagnation { .. } => Self::Stagnation,
            SolverError::LineSearchFailed { .. } => Self::LineSearchFailure,
            SolverError::SingularSystem { .. } => Self::SingularSystem,
            SolverError::NumericalFailure { .. }
            | SolverError::InvalidConfiguration { .. }
            | SolverError::DimensionMismatch { .. } => Self::NumericalFailure,
        }
    }
}

impl fmt::Display for TerminationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::GradientTolerance => "projected gradient below tolerance",
            Self::FunctionTolerance => "objective decrease below tolerance",
            Self::StepTolerance => "step length below tolerance",
            Self::IterationLimit => "iteration limit reached",
            Self::EvaluationLimit => "evaluation limit reached",
            Self::TimeLimit => "time limit reached",
            Self::Stagnation => "too many consecutive rejected steps",
            Self::LineSearchFailure => "line search failure",
            Self::EvaluationFailure => "too many evaluation failures",
            Self::SingularSystem => "singular linear system",
            Self::NumericalFailure => "numerical failure",
            Self::UserRequested => "stopped by observer",
        };
        f.write_str(text)
    }
}

/// Outcome of a solve. Produced once, never modified afterwards.
#[derive(Debug, Clone)]
pub struct ConvergenceRecord<T: Scalar> {
    /// Solver that produced the record
    pub solver: String,
    /// Name of the model
    pub model: String,
    /// Terminal status
    pub status: TerminationStatus,
    /// Final iterate
    pub iterate: Iterate<T>,
    /// Projected-gradient norm at the final iterate
    pub projected_gradient_norm: T,
    /// Outer iterations performed
    pub iterations: usize,
    /// Evaluation counts
    pub counts: EvaluationCounts,
    /// Wall-clock time
    pub elapsed: Duration,
    /// Error behind a fatal status
    pub error: Option<SolverError>,
}

impl<T: Scalar> ConvergenceRecord<T> {
    /// Whether the solve converged.
    pub fn is_converged(&self) -> bool {
        self.status.is_converged()
    }

    /// Final point.
    pub fn x(&self) -> &DVector<T> {
        &self.iterate.x
    }

    /// Final objective value.
    pub fn objective(&self) -> T {
        self.iterate.f
    }

    /// One-line statistics summary.
    ///
    /// Columns: model name, dimension, iterations, objective, projected
    /// gradient norm, objective/gradient/Hessian-vector counts, status tag,
    /// seconds.
    pub fn summary_line(&self) -> String {
        format!(
            "{:<12} {:>6} {:>6} {:>12.5e} {:>9.2e} {:>6} {:>6} {:>6} {:>5} {:>8.3}",
            self.model,
            self.iterate.x.len(),
            self.iterations,
            Scalar::to_f64(self.iterate.f),
            Scalar::to_f64(self.projected_gradient_norm),
            self.counts.objective,
            self.counts.gradient,
            self.counts.hessian_vector,
            self.status.short_code(),
            self.elapsed.as_secs_f64(),
        )
    }
}

impl<T: Scalar> fmt::Display for ConvergenceRecord<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} after {} iterations, f = {:e}, |pg| = {:e}, {}",
            self.solver,
            self.status,
            self.iterations,
            Scalar::to_f64(self.iterate.f),
            Scalar::to_f64(self.projected_gradient_norm),
            self.counts
        )?;
        if let Some(err) = &self.error {
            write!(f, " ({err})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: TerminationStatus) -> ConvergenceRecord<f64> {
        ConvergenceRecord {
            solver: "tron".to_string(),
            model: "rosenbrock".to_string(),
            status,
            iterate: Iterate::new(DVector::from_vec(vec![1.0, 1.0]), 0.0, DVector::zeros(2), 21),
            projected_gradient_norm: 1e-9,
            iterations: 21,
            counts: EvaluationCounts {
                objective: 22,
                gradient: 20,
                hessian_vector: 64,
                hessian: 0,
            },
            elapsed: Duration::from_millis(3),
            error: None,
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(TerminationStatus::GradientTolerance.is_converged());
        assert!(TerminationStatus::TimeLimit.is_budget_exceeded());
        assert!(TerminationStatus::Stagnation.is_failure());
        assert!(!TerminationStatus::UserRequested.is_failure());
        assert_eq!(TerminationStatus::IterationLimit.short_code(), "itr");
        assert_eq!(TerminationStatus::StepTolerance.short_code(), "opt");
    }

    #[test]
    fn test_status_from_error() {
        assert_eq!(
            TerminationStatus::from_error(&SolverError::stagnation(30, 1e-12)),
            TerminationStatus::Stagnation
        );
        assert_eq!(
            TerminationStatus::from_error(&SolverError::singular_system("zero pivot")),
            TerminationStatus::SingularSystem
        );
        assert_eq!(
            TerminationStatus::from_error(&SolverError::evaluation_failures(3, "nan")),
            TerminationStatus::EvaluationFailure
        );
    }

    #[test]
    fn test_summary_line() {
        let r = record(TerminationStatus::GradientTolerance);
        let line = r.summary_line();

        assert!(line.starts_with("rosenbrock"));
        assert!(line.contains(" opt "));
        assert!(line.contains("64"));
        assert!(r.is_converged());
        assert!(r.to_string().contains("21 iterations"));
    }

    #[test]
    fn test_iterate_active_count() {
        let it = Iterate::new(DVector::zeros(3), 0.0, DVector::zeros(3), 0)
            .with_active(vec![true, false, true]);
        assert_eq!(it.active_count(), 2);
    }
}

//! Observer support for solver iterations.
//!
//! Observers see every outer iteration, accepted or not, and may stop the
//! solve early.

use crate::{optimization::record::ConvergenceRecord, types::Scalar};
use log::info;
use std::time::Duration;

/// How the step of an iteration was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StepKind {
    /// Truncated CG converged inside the trust region.
    Interior,
    /// Truncated CG stopped on the trust-region boundary.
    Boundary,
    /// Truncated CG followed a direction of negative curvature to the boundary.
    NegativeCurvature,
    /// Projected-gradient (Cauchy) step.
    Cauchy,
    /// Exact solve through a linear algebra provider.
    Direct,
    /// Step length chosen by a line search.
    LineSearch,
}

/// Information passed to observers after each outer iteration.
#[derive(Debug, Clone)]
pub struct IterationInfo<T: Scalar> {
    /// Outer iteration number, starting at 1
    pub iteration: usize,
    /// Objective value after the iteration
    pub objective: T,
    /// Projected-gradient norm after the iteration
    pub projected_gradient_norm: T,
    /// Norm of the trial step
    pub step_norm: T,
    /// Trust-region radius after the update (line-search solvers report the step length)
    pub radius: T,
    /// Actual-to-predicted decrease ratio, when one was computed
    pub ratio: Option<T>,
    /// How the step was produced
    pub step_kind: StepKind,
    /// Whether the step was accepted
    pub accepted: bool,
    /// Elapsed time since the solve started
    pub elapsed: Duration,
}

/// Trait for iteration observers.
pub trait IterationObserver<T: Scalar> {
    /// Called once before the first iteration.
    fn on_start(&mut self, solver: &str, model: &str) {
        let _ = (solver, model);
    }

    /// Called after each outer iteration.
    ///
    /// Returns `true` to continue, `false` to stop the solve.
    fn on_iteration(&mut self, info: &IterationInfo<T>) -> bool {
        let _ = info;
        true
    }

    /// Called once with the final record.
    fn on_finish(&mut self, record: &ConvergenceRecord<T>) {
        let _ = record;
    }
}

/// An observer that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpObserver;

impl<T: Scalar> IterationObserver<T> for NoOpObserver {}

/// Logs progress through the `log` facade at `info` level.
#[derive(Debug, Clone)]
pub struct LogObserver {
    every: usize,
}

impl LogObserver {
    /// Logs every `every`-th iteration (at least every iteration).
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl<T: Scalar> IterationObserver<T> for LogObserver {
    fn on_start(&mut self, solver: &str, model: &str) {
        info!("{solver}: solving {model}");
    }

    fn on_iteration(&mut self, info: &IterationInfo<T>) -> bool {
        if info.iteration % self.every == 0 {
            info!(
                "{:>5} f={:>14.7e} |pg|={:>9.2e} |s|={:>9.2e} radius={:>9.2e} {:?}{}",
                info.iteration,
                Scalar::to_f64(info.objective),
                Scalar::to_f64(info.projected_gradient_norm),
                Scalar::to_f64(info.step_norm),
                Scalar::to_f64(info.radius),
                info.step_kind,
                if info.accepted { "" } else { " rejected" }
            );
        }
        true
    }

    fn on_finish(&mut self, record: &ConvergenceRecord<T>) {
        info!("{record}");
    }
}

/// Collects every [`IterationInfo`], for tests and post-mortems.
#[derive(Debug, Clone)]
pub struct HistoryObserver<T: Scalar> {
    /// Recorded iterations, in order
    pub iterations: Vec<IterationInfo<T>>,
}

impl<T: Scalar> Default for HistoryObserver<T> {
    fn default() -> Self {
        Self {
            iterations: Vec::new(),
        }
    }
}

impl<T: Scalar> HistoryObserver<T> {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Scalar> IterationObserver<T> for HistoryObserver<T> {
    fn on_iteration(&mut self, info: &IterationInfo<T>) -> bool {
        self.iterations.push(info.clone());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(iteration: usize) -> IterationInfo<f64> {
        IterationInfo {
            iteration,
            objective: 1.0,
            projected_gradient_norm: 0.1,
            step_norm: 0.5,
            radius: 1.0,
            ratio: Some(0.9),
            step_kind: StepKind::Interior,
            accepted: true,
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_default_observers_continue() {
        let mut noop = NoOpObserver;
        assert!(IterationObserver::<f64>::on_iteration(&mut noop, &info(1)));

        let mut logger = LogObserver::new(0);
        assert!(logger.on_iteration(&info(3)));
    }

    #[test]
    fn test_history_observer() {
        let mut history = HistoryObserver::new();
        for k in 1..=3 {
            history.on_iteration(&info(k));
        }
        assert_eq!(history.iterations.len(), 3);
        assert_eq!(history.iterations[2].iteration, 3);
    }
}

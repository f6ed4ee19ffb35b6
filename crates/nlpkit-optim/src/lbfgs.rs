//! Limited-memory BFGS for unconstrained problems.
//!
//! L-BFGS approximates the inverse Hessian from the last `m` correction
//! pairs `(s, y) = (x₊ - x, g₊ - g)` and never forms a matrix. Each
//! iteration:
//!
//! 1. computes the direction `d = -H g` with the two-loop recursion
//!    (steepest descent while the history is empty),
//! 2. runs a line search along `d`,
//! 3. pushes the new pair, unless `sᵀy` is not positive, which would break
//!    positive definiteness of the approximation.
//!
//! When the line search fails with a non-empty history the history is
//! discarded and the iteration is retried along the steepest descent
//! direction; a failure along steepest descent ends the solve.
//!
//! # References
//!
//! - Liu & Nocedal, "On the limited memory BFGS method for large scale
//!   optimization" (1989)
//! - Nocedal & Wright, "Numerical Optimization" (2006)

use crate::{
    solver::Solver,
    utils::{all_finite, SolveContext},
};
use log::{debug, warn};
use nlpkit_core::{
    core::Model,
    error::{SolverError, SolverResult},
    optimization::{
        ConvergenceRecord, Iterate, IterationInfo, IterationObserver, LbfgsHistory, LineSearchKind,
        LineSearchParams, SolverOptions, StepKind, TerminationStatus,
    },
    types::{DVector, Scalar},
};
use num_traits::Float;

/// Configuration for the L-BFGS optimizer.
///
/// The history capacity, the line-search trial budget and the evaluation
/// failure cap come from [`SolverOptions`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LBFGSConfig<T: Scalar> {
    /// Line search algorithm
    pub line_search: LineSearchKind,
    /// Line search parameters; `None` uses the defaults of `line_search`
    pub line_search_params: Option<LineSearchParams<T>>,
    /// Trial step once the history holds curvature information
    pub initial_step_size: T,
}

impl<T: Scalar> Default for LBFGSConfig<T> {
    fn default() -> Self {
        Self {
            line_search: LineSearchKind::default(),
            line_search_params: None,
            initial_step_size: T::one(),
        }
    }
}

impl<T: Scalar> LBFGSConfig<T> {
    /// Creates a new configuration with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the line search algorithm.
    pub fn with_line_search(mut self, kind: LineSearchKind) -> Self {
        self.line_search = kind;
        self
    }

    /// Sets explicit line search parameters.
    pub fn with_line_search_params(mut self, params: LineSearchParams<T>) -> Self {
        self.line_search_params = Some(params);
        self
    }

    /// Sets the initial step size for line search.
    pub fn with_initial_step_size(mut self, step_size: T) -> Self {
        self.initial_step_size = step_size;
        self
    }

    /// Line search parameters with the budgets of `options` applied.
    fn resolved_params(&self, options: &SolverOptions<T>) -> LineSearchParams<T> {
        self.line_search_params
            .clone()
            .unwrap_or_else(|| self.line_search.params())
            .with_max_trials(options.line_search_max_trials)
            .with_max_evaluation_failures(options.max_consecutive_evaluation_failures)
    }
}

/// Limited-memory BFGS solver.
///
/// # Example
///
/// ```
/// use nlpkit_core::prelude::*;
/// use nlpkit_optim::{Solver, LBFGS};
///
/// let problem = Problem::new(
///     2,
///     |x: &DVector<f64>| Ok((x[0] - 1.0).powi(2) + 10.0 * (x[1] + 2.0).powi(2)),
///     |x: &DVector<f64>| Ok(DVector::from_vec(vec![2.0 * (x[0] - 1.0), 20.0 * (x[1] + 2.0)])),
/// );
///
/// let options = SolverOptions::default().with_lbfgs_memory(5);
/// let record = LBFGS::<f64>::default()
///     .minimize(&problem, &DVector::zeros(2), &options)
///     .unwrap();
/// assert!(record.is_converged());
/// ```
#[derive(Debug, Clone, Default)]
pub struct LBFGS<T: Scalar> {
    config: LBFGSConfig<T>,
}

impl<T: Scalar> LBFGS<T> {
    /// Creates a solver with the given configuration.
    pub fn new(config: LBFGSConfig<T>) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LBFGSConfig<T> {
        &self.config
    }
}

impl<T: Scalar> Solver<T> for LBFGS<T> {
    fn name(&self) -> &str {
        "L-BFGS"
    }

    fn minimize_observed<M: Model<T> + ?Sized>(
        &self,
        model: &M,
        x0: &DVector<T>,
        options: &SolverOptions<T>,
        observer: &mut dyn IterationObserver<T>,
    ) -> SolverResult<ConvergenceRecord<T>> {
        if model.has_bounds() {
            return Err(SolverError::invalid_configuration(
                "L-BFGS handles unconstrained problems only, use TRON for bounds",
                "bounds",
                model.name(),
            ));
        }
        if !(self.config.initial_step_size > T::zero()) {
            return Err(SolverError::invalid_configuration(
                "initial step size must be positive",
                "initial_step_size",
                self.config.initial_step_size.to_string(),
            ));
        }
        let params = self.config.resolved_params(options);
        params.validate()?;
        let line_search = self.config.line_search.build(params);
        let mut history = LbfgsHistory::new(options.lbfgs_memory)?;

        let name = self.name();
        let mut ctx = SolveContext::start(name, model, x0, options, observer)?;
        let x = x0.clone();
        let (f, g) = match ctx.evaluate_start(&x) {
            Ok(fg) => fg,
            Err(err) => return Ok(ctx.finish_at_start(x, err)),
        };
        let mut g_norm = g.norm();
        let mut iterate = Iterate::new(x, f, g, 0);

        let mut iterations = 0;
        loop {
            if let Some(status) = ctx.check(iterations, g_norm) {
                return Ok(ctx.finish(status, iterate, g_norm, iterations, None));
            }
            iterations += 1;

            let mut direction = -history.apply_inverse(&iterate.g);
            if !(iterate.g.dot(&direction) < T::zero()) || !all_finite(&direction) {
                debug!("{name}: quasi-Newton direction is not a descent direction, resetting");
                history.clear();
                direction = -&iterate.g;
            }
            let initial_step = if history.is_empty() {
                <T as Float>::min(T::one(), T::one() / g_norm)
            } else {
                self.config.initial_step_size
            };

            let found = match line_search.search(
                &ctx.model,
                &iterate.x,
                iterate.f,
                &iterate.g,
                &direction,
                initial_step,
            ) {
                Ok(found) => found,
                Err(err) if !history.is_empty() && is_line_search_error(&err) => {
                    warn!("{name}: {err}, restarting from steepest descent");
                    history.clear();
                    let info = IterationInfo {
                        iteration: iterations,
                        objective: iterate.f,
                        projected_gradient_norm: g_norm,
                        step_norm: T::zero(),
                        radius: T::zero(),
                        ratio: None,
                        step_kind: StepKind::LineSearch,
                        accepted: false,
                        elapsed: ctx.elapsed(),
                    };
                    if !ctx.notify(&info) {
                        return Ok(ctx.finish(
                            TerminationStatus::UserRequested,
                            iterate,
                            g_norm,
                            iterations,
                            None,
                        ));
                    }
                    continue;
                }
                Err(err) => {
                    let status = TerminationStatus::from_error(&err);
                    return Ok(ctx.finish(status, iterate, g_norm, iterations, Some(err)));
                }
            };

            let s = &found.point - &iterate.x;
            let y = &found.gradient - &iterate.g;
            let step_norm = s.norm();
            ctx.model.accept_step(&s, &y);
            if !history.try_push(s, y) {
                debug!("{name}: curvature condition failed, correction pair skipped");
            }

            let f_old = iterate.f;
            let x_norm = iterate.x.norm();
            g_norm = found.gradient.norm();
            iterate = Iterate::new(found.point, found.value, found.gradient, iterations);

            let info = IterationInfo {
                iteration: iterations,
                objective: iterate.f,
                projected_gradient_norm: g_norm,
                step_norm,
                radius: found.step_size,
                ratio: None,
                step_kind: StepKind::LineSearch,
                accepted: true,
                elapsed: ctx.elapsed(),
            };
            if !ctx.notify(&info) {
                return Ok(ctx.finish(
                    TerminationStatus::UserRequested,
                    iterate,
                    g_norm,
                    iterations,
                    None,
                ));
            }
            if let Some(status) = ctx.check_step(f_old, iterate.f, step_norm, x_norm) {
                return Ok(ctx.finish(status, iterate, g_norm, iterations, None));
            }
        }
    }
}

/// Failures that a restart along steepest descent may get past.
fn is_line_search_error(err: &SolverError) -> bool {
    matches!(
        err,
        SolverError::LineSearchFailed { .. } | SolverError::EvaluationFailures { .. }
    )
}

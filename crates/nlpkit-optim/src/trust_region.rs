//! Trust-region globalization shared by TRON and trunk.
//!
//! Each outer iteration asks a step computer for a trial step inside the
//! current radius, evaluates the objective there and compares the actual
//! decrease with the decrease predicted by the quadratic model:
//!
//! ```text
//! ρ = (f(x) - f(x + s)) / (-(gᵀs + ½ sᵀHs))
//! ```
//!
//! The step is accepted when `ρ` exceeds the acceptance ratio. The radius
//! shrinks when `ρ` is small, grows when `ρ` is large and the step reached
//! the boundary, and is left alone otherwise, so a run of poor steps can
//! never make it grow.
//!
//! Evaluation errors at a trial point shrink the radius and are retried;
//! a run of them longer than the configured cap is fatal. A run of rejected
//! steps longer than its cap ends the solve with stagnation.

use crate::{
    tcg::{boundary_step, TruncatedCgConfig},
    utils::{all_finite, optimality, SolveContext},
};
use log::{debug, warn};
use nlpkit_core::{
    core::{Bounds, Model},
    error::{SolverError, SolverResult},
    linalg::{LinearSolver, LinearSolverKind},
    optimization::{
        ConvergenceRecord, Iterate, IterationInfo, IterationObserver, LineSearchResult,
        SolverOptions, StepKind, TerminationStatus,
    },
    types::{DMatrix, DVector, Scalar},
};
use num_traits::Float;

/// How the trust-region subproblem is solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SubproblemMethod {
    /// Steihaug-Toint truncated conjugate gradient, matrix-free
    #[default]
    TruncatedCg,
    /// Exact Newton solve with a dense factorization, truncated to the ball
    Direct(LinearSolverKind),
}

impl SubproblemMethod {
    pub(crate) fn linear_solver<T: Scalar>(self) -> Option<Box<dyn LinearSolver<T>>> {
        match self {
            Self::TruncatedCg => None,
            Self::Direct(kind) => Some(kind.build()),
        }
    }
}

/// Configuration for trust-region solvers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrustRegionConfig<T: Scalar> {
    /// Maximum trust region radius
    pub max_radius: T,
    /// Ratio threshold for accepting a step
    pub acceptance_ratio: T,
    /// Ratio below which the radius shrinks (typically 0.25)
    pub decrease_threshold: T,
    /// Ratio above which a boundary step grows the radius (typically 0.75)
    pub increase_threshold: T,
    /// Factor applied when shrinking (typically 0.25)
    pub decrease_factor: T,
    /// Factor applied when growing (typically 2.0)
    pub increase_factor: T,
    /// Subproblem solver
    pub subproblem: SubproblemMethod,
    /// Truncated CG settings, used when `subproblem` is `TruncatedCg`
    pub cg: TruncatedCgConfig<T>,
}

impl<T: Scalar> Default for TrustRegionConfig<T> {
    fn default() -> Self {
        Self {
            max_radius: <T as Scalar>::from_f64(1e10),
            acceptance_ratio: <T as Scalar>::from_f64(1e-4),
            decrease_threshold: <T as Scalar>::from_f64(0.25),
            increase_threshold: <T as Scalar>::from_f64(0.75),
            decrease_factor: <T as Scalar>::from_f64(0.25),
            increase_factor: <T as Scalar>::from_f64(2.0),
            subproblem: SubproblemMethod::default(),
            cg: TruncatedCgConfig::default(),
        }
    }
}

impl<T: Scalar> TrustRegionConfig<T> {
    /// Creates a new configuration with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum trust region radius.
    pub fn with_max_radius(mut self, radius: T) -> Self {
        self.max_radius = radius;
        self
    }

    /// Sets the acceptance ratio threshold.
    pub fn with_acceptance_ratio(mut self, ratio: T) -> Self {
        self.acceptance_ratio = ratio;
        self
    }

    /// Sets the subproblem solver.
    pub fn with_subproblem(mut self, subproblem: SubproblemMethod) -> Self {
        self.subproblem = subproblem;
        self
    }

    /// Sets the truncated CG configuration.
    pub fn with_cg(mut self, cg: TruncatedCgConfig<T>) -> Self {
        self.cg = cg;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SolverResult<()> {
        let invalid = |reason: &str, parameter: &str, value: T| {
            Err(SolverError::invalid_configuration(reason, parameter, value.to_string()))
        };

        if !(self.max_radius > T::zero()) {
            return invalid("maximum radius must be positive", "max_radius", self.max_radius);
        }
        if !(self.acceptance_ratio >= T::zero()
            && self.acceptance_ratio < self.decrease_threshold)
        {
            return invalid(
                "acceptance ratio must be in [0, decrease_threshold)",
                "acceptance_ratio",
                self.acceptance_ratio,
            );
        }
        if !(self.decrease_threshold <= self.increase_threshold
            && self.increase_threshold < T::one())
        {
            return invalid(
                "thresholds must satisfy decrease_threshold <= increase_threshold < 1",
                "increase_threshold",
                self.increase_threshold,
            );
        }
        if !(self.decrease_factor > T::zero() && self.decrease_factor < T::one()) {
            return invalid(
                "decrease factor must be in (0, 1)",
                "decrease_factor",
                self.decrease_factor,
            );
        }
        if !(self.increase_factor > T::one()) {
            return invalid(
                "increase factor must exceed 1",
                "increase_factor",
                self.increase_factor,
            );
        }
        self.cg.validate()
    }
}

/// Radius bookkeeping of one trust-region solve.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustRegionState<T: Scalar> {
    /// Current radius
    pub radius: T,
    /// Ratio of the last evaluated step
    pub ratio: Option<T>,
    /// Rejected steps since the last accepted one
    pub consecutive_rejections: usize,
    /// Failed evaluations since the last successful one
    pub consecutive_failures: usize,
}

impl<T: Scalar> TrustRegionState<T> {
    /// Fresh state with the given radius.
    pub fn new(radius: T) -> Self {
        Self {
            radius,
            ratio: None,
            consecutive_rejections: 0,
            consecutive_failures: 0,
        }
    }

    /// Radius update after an evaluated step of norm `step_norm`.
    pub fn update(
        &mut self,
        config: &TrustRegionConfig<T>,
        ratio: T,
        step_norm: T,
        hit_boundary: bool,
    ) {
        self.ratio = Some(ratio);
        if ratio < config.decrease_threshold {
            let base = if step_norm > T::zero() {
                <T as Float>::min(step_norm, self.radius)
            } else {
                self.radius
            };
            self.radius = config.decrease_factor * base;
        } else if ratio > config.increase_threshold && hit_boundary {
            self.radius =
                <T as Float>::min(config.increase_factor * self.radius, config.max_radius);
        }
    }

    /// Radius update after a failed evaluation.
    pub fn shrink(&mut self, config: &TrustRegionConfig<T>) {
        self.ratio = None;
        self.radius = config.decrease_factor * self.radius;
    }
}

/// Actual-to-predicted decrease ratio.
///
/// A step predicting no decrease gets `-∞`, which no acceptance ratio admits.
pub fn reduction_ratio<T: Scalar>(f: T, f_new: T, predicted_decrease: T) -> T {
    if !(predicted_decrease > T::zero()) {
        return <T as Float>::neg_infinity();
    }
    (f - f_new) / predicted_decrease
}

/// Whether a step of norm `step_norm` reached the boundary of the ball.
fn hit_boundary<T: Scalar>(kind: StepKind, step_norm: T, radius: T) -> bool {
    matches!(kind, StepKind::Boundary | StepKind::NegativeCurvature)
        || step_norm >= <T as Scalar>::from_f64(0.99) * radius
}

/// A trial step proposed by a step computer.
#[derive(Debug, Clone)]
pub(crate) struct TrialStep<T: Scalar> {
    /// Feasible trial point `x + s`
    pub point: DVector<T>,
    /// The step `s`
    pub step: DVector<T>,
    /// Model decrease `-(gᵀs + ½ sᵀHs)`
    pub predicted_decrease: T,
    pub kind: StepKind,
}

/// Produces trial steps for the shared trust-region loop.
pub(crate) trait StepComputer<T: Scalar> {
    /// Trial step from `iterate` within `radius`.
    fn compute(
        &mut self,
        model: &dyn Model<T>,
        bounds: &Bounds<T>,
        iterate: &Iterate<T>,
        radius: T,
        pg_norm: T,
    ) -> SolverResult<TrialStep<T>>;

    /// Second chance for a rejected step whose objective value is `value`.
    fn recover(
        &mut self,
        _model: &dyn Model<T>,
        _iterate: &Iterate<T>,
        _trial: &TrialStep<T>,
        _value: T,
    ) -> SolverResult<Option<LineSearchResult<T>>> {
        Ok(None)
    }
}

enum Outcome<T: Scalar> {
    Failed { reason: String },
    Rejected { trial: TrialStep<T>, value: T, ratio: T },
    Accepted { trial: TrialStep<T>, value: T, gradient: DVector<T>, ratio: T },
    Recovered { found: LineSearchResult<T>, ratio: T },
}

/// Computes and evaluates one trial step.
fn attempt<T: Scalar, S: StepComputer<T>>(
    stepper: &mut S,
    model: &dyn Model<T>,
    bounds: &Bounds<T>,
    iterate: &Iterate<T>,
    radius: T,
    pg_norm: T,
    config: &TrustRegionConfig<T>,
) -> SolverResult<Outcome<T>> {
    let trial = match stepper.compute(model, bounds, iterate, radius, pg_norm) {
        Ok(trial) => trial,
        Err(SolverError::Model(err)) if err.is_recoverable() => {
            return Ok(Outcome::Failed { reason: err.to_string() })
        }
        Err(err) => return Err(err),
    };

    let value = match model.objective(&trial.point) {
        Ok(value) if Float::is_finite(value) => value,
        Ok(_) => {
            return Ok(Outcome::Failed {
                reason: "non-finite objective at trial point".to_string(),
            })
        }
        Err(err) if err.is_recoverable() => return Ok(Outcome::Failed { reason: err.to_string() }),
        Err(err) => return Err(err.into()),
    };

    let ratio = reduction_ratio(iterate.f, value, trial.predicted_decrease);
    if !(ratio > config.acceptance_ratio) {
        return Ok(Outcome::Rejected { trial, value, ratio });
    }

    match model.gradient(&trial.point) {
        Ok(gradient) if all_finite(&gradient) => Ok(Outcome::Accepted {
            trial,
            value,
            gradient,
            ratio,
        }),
        Ok(_) => Ok(Outcome::Failed {
            reason: "non-finite gradient at trial point".to_string(),
        }),
        Err(err) if err.is_recoverable() => Ok(Outcome::Failed { reason: err.to_string() }),
        Err(err) => Err(err.into()),
    }
}

/// Replaces the iterate after an accepted step and returns the new
/// projected-gradient norm.
fn advance<T: Scalar>(
    model: &dyn Model<T>,
    bounds: &Bounds<T>,
    iterate: &mut Iterate<T>,
    point: DVector<T>,
    value: T,
    gradient: DVector<T>,
    iteration: usize,
) -> T {
    let s = &point - &iterate.x;
    let y = &gradient - &iterate.g;
    model.accept_step(&s, &y);

    let (pg_norm, active) = optimality(bounds, &point, &gradient);
    *iterate = Iterate::new(point, value, gradient, iteration).with_active(active);
    pg_norm
}

/// The shared outer loop.
pub(crate) fn run<T, M, S>(
    name: &str,
    stepper: &mut S,
    config: &TrustRegionConfig<T>,
    model: &M,
    x0: &DVector<T>,
    options: &SolverOptions<T>,
    observer: &mut dyn IterationObserver<T>,
) -> SolverResult<ConvergenceRecord<T>>
where
    T: Scalar,
    M: Model<T> + ?Sized,
    S: StepComputer<T>,
{
    config.validate()?;
    let mut ctx = SolveContext::start(name, model, x0, options, observer)?;
    let bounds = Bounds::from_model(model)?;

    let x = bounds.project(x0);
    let (f, g) = match ctx.evaluate_start(&x) {
        Ok(fg) => fg,
        Err(err) => return Ok(ctx.finish_at_start(x, err)),
    };
    let (mut pg_norm, active) = optimality(&bounds, &x, &g);
    let mut iterate = Iterate::new(x, f, g, 0).with_active(active);

    let initial_radius = options.trust_region_initial_radius.unwrap_or(if pg_norm > T::zero() {
        pg_norm
    } else {
        T::one()
    });
    let mut state = TrustRegionState::new(<T as Float>::min(initial_radius, config.max_radius));
    debug!(
        "{name}: f0 = {:e}, |pg0| = {:.3e}, radius0 = {:.3e}",
        Scalar::to_f64(iterate.f),
        Scalar::to_f64(pg_norm),
        Scalar::to_f64(state.radius)
    );

    let mut iterations = 0;
    loop {
        if let Some(status) = ctx.check(iterations, pg_norm) {
            return Ok(ctx.finish(status, iterate, pg_norm, iterations, None));
        }
        iterations += 1;
        let radius = state.radius;

        let attempted = attempt(stepper, &ctx.model, &bounds, &iterate, radius, pg_norm, config);
        let outcome = match attempted {
            Ok(Outcome::Rejected { trial, value, ratio }) => {
                match stepper.recover(&ctx.model, &iterate, &trial, value) {
                    Ok(Some(found)) => Ok(Outcome::Recovered { found, ratio }),
                    Ok(None) => Ok(Outcome::Rejected { trial, value, ratio }),
                    Err(err) => Err(err),
                }
            }
            other => other,
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                let status = TerminationStatus::from_error(&err);
                return Ok(ctx.finish(status, iterate, pg_norm, iterations, Some(err)));
            }
        };

        let mut step_status = None;
        let (accepted, step_norm, step_kind) = match outcome {
            Outcome::Failed { reason } => {
                state.consecutive_failures += 1;
                state.shrink(config);
                warn!(
                    "{name}: evaluation failed at trial point ({reason}), radius reduced to {:.3e}",
                    Scalar::to_f64(state.radius)
                );
                if state.consecutive_failures > options.max_consecutive_evaluation_failures {
                    let err = SolverError::evaluation_failures(state.consecutive_failures, reason);
                    return Ok(ctx.finish(
                        TerminationStatus::EvaluationFailure,
                        iterate,
                        pg_norm,
                        iterations,
                        Some(err),
                    ));
                }
                (false, T::zero(), StepKind::Interior)
            }
            Outcome::Rejected { trial, ratio, .. } => {
                state.consecutive_failures = 0;
                state.consecutive_rejections += 1;
                let step_norm = trial.step.norm();
                state.update(config, ratio, step_norm, hit_boundary(trial.kind, step_norm, radius));
                if state.consecutive_rejections > options.max_consecutive_rejections {
                    let err = SolverError::stagnation(
                        state.consecutive_rejections,
                        Scalar::to_f64(state.radius),
                    );
                    return Ok(ctx.finish(
                        TerminationStatus::Stagnation,
                        iterate,
                        pg_norm,
                        iterations,
                        Some(err),
                    ));
                }
                (false, step_norm, trial.kind)
            }
            Outcome::Accepted {
                trial,
                value,
                gradient,
                ratio,
            } => {
                let step_norm = trial.step.norm();
                state.update(config, ratio, step_norm, hit_boundary(trial.kind, step_norm, radius));
                state.consecutive_failures = 0;
                state.consecutive_rejections = 0;

                let f_old = iterate.f;
                let x_norm = iterate.x.norm();
                pg_norm = advance(
                    &ctx.model,
                    &bounds,
                    &mut iterate,
                    trial.point,
                    value,
                    gradient,
                    iterations,
                );
                step_status = ctx.check_step(f_old, value, step_norm, x_norm);
                (true, step_norm, trial.kind)
            }
            Outcome::Recovered { found, ratio } => {
                let step_norm = (&found.point - &iterate.x).norm();
                debug!(
                    "{name}: rejected step (ratio {:.3e}) recovered by line search, step {:e}",
                    Scalar::to_f64(ratio),
                    Scalar::to_f64(found.step_size)
                );
                state.ratio = Some(ratio);
                state.radius = <T as Float>::min(
                    <T as Float>::max(step_norm, T::EPSILON),
                    config.max_radius,
                );
                state.consecutive_failures = 0;
                state.consecutive_rejections = 0;

                let f_old = iterate.f;
                let x_norm = iterate.x.norm();
                let value = found.value;
                pg_norm = advance(
                    &ctx.model,
                    &bounds,
                    &mut iterate,
                    found.point,
                    value,
                    found.gradient,
                    iterations,
                );
                step_status = ctx.check_step(f_old, value, step_norm, x_norm);
                (true, step_norm, StepKind::LineSearch)
            }
        };

        let info = IterationInfo {
            iteration: iterations,
            objective: iterate.f,
            projected_gradient_norm: pg_norm,
            step_norm,
            radius: state.radius,
            ratio: state.ratio,
            step_kind,
            accepted,
            elapsed: ctx.elapsed(),
        };
        if !ctx.notify(&info) {
            return Ok(ctx.finish(
                TerminationStatus::UserRequested,
                iterate,
                pg_norm,
                iterations,
                None,
            ));
        }
        if let Some(status) = step_status {
            return Ok(ctx.finish(status, iterate, pg_norm, iterations, None));
        }
    }
}

/// Exact Newton step on the free variables, truncated to the ball around
/// `offset`.
///
/// Solves `H_FF w_F = -g_F` with the given backend; fixed components of the
/// result are zero.
pub(crate) fn direct_step<T: Scalar>(
    solver: &mut dyn LinearSolver<T>,
    hessian: &DMatrix<T>,
    g: &DVector<T>,
    free: &[bool],
    offset: &DVector<T>,
    radius: T,
) -> SolverResult<(DVector<T>, StepKind)> {
    let n = g.len();
    let index: Vec<usize> = (0..n).filter(|&i| free[i]).collect();
    let mut w = DVector::zeros(n);
    if index.is_empty() {
        return Ok((w, StepKind::Direct));
    }

    let reduced = DMatrix::from_fn(index.len(), index.len(), |i, j| hessian[(index[i], index[j])]);
    let rhs = DVector::from_fn(index.len(), |i, _| -g[index[i]]);
    solver.factorize(&reduced)?;
    let solution = solver.solve(&rhs)?;
    if !all_finite(&solution) {
        return Err(SolverError::singular_system(format!(
            "{} produced a non-finite solution",
            solver.name()
        )));
    }
    for (k, &i) in index.iter().enumerate() {
        w[i] = solution[k];
    }

    let tau = boundary_step(offset, &w, radius);
    if tau < T::one() {
        w *= tau;
        return Ok((w, StepKind::Boundary));
    }
    Ok((w, StepKind::Direct))
}

//! Line search algorithms.
//!
//! A line search picks the step length `α` along a descent direction `d`
//! from the current point `x`, evaluating every trial point through the
//! model.
//!
//! # Conditions
//!
//! ### Armijo (sufficient decrease)
//! f(x + α d) ≤ f(x) + c₁ α ∇f(x)ᵀd
//!
//! ### Weak Wolfe curvature
//! ∇f(x + α d)ᵀd ≥ c₂ ∇f(x)ᵀd
//!
//! ### Strong Wolfe curvature
//! |∇f(x + α d)ᵀd| ≤ c₂ |∇f(x)ᵀd|
//!
//! with 0 < c₁ < c₂ < 1, typically c₁ = 10⁻⁴ and c₂ = 0.9.
//!
//! # Algorithms
//!
//! - [`BacktrackingLineSearch`]: Armijo only. Shrinks the step by safeguarded
//!   quadratic interpolation until sufficient decrease holds. The gradient is
//!   evaluated once, at the accepted point.
//! - [`WolfeLineSearch`]: bracketing by doubling and bisection until the weak
//!   or strong Wolfe conditions hold.
//!
//! # Evaluation failures
//!
//! A trial point where the model reports [`ModelError::Evaluation`] or a
//! non-finite value is treated as a step that is too long. A run of more
//! than `max_evaluation_failures` consecutive failures aborts the search
//! with [`SolverError::EvaluationFailures`]. Exhausting `max_trials` or
//! shrinking below `min_step_size` aborts it with
//! [`SolverError::LineSearchFailed`].

use crate::{
    core::model::Model,
    error::{ModelError, SolverError, SolverResult},
    types::{DVector, Scalar},
};
use log::debug;
use num_traits::Float;
use std::fmt::Debug;

/// Which curvature condition a line search enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CurvatureCondition {
    /// Armijo condition only.
    None,
    /// Weak Wolfe curvature condition.
    Weak,
    /// Strong Wolfe curvature condition.
    Strong,
}

/// Parameters shared by the line search algorithms.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineSearchParams<T: Scalar> {
    /// Upper bound on trial step lengths
    pub max_step_size: T,
    /// Smallest step length tried before declaring failure
    pub min_step_size: T,
    /// Cap on trial points per search
    pub max_trials: usize,
    /// Armijo parameter c₁ ∈ (0, 1)
    pub c1: T,
    /// Curvature parameter c₂ ∈ (c₁, 1)
    pub c2: T,
    /// Largest backtracking contraction factor ρ ∈ (0, 1)
    pub rho: T,
    /// Curvature condition enforced by the Wolfe search
    pub condition: CurvatureCondition,
    /// Consecutive evaluation failures tolerated within one search
    pub max_evaluation_failures: usize,
}

impl<T: Scalar> Default for LineSearchParams<T> {
    fn default() -> Self {
        Self {
            max_step_size: <T as Scalar>::from_f64(1e10),
            min_step_size: T::MIN_STEP_SIZE,
            max_trials: 20,
            c1: <T as Scalar>::from_f64(1e-4),
            c2: <T as Scalar>::from_f64(0.9),
            rho: <T as Scalar>::from_f64(0.5),
            condition: CurvatureCondition::Weak,
            max_evaluation_failures: 10,
        }
    }
}

impl<T: Scalar> LineSearchParams<T> {
    /// Armijo backtracking parameters.
    pub fn backtracking() -> Self {
        Self {
            condition: CurvatureCondition::None,
            ..Self::default()
        }
    }

    /// Weak Wolfe parameters (c₁ = 10⁻⁴, c₂ = 0.9).
    pub fn wolfe() -> Self {
        Self::default()
    }

    /// Strong Wolfe parameters (c₁ = 10⁻⁴, c₂ = 0.9).
    pub fn strong_wolfe() -> Self {
        Self {
            condition: CurvatureCondition::Strong,
            ..Self::default()
        }
    }

    /// Sets the trial cap.
    pub fn with_max_trials(mut self, max_trials: usize) -> Self {
        self.max_trials = max_trials;
        self
    }

    /// Sets the consecutive evaluation-failure cap.
    pub fn with_max_evaluation_failures(mut self, cap: usize) -> Self {
        self.max_evaluation_failures = cap;
        self
    }

    /// Validates the parameters.
    pub fn validate(&self) -> SolverResult<()> {
        let invalid = |reason: &str, parameter: &str, value: String| {
            Err(SolverError::invalid_configuration(reason, parameter, value))
        };

        if !(self.min_step_size > T::zero()) {
            return invalid("minimum step size must be positive", "min_step_size", self.min_step_size.to_string());
        }
        if self.max_step_size <= self.min_step_size {
            return invalid(
                "maximum step size must exceed the minimum step size",
                "max_step_size",
                self.max_step_size.to_string(),
            );
        }
        if !(self.c1 > T::zero() && self.c1 < T::one()) {
            return invalid("Armijo constant c1 must be in (0, 1)", "c1", self.c1.to_string());
        }
        if !(self.c2 > self.c1 && self.c2 < T::one()) {
            return invalid("curvature constant c2 must satisfy c1 < c2 < 1", "c2", self.c2.to_string());
        }
        if !(self.rho > T::zero() && self.rho < T::one()) {
            return invalid("contraction factor rho must be in (0, 1)", "rho", self.rho.to_string());
        }
        if self.max_trials == 0 {
            return invalid("at least one trial is required", "max_trials", "0".to_string());
        }
        if self.max_evaluation_failures == 0 {
            return invalid(
                "at least one evaluation failure must be tolerated",
                "max_evaluation_failures",
                "0".to_string(),
            );
        }
        Ok(())
    }
}

/// Accepted step of a line search.
#[derive(Debug, Clone)]
pub struct LineSearchResult<T: Scalar> {
    /// Accepted step length α
    pub step_size: T,
    /// New point x + α d
    pub point: DVector<T>,
    /// Objective at the new point
    pub value: T,
    /// Gradient at the new point
    pub gradient: DVector<T>,
    /// Trial points evaluated
    pub trials: usize,
    /// Trial points whose evaluation failed
    pub evaluation_failures: usize,
}

/// Trait for line search algorithms.
pub trait LineSearch<T: Scalar>: Debug {
    /// Name of the algorithm.
    fn name(&self) -> &str;

    /// Parameters in use.
    fn params(&self) -> &LineSearchParams<T>;

    /// Searches along `direction` from `x`.
    ///
    /// `f0` and `g0` are the objective and gradient at `x`; `direction` must
    /// be a descent direction (`g0ᵀd < 0`).
    fn search(
        &self,
        model: &dyn Model<T>,
        x: &DVector<T>,
        f0: T,
        g0: &DVector<T>,
        direction: &DVector<T>,
        initial_step: T,
    ) -> SolverResult<LineSearchResult<T>>;
}

/// Selects a line search algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LineSearchKind {
    /// [`BacktrackingLineSearch`]
    Backtracking,
    /// [`WolfeLineSearch`] with the weak curvature condition
    #[default]
    Wolfe,
    /// [`WolfeLineSearch`] with the strong curvature condition
    StrongWolfe,
}

impl LineSearchKind {
    /// Default parameters for this kind.
    pub fn params<T: Scalar>(self) -> LineSearchParams<T> {
        match self {
            Self::Backtracking => LineSearchParams::backtracking(),
            Self::Wolfe => LineSearchParams::wolfe(),
            Self::StrongWolfe => LineSearchParams::strong_wolfe(),
        }
    }

    /// Instantiates the algorithm with `params`.
    pub fn build<T: Scalar>(self, params: LineSearchParams<T>) -> Box<dyn LineSearch<T>> {
        match self {
            Self::Backtracking => Box::new(BacktrackingLineSearch::new(params)),
            Self::Wolfe | Self::StrongWolfe => Box::new(WolfeLineSearch::new(params)),
        }
    }
}

/// Outcome of evaluating one trial point.
enum Trial<T> {
    Value(T),
    Failed(String),
}

/// Tracks the run of consecutive evaluation failures within one search.
struct FailureRun {
    current: usize,
    total: usize,
    cap: usize,
}

impl FailureRun {
    fn new(cap: usize) -> Self {
        Self {
            current: 0,
            total: 0,
            cap,
        }
    }

    fn record(&mut self, reason: String) -> SolverResult<()> {
        self.current += 1;
        self.total += 1;
        debug!("line search: evaluation failure {} ({reason})", self.current);
        if self.current > self.cap {
            return Err(SolverError::evaluation_failures(self.current, reason));
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.current = 0;
    }
}

/// Maps a model result to a trial outcome; non-recoverable errors propagate.
fn classify<V>(result: Result<V, ModelError>) -> SolverResult<Trial<V>> {
    match result {
        Ok(v) => Ok(Trial::Value(v)),
        Err(err) if err.is_recoverable() => Ok(Trial::Failed(err.to_string())),
        Err(err) => Err(err.into()),
    }
}

fn all_finite<T: Scalar>(v: &DVector<T>) -> bool {
    v.iter().all(|&vi| Float::is_finite(vi))
}

fn descent_slope<T: Scalar>(g0: &DVector<T>, direction: &DVector<T>, f0: T) -> SolverResult<T> {
    let slope = g0.dot(direction);
    if slope < T::zero() && Float::is_finite(slope) {
        Ok(slope)
    } else {
        Err(SolverError::line_search_failed(
            "search direction is not a descent direction",
            0,
            0.0,
            Scalar::to_f64(f0),
        ))
    }
}

/// Armijo backtracking with safeguarded quadratic interpolation.
#[derive(Debug, Clone, Default)]
pub struct BacktrackingLineSearch<T: Scalar> {
    params: LineSearchParams<T>,
}

impl<T: Scalar> BacktrackingLineSearch<T> {
    /// Creates a backtracking search.
    pub fn new(params: LineSearchParams<T>) -> Self {
        Self { params }
    }
}

impl<T: Scalar> LineSearch<T> for BacktrackingLineSearch<T> {
    fn name(&self) -> &str {
        "backtracking"
    }

    fn params(&self) -> &LineSearchParams<T> {
        &self.params
    }

    fn search(
        &self,
        model: &dyn Model<T>,
        x: &DVector<T>,
        f0: T,
        g0: &DVector<T>,
        direction: &DVector<T>,
        initial_step: T,
    ) -> SolverResult<LineSearchResult<T>> {
        let p = &self.params;
        let slope = descent_slope(g0, direction, f0)?;
        let tenth = <T as Scalar>::from_f64(0.1);
        let two = <T as Scalar>::from_f64(2.0);

        let mut alpha = <T as Float>::min(initial_step, p.max_step_size);
        let mut failures = FailureRun::new(p.max_evaluation_failures);

        for trial in 1..=p.max_trials {
            if alpha < p.min_step_size {
                return Err(SolverError::line_search_failed(
                    "step length below minimum",
                    trial - 1,
                    Scalar::to_f64(alpha),
                    Scalar::to_f64(f0),
                ));
            }

            let point = x + direction * alpha;
            let ft = match classify(model.objective(&point))? {
                Trial::Value(ft) if Float::is_finite(ft) => ft,
                Trial::Value(_) => {
                    failures.record("non-finite objective".to_string())?;
                    alpha *= p.rho;
                    continue;
                }
                Trial::Failed(reason) => {
                    failures.record(reason)?;
                    alpha *= p.rho;
                    continue;
                }
            };
            failures.reset();

            if ft <= f0 + p.c1 * alpha * slope {
                match classify(model.gradient(&point))? {
                    Trial::Value(gradient) if all_finite(&gradient) => {
                        return Ok(LineSearchResult {
                            step_size: alpha,
                            point,
                            value: ft,
                            gradient,
                            trials: trial,
                            evaluation_failures: failures.total,
                        });
                    }
                    Trial::Value(_) => {
                        failures.record("non-finite gradient".to_string())?;
                        alpha *= p.rho;
                        continue;
                    }
                    Trial::Failed(reason) => {
                        failures.record(reason)?;
                        alpha *= p.rho;
                        continue;
                    }
                }
            }

            // Minimizer of the quadratic through f0, slope and ft, kept in [lo, hi].
            let curvature = two * (ft - f0 - slope * alpha);
            let hi = p.rho * alpha;
            let lo = <T as Float>::min(tenth, p.rho) * alpha;
            let candidate = if curvature > T::zero() {
                -slope * alpha * alpha / curvature
            } else {
                hi
            };
            alpha = <T as Float>::max(<T as Float>::min(candidate, hi), lo);
        }

        Err(SolverError::line_search_failed(
            "trial budget exhausted without sufficient decrease",
            p.max_trials,
            Scalar::to_f64(alpha),
            Scalar::to_f64(f0),
        ))
    }
}

/// Wolfe line search by bracketing and bisection.
///
/// The step doubles until the bracket closes, then bisects. If the trial
/// budget runs out after a point satisfying the Armijo condition was found,
/// that point is returned.
#[derive(Debug, Clone)]
pub struct WolfeLineSearch<T: Scalar> {
    params: LineSearchParams<T>,
}

impl<T: Scalar> Default for WolfeLineSearch<T> {
    fn default() -> Self {
        Self::new(LineSearchParams::wolfe())
    }
}

impl<T: Scalar> WolfeLineSearch<T> {
    /// Creates a Wolfe search. `CurvatureCondition::None` is read as weak.
    pub fn new(params: LineSearchParams<T>) -> Self {
        Self { params }
    }
}

impl<T: Scalar> LineSearch<T> for WolfeLineSearch<T> {
    fn name(&self) -> &str {
        match self.params.condition {
            CurvatureCondition::Strong => "strong-wolfe",
            _ => "wolfe",
        }
    }

    fn params(&self) -> &LineSearchParams<T> {
        &self.params
    }

    fn search(
        &self,
        model: &dyn Model<T>,
        x: &DVector<T>,
        f0: T,
        g0: &DVector<T>,
        direction: &DVector<T>,
        initial_step: T,
    ) -> SolverResult<LineSearchResult<T>> {
        let p = &self.params;
        let slope = descent_slope(g0, direction, f0)?;
        let strong = p.condition == CurvatureCondition::Strong;
        let half = <T as Scalar>::from_f64(0.5);
        let two = <T as Scalar>::from_f64(2.0);

        let mut lo = T::zero();
        let mut hi = <T as Float>::infinity();
        let mut alpha = <T as Float>::min(initial_step, p.max_step_size);
        let mut failures = FailureRun::new(p.max_evaluation_failures);
        let mut fallback: Option<LineSearchResult<T>> = None;

        for trial in 1..=p.max_trials {
            if alpha < p.min_step_size {
                break;
            }

            let point = x + direction * alpha;
            match classify(model.objective_and_gradient(&point))? {
                Trial::Value((ft, gt)) if Float::is_finite(ft) && all_finite(&gt) => {
                    failures.reset();
                    if ft > f0 + p.c1 * alpha * slope {
                        hi = alpha;
                    } else {
                        let slope_t = gt.dot(direction);
                        let result = LineSearchResult {
                            step_size: alpha,
                            point,
                            value: ft,
                            gradient: gt,
                            trials: trial,
                            evaluation_failures: failures.total,
                        };
                        if slope_t < p.c2 * slope {
                            lo = alpha;
                            fallback = Some(result);
                        } else if strong && slope_t > -p.c2 * slope {
                            hi = alpha;
                            fallback = Some(result);
                        } else {
                            return Ok(result);
                        }
                    }
                }
                Trial::Value(_) => {
                    failures.record("non-finite objective or gradient".to_string())?;
                    hi = alpha;
                }
                Trial::Failed(reason) => {
                    failures.record(reason)?;
                    hi = alpha;
                }
            }

            alpha = if Float::is_finite(hi) {
                (lo + hi) * half
            } else if alpha >= p.max_step_size {
                break;
            } else {
                <T as Float>::min(two * alpha, p.max_step_size)
            };
        }

        if let Some(mut result) = fallback {
            debug!(
                "{}: curvature condition not met, keeping Armijo step {:e}",
                self.name(),
                Scalar::to_f64(result.step_size)
            );
            result.evaluation_failures = failures.total;
            return Ok(result);
        }

        Err(SolverError::line_search_failed(
            "no step satisfying the Wolfe conditions",
            p.max_trials,
            Scalar::to_f64(alpha),
            Scalar::to_f64(f0),
        ))
    }
}

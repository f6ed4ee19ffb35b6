//! TRON: trust-region Newton method for bound-constrained problems.
//!
//! Each iteration works in three stages:
//!
//! 1. **Cauchy step.** A step along the projected steepest-descent path
//!    `P(x - αg) - x` that stays inside the trust region and achieves a
//!    sufficient fraction of the decrease predicted by the linear term. It
//!    fixes the variables that reach a bound and guarantees global
//!    convergence.
//! 2. **Subspace Newton step.** Truncated CG on the variables that are still
//!    free at the Cauchy point, starting from the Cauchy step so that the
//!    combined step respects the radius.
//! 3. **Projected search.** The Newton step is projected back onto the box
//!    and shortened until it does at least as well on the quadratic model as
//!    the Cauchy step.
//!
//! # References
//!
//! - Lin & Moré, "Newton's Method for Large Bound-Constrained Optimization
//!   Problems" (1999)
//! - Conn et al., "Trust Region Methods" (2000)

use crate::{
    solver::Solver,
    tcg::TruncatedCg,
    trust_region::{self, direct_step, StepComputer, TrialStep, TrustRegionConfig},
};
use log::trace;
use nlpkit_core::{
    core::{Bounds, Model},
    error::SolverResult,
    linalg::{
        mask_vector, quadratic_model, HessianOperator, LinearOperator, LinearSolver,
        MaskedOperator,
    },
    optimization::{ConvergenceRecord, Iterate, IterationObserver, SolverOptions, StepKind},
    types::{DVector, Scalar},
};
use num_traits::Float;

/// Sufficient-decrease constant of the Cauchy step.
const CAUCHY_DECREASE: f64 = 0.01;
/// Trials allowed when extrapolating or interpolating the Cauchy step length.
const CAUCHY_TRIALS: usize = 20;
/// Halvings allowed in the projected search along the Newton step.
const PROJECTED_SEARCH_TRIALS: usize = 10;

/// Bound-constrained trust-region Newton solver.
///
/// # Example
///
/// ```
/// use nlpkit_core::prelude::*;
/// use nlpkit_optim::{Solver, Tron};
///
/// // min (x - 2)² subject to x ≤ 1
/// let problem = Problem::new(
///     1,
///     |x: &DVector<f64>| Ok((x[0] - 2.0).powi(2)),
///     |x: &DVector<f64>| Ok(DVector::from_element(1, 2.0 * (x[0] - 2.0))),
/// )
/// .with_upper_bound(1.0);
///
/// let record = Tron::<f64>::default()
///     .minimize(&problem, &DVector::zeros(1), &SolverOptions::default())
///     .unwrap();
/// assert!(record.is_converged());
/// assert!((record.x()[0] - 1.0).abs() < 1e-10);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Tron<T: Scalar> {
    config: TrustRegionConfig<T>,
}

impl<T: Scalar> Tron<T> {
    /// Creates a solver with the given configuration.
    pub fn new(config: TrustRegionConfig<T>) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TrustRegionConfig<T> {
        &self.config
    }
}

impl<T: Scalar> Solver<T> for Tron<T> {
    fn name(&self) -> &str {
        "TRON"
    }

    fn minimize_observed<M: Model<T> + ?Sized>(
        &self,
        model: &M,
        x0: &DVector<T>,
        options: &SolverOptions<T>,
        observer: &mut dyn IterationObserver<T>,
    ) -> SolverResult<ConvergenceRecord<T>> {
        let mut stepper = TronStep::new(&self.config);
        trust_region::run(self.name(), &mut stepper, &self.config, model, x0, options, observer)
    }
}

/// Per-solve state of the TRON step computation.
struct TronStep<T: Scalar> {
    cg: TruncatedCg<T>,
    linear: Option<Box<dyn LinearSolver<T>>>,
    /// Cauchy step length, carried over between iterations
    alpha: T,
}

impl<T: Scalar> TronStep<T> {
    fn new(config: &TrustRegionConfig<T>) -> Self {
        Self {
            cg: TruncatedCg::new(config.cg.clone()),
            linear: config.subproblem.linear_solver(),
            alpha: T::one(),
        }
    }
}

impl<T: Scalar> StepComputer<T> for TronStep<T> {
    fn compute(
        &mut self,
        model: &dyn Model<T>,
        bounds: &Bounds<T>,
        iterate: &Iterate<T>,
        radius: T,
        pg_norm: T,
    ) -> SolverResult<TrialStep<T>> {
        let x = &iterate.x;
        let g = &iterate.g;
        let op = HessianOperator::at(model, x)?;

        let s_c = cauchy_step(&op, bounds, x, g, radius, &mut self.alpha)?;
        let q_c = quadratic_model(&op, g, &s_c)?;
        let x_c = x + &s_c;

        let free: Vec<bool> = bounds
            .binding_mask(&x_c, T::zero())
            .into_iter()
            .map(|binding| !binding)
            .collect();
        let cauchy = TrialStep {
            point: x_c.clone(),
            step: s_c.clone(),
            predicted_decrease: -q_c,
            kind: StepKind::Cauchy,
        };
        if !free.iter().any(|&f| f) {
            return Ok(cauchy);
        }

        // Gradient of the quadratic model at the Cauchy point, restricted to
        // the free variables.
        let g_c = mask_vector(&(g + op.apply(&s_c)?), &free);

        let (w, kind) = match self.linear.as_mut() {
            Some(solver) => {
                let hessian = op.to_dense()?;
                direct_step(solver.as_mut(), &hessian, &g_c, &free, &s_c, radius)?
            }
            None => {
                let masked = MaskedOperator::new(&op, &free);
                let rtol = <T as Float>::min(
                    self.cg.config().relative_tolerance,
                    <T as Float>::sqrt(pg_norm),
                );
                let result = self.cg.solve_from(&masked, &g_c, radius, &s_c, rtol)?;
                trace!(
                    "tron: {} free variables, {} CG iterations, {:?}",
                    masked.free_count(),
                    result.iterations,
                    result.kind
                );
                (result.step, result.kind)
            }
        };

        let half = <T as Scalar>::from_f64(0.5);
        let slack = T::EPSILON * <T as Float>::max(T::one(), <T as Float>::abs(q_c));
        let mut beta = T::one();
        for _ in 0..PROJECTED_SEARCH_TRIALS {
            let point = bounds.project(&(&x_c + &w * beta));
            let step = &point - x;
            let q = quadratic_model(&op, g, &step)?;
            if q <= q_c + slack {
                return Ok(TrialStep {
                    point,
                    step,
                    predicted_decrease: -q,
                    kind,
                });
            }
            beta = beta * half;
        }

        trace!("tron: projected search failed, falling back to the Cauchy step");
        Ok(cauchy)
    }
}

/// Generalized Cauchy step `s(α) = P(x - αg) - x`.
///
/// `α` is accepted when `‖s‖ ≤ Δ` and `q(s) ≤ μ gᵀs`. Starting from the
/// previous iteration's `α`, the length is extrapolated by 10 while the
/// condition holds (and the step still changes), or interpolated by 0.1
/// until it does.
pub(crate) fn cauchy_step<T: Scalar, O: LinearOperator<T>>(
    op: &O,
    bounds: &Bounds<T>,
    x: &DVector<T>,
    g: &DVector<T>,
    radius: T,
    alpha: &mut T,
) -> SolverResult<DVector<T>> {
    let mu = <T as Scalar>::from_f64(CAUCHY_DECREASE);
    let interpolate = <T as Scalar>::from_f64(0.1);
    let extrapolate = <T as Scalar>::from_f64(10.0);

    let trial = |a: T| -> SolverResult<(DVector<T>, bool)> {
        let s = bounds.project(&(x - g * a)) - x;
        if s.norm() > radius {
            return Ok((s, false));
        }
        let q = quadratic_model(op, g, &s)?;
        let ok = q <= mu * g.dot(&s);
        Ok((s, ok))
    };

    let (mut s, sufficient) = trial(*alpha)?;
    if sufficient {
        for _ in 0..CAUCHY_TRIALS {
            let a = *alpha * extrapolate;
            let (next, sufficient) = trial(a)?;
            if !sufficient || next == s {
                break;
            }
            *alpha = a;
            s = next;
        }
    } else {
        for _ in 0..CAUCHY_TRIALS {
            *alpha = *alpha * interpolate;
            let (next, sufficient) = trial(*alpha)?;
            s = next;
            if sufficient {
                break;
            }
        }
    }
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust_region::SubproblemMethod;
    use approx::assert_relative_eq;
    use nlpkit_core::{
        linalg::LinearSolverKind,
        optimization::{HistoryObserver, TerminationStatus},
        types::DMatrix,
        utils::test_problems::Quadratic,
    };

    #[test]
    fn test_cauchy_step_respects_radius_and_bounds() {
        let h = DMatrix::<f64>::identity(2, 2);
        let bounds = Bounds::new(
            DVector::from_vec(vec![-0.1, -10.0]),
            DVector::from_vec(vec![10.0, 10.0]),
        )
        .unwrap();
        let x = DVector::zeros(2);
        let g = DVector::from_vec(vec![1.0, 1.0]);
        let mut alpha = 1.0;

        let s = cauchy_step(&h, &bounds, &x, &g, 0.5, &mut alpha).unwrap();
        assert!(s.norm() <= 0.5 + 1e-12);
        assert!(bounds.contains(&(&x + &s)));
        assert!(g.dot(&s) < 0.0);
        assert!(alpha < 1.0);
    }

    #[test]
    fn test_cauchy_step_extrapolates() {
        let h = DMatrix::<f64>::identity(1, 1) * 1e-4;
        let bounds = Bounds::unbounded(1);
        let x = DVector::zeros(1);
        let g = DVector::from_element(1, 1.0);
        let mut alpha = 1.0;

        let s = cauchy_step(&h, &bounds, &x, &g, 1e3, &mut alpha).unwrap();
        assert!(alpha > 1.0);
        assert!(s.norm() <= 1e3);
    }

    #[test]
    fn test_quadratic_converges_in_one_newton_step() {
        let model = Quadratic::diagonal(&[1.0, 4.0, 9.0], &[1.0, 2.0, 3.0]);
        let options = SolverOptions::default()
            .with_trust_region_initial_radius(100.0)
            .with_gradient_tolerance(1e-9);
        let tron = Tron::new(
            TrustRegionConfig::default()
                .with_cg(crate::tcg::TruncatedCgConfig::default().with_relative_tolerance(1e-12)),
        );
        let record = tron.minimize(&model, &DVector::zeros(3), &options).unwrap();

        assert_eq!(record.status, TerminationStatus::GradientTolerance);
        assert_relative_eq!(record.iterate.x, model.minimizer().unwrap(), epsilon = 1e-8);
        assert!(record.iterations <= 3);
    }

    #[test]
    fn test_active_bounds_reported() {
        let model = Quadratic::diagonal(&[1.0, 1.0], &[2.0, -2.0])
            .with_bounds(DVector::from_vec(vec![-1.0, -1.0]), DVector::from_vec(vec![1.0, 1.0]));
        let record = Tron::<f64>::default()
            .minimize(&model, &DVector::zeros(2), &SolverOptions::default())
            .unwrap();

        assert!(record.is_converged());
        assert_relative_eq!(record.iterate.x, DVector::from_vec(vec![1.0, -1.0]), epsilon = 1e-10);
        assert_eq!(record.iterate.active, vec![true, true]);
    }

    #[test]
    fn test_direct_subproblem() {
        let model = Quadratic::laplacian(6).with_sparse_hessian();
        let tron = Tron::new(
            TrustRegionConfig::default()
                .with_subproblem(SubproblemMethod::Direct(LinearSolverKind::Cholesky)),
        );
        let mut history = HistoryObserver::new();
        let record = tron
            .minimize_observed(&model, &DVector::zeros(6), &SolverOptions::default(), &mut history)
            .unwrap();

        assert!(record.is_converged());
        assert_relative_eq!(record.iterate.x, model.minimizer().unwrap(), epsilon = 1e-7);
        assert!(history.iterations.iter().any(|info| info.step_kind == StepKind::Direct));
    }

    #[test]
    fn test_direct_subproblem_singular_status() {
        // Concave in the second coordinate: Cholesky cannot factorize.
        let model = Quadratic::diagonal(&[1.0, -1.0], &[1.0, 1.0])
            .with_bounds(DVector::from_vec(vec![-5.0, -5.0]), DVector::from_vec(vec![5.0, 5.0]));
        let tron = Tron::new(
            TrustRegionConfig::default()
                .with_subproblem(SubproblemMethod::Direct(LinearSolverKind::Cholesky)),
        );
        let record = tron
            .minimize(&model, &DVector::from_vec(vec![0.5, 0.5]), &SolverOptions::default())
            .unwrap();

        assert_eq!(record.status, TerminationStatus::SingularSystem);
        assert!(record.error.is_some());
    }
}

//! Trunk: trust-region Newton-CG for unconstrained problems.
//!
//! The unconstrained specialization of [`Tron`](crate::Tron): no Cauchy
//! step and no active set, the truncated CG step is the trial step. A
//! rejected step that still points downhill may be rescued by a
//! backtracking line search along it, in which case the radius is reset to
//! the length of the step the line search accepted.

use crate::{
    solver::Solver,
    tcg::TruncatedCg,
    trust_region::{self, direct_step, StepComputer, TrialStep, TrustRegionConfig},
};
use log::{debug, trace};
use nlpkit_core::{
    core::{Bounds, Model},
    error::{SolverError, SolverResult},
    linalg::{quadratic_model, HessianOperator, LinearSolver},
    optimization::{
        BacktrackingLineSearch, ConvergenceRecord, Iterate, IterationObserver, LineSearch,
        LineSearchParams, LineSearchResult, SolverOptions,
    },
    types::{DVector, Scalar},
};
use num_traits::Float;

/// Unconstrained trust-region Newton-CG solver.
#[derive(Debug, Clone)]
pub struct Trunk<T: Scalar> {
    config: TrustRegionConfig<T>,
    line_search_fallback: bool,
}

impl<T: Scalar> Default for Trunk<T> {
    fn default() -> Self {
        Self::new(TrustRegionConfig::default())
    }
}

impl<T: Scalar> Trunk<T> {
    /// Creates a solver with the given configuration and the line-search
    /// fallback enabled.
    pub fn new(config: TrustRegionConfig<T>) -> Self {
        Self {
            config,
            line_search_fallback: true,
        }
    }

    /// Enables or disables the line-search rescue of rejected steps.
    pub fn with_line_search_fallback(mut self, enabled: bool) -> Self {
        self.line_search_fallback = enabled;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TrustRegionConfig<T> {
        &self.config
    }
}

impl<T: Scalar> Solver<T> for Trunk<T> {
    fn name(&self) -> &str {
        "trunk"
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
                "trunk handles unconstrained problems only, use TRON for bounds",
                "bounds",
                model.name(),
            ));
        }

        let fallback = if self.line_search_fallback {
            let params = LineSearchParams::backtracking()
                .with_max_trials(options.line_search_max_trials)
                .with_max_evaluation_failures(options.max_consecutive_evaluation_failures);
            params.validate()?;
            Some(BacktrackingLineSearch::new(params))
        } else {
            None
        };

        let mut stepper = TrunkStep {
            cg: TruncatedCg::new(self.config.cg.clone()),
            linear: self.config.subproblem.linear_solver(),
            fallback,
        };
        trust_region::run(self.name(), &mut stepper, &self.config, model, x0, options, observer)
    }
}

struct TrunkStep<T: Scalar> {
    cg: TruncatedCg<T>,
    linear: Option<Box<dyn LinearSolver<T>>>,
    fallback: Option<BacktrackingLineSearch<T>>,
}

impl<T: Scalar> StepComputer<T> for TrunkStep<T> {
    fn compute(
        &mut self,
        model: &dyn Model<T>,
        _bounds: &Bounds<T>,
        iterate: &Iterate<T>,
        radius: T,
        pg_norm: T,
    ) -> SolverResult<TrialStep<T>> {
        let x = &iterate.x;
        let g = &iterate.g;
        let op = HessianOperator::at(model, x)?;
        let origin = DVector::zeros(x.len());

        let (step, kind) = match self.linear.as_mut() {
            Some(solver) => {
                let hessian = op.to_dense()?;
                let free = vec![true; x.len()];
                direct_step(solver.as_mut(), &hessian, g, &free, &origin, radius)?
            }
            None => {
                let rtol = <T as Float>::min(
                    self.cg.config().relative_tolerance,
                    <T as Float>::sqrt(pg_norm),
                );
                let result = self.cg.solve_from(&op, g, radius, &origin, rtol)?;
                trace!("trunk: {} CG iterations, {:?}", result.iterations, result.kind);
                (result.step, result.kind)
            }
        };

        let predicted_decrease = -quadratic_model(&op, g, &step)?;
        Ok(TrialStep {
            point: x + &step,
            step,
            predicted_decrease,
            kind,
        })
    }

    fn recover(
        &mut self,
        model: &dyn Model<T>,
        iterate: &Iterate<T>,
        trial: &TrialStep<T>,
        value: T,
    ) -> SolverResult<Option<LineSearchResult<T>>> {
        let Some(line_search) = &self.fallback else {
            return Ok(None);
        };
        let slope = iterate.g.dot(&trial.step);
        if !(slope < T::zero()) {
            return Ok(None);
        }

        // Minimizer of the quadratic interpolating f(x), the slope and f(x + s).
        let curvature = value - iterate.f - slope;
        let guess = if curvature > T::zero() {
            -slope / (curvature + curvature)
        } else {
            <T as Scalar>::from_f64(0.5)
        };
        let initial_step = <T as Float>::max(
            <T as Scalar>::from_f64(0.1),
            <T as Float>::min(guess, <T as Scalar>::from_f64(0.5)),
        );

        let searched =
            line_search.search(model, &iterate.x, iterate.f, &iterate.g, &trial.step, initial_step);
        match searched {
            Ok(found) => Ok(Some(found)),
            Err(
                err @ (SolverError::LineSearchFailed { .. }
                | SolverError::EvaluationFailures { .. }),
            ) => {
                debug!("trunk: line search fallback failed: {err}");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nlpkit_core::{
        optimization::{HistoryObserver, StepKind, TerminationStatus},
        types::DMatrix,
        utils::test_problems::{Quadratic, Rosenbrock},
    };

    #[test]
    fn test_rejects_bounded_models() {
        let model = Quadratic::laplacian(3)
            .with_bounds(DVector::zeros(3), DVector::from_element(3, 1.0));
        let result =
            Trunk::<f64>::default().minimize(&model, &DVector::zeros(3), &SolverOptions::default());
        assert!(matches!(result, Err(SolverError::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_quadratic() {
        let model = Quadratic::laplacian(10);
        let options = SolverOptions::default().with_gradient_tolerance(1e-10);
        let record = Trunk::<f64>::default()
            .minimize(&model, &DVector::zeros(10), &options)
            .unwrap();

        assert!(record.is_converged());
        assert_relative_eq!(record.iterate.x, model.minimizer().unwrap(), epsilon = 1e-6);
    }

    #[test]
    fn test_rosenbrock() {
        let model = Rosenbrock::new(2);
        let options = SolverOptions::default().with_gradient_tolerance(1e-6);
        let record = Trunk::<f64>::default()
            .minimize(&model, &DVector::from_vec(vec![-1.2, 1.0]), &options)
            .unwrap();

        assert_eq!(record.status, TerminationStatus::GradientTolerance);
        assert_relative_eq!(record.iterate.x, DVector::from_vec(vec![1.0, 1.0]), epsilon = 1e-4);
    }

    #[test]
    fn test_line_search_rescues_rejected_step() {
        // f(x) = sqrt(1 + x²): from |x| > 1 the Newton step -x(1 + x²)
        // overshoots the minimizer and fails the ratio test, but still
        // points downhill.
        let model = nlpkit_core::core::Problem::new(
            1,
            |x: &DVector<f64>| Ok((1.0 + x[0] * x[0]).sqrt()),
            |x: &DVector<f64>| Ok(DVector::from_element(1, x[0] / (1.0 + x[0] * x[0]).sqrt())),
        )
        .with_hessian_vector(|x: &DVector<f64>, v: &DVector<f64>| {
            Ok(v * (1.0 + x[0] * x[0]).powf(-1.5))
        });
        let options = SolverOptions::default().with_trust_region_initial_radius(1e3);
        let mut history = HistoryObserver::new();
        let record = Trunk::<f64>::default()
            .minimize_observed(&model, &DVector::from_element(1, 2.0), &options, &mut history)
            .unwrap();

        assert!(record.is_converged());
        assert!(record.iterate.x[0].abs() < 1e-4);
        let first = &history.iterations[0];
        assert!(first.accepted);
        assert_eq!(first.step_kind, StepKind::LineSearch);
    }

    #[test]
    fn test_without_fallback_rejects_instead() {
        let model = Quadratic::new(
            DMatrix::from_row_slice(2, 2, &[3.0, 1.0, 1.0, 2.0]),
            DVector::from_vec(vec![1.0, 1.0]),
        );
        let mut history = HistoryObserver::new();
        let record = Trunk::<f64>::default()
            .with_line_search_fallback(false)
            .minimize_observed(&model, &DVector::zeros(2), &SolverOptions::default(), &mut history)
            .unwrap();

        assert!(record.is_converged());
        assert!(history.iterations.iter().all(|info| info.step_kind != StepKind::LineSearch));
    }
}

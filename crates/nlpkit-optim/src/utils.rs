//! Bookkeeping shared by every solver: evaluation counting, budgets,
//! observer notification and record assembly.

use log::{debug, info};
use nlpkit_core::{
    core::{
        model::{check_dimension, CountingModel, Model},
        Bounds,
    },
    error::{ModelError, SolverError, SolverResult},
    optimization::{
        ConvergenceRecord, Iterate, IterationInfo, IterationObserver, SolverOptions,
        TerminationStatus,
    },
    types::{DVector, Scalar},
};
use num_traits::Float;
use std::time::Instant;

/// State of one solve that is not specific to the algorithm.
pub(crate) struct SolveContext<'a, T: Scalar, M: Model<T> + ?Sized> {
    /// The caller's model behind an evaluation counter
    pub model: CountingModel<&'a M>,
    pub options: &'a SolverOptions<T>,
    solver: &'a str,
    start: Instant,
    observer: &'a mut dyn IterationObserver<T>,
    initial_gradient_norm: Option<T>,
}

impl<'a, T: Scalar, M: Model<T> + ?Sized> SolveContext<'a, T, M> {
    /// Validates the common inputs and notifies the observer.
    pub fn start(
        solver: &'a str,
        model: &'a M,
        x0: &DVector<T>,
        options: &'a SolverOptions<T>,
        observer: &'a mut dyn IterationObserver<T>,
    ) -> SolverResult<Self> {
        options.validate()?;
        check_dimension(model.dimension(), x0)
            .map_err(|_| SolverError::dimension_mismatch(model.dimension(), x0.len()))?;

        observer.on_start(solver, model.name());
        debug!("{solver}: starting on {} (n = {})", model.name(), model.dimension());

        Ok(Self {
            model: CountingModel::new(model),
            options,
            solver,
            start: Instant::now(),
            observer,
            initial_gradient_norm: None,
        })
    }

    /// Time spent since [`Self::start`].
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }

    /// Evaluates objective and gradient at the starting point.
    ///
    /// A non-finite value is reported as an evaluation error.
    pub fn evaluate_start(&self, x: &DVector<T>) -> Result<(T, DVector<T>), ModelError> {
        let (f, g) = self.model.objective_and_gradient(x)?;
        if !Float::is_finite(f) || g.iter().any(|gi| !Float::is_finite(*gi)) {
            return Err(ModelError::evaluation("non-finite value at the starting point"));
        }
        Ok((f, g))
    }

    /// Top-of-iteration check: convergence first, then budgets.
    pub fn check(&mut self, iterations: usize, pg_norm: T) -> Option<TerminationStatus> {
        let pg0 = *self.initial_gradient_norm.get_or_insert(pg_norm);
        let mut threshold = self.options.gradient_tolerance;
        if let Some(rtol) = self.options.relative_gradient_tolerance {
            threshold = <T as Float>::max(threshold, rtol * pg0);
        }
        if pg_norm <= threshold {
            return Some(TerminationStatus::GradientTolerance);
        }
        if iterations >= self.options.max_iterations {
            return Some(TerminationStatus::IterationLimit);
        }
        if let Some(max) = self.options.max_evaluations {
            if self.model.counts().function_evaluations() >= max {
                return Some(TerminationStatus::EvaluationLimit);
            }
        }
        if let Some(max) = self.options.max_time {
            if self.start.elapsed() >= max {
                return Some(TerminationStatus::TimeLimit);
            }
        }
        None
    }

    /// Convergence tests on an accepted step.
    pub fn check_step(
        &self,
        f_old: T,
        f_new: T,
        step_norm: T,
        x_norm: T,
    ) -> Option<TerminationStatus> {
        if let Some(ftol) = self.options.function_tolerance {
            let scale = <T as Float>::max(T::one(), <T as Float>::abs(f_old));
            if <T as Float>::abs(f_old - f_new) <= ftol * scale {
                return Some(TerminationStatus::FunctionTolerance);
            }
        }
        if let Some(stol) = self.options.step_tolerance {
            if step_norm <= stol * <T as Float>::max(T::one(), x_norm) {
                return Some(TerminationStatus::StepTolerance);
            }
        }
        None
    }

    /// Passes iteration info to the observer; `false` means stop.
    pub fn notify(&mut self, info: &IterationInfo<T>) -> bool {
        debug!(
            "{} {:>4}: f = {:e}, |pg| = {:.3e}, |s| = {:.3e}, radius = {:.3e}, {:?}{}",
            self.solver,
            info.iteration,
            Scalar::to_f64(info.objective),
            Scalar::to_f64(info.projected_gradient_norm),
            Scalar::to_f64(info.step_norm),
            Scalar::to_f64(info.radius),
            info.step_kind,
            if info.accepted { "" } else { " (rejected)" },
        );
        self.observer.on_iteration(info)
    }

    /// Builds the record and hands it to the observer.
    pub fn finish(
        self,
        status: TerminationStatus,
        iterate: Iterate<T>,
        projected_gradient_norm: T,
        iterations: usize,
        error: Option<SolverError>,
    ) -> ConvergenceRecord<T> {
        let record = ConvergenceRecord {
            solver: self.solver.to_string(),
            model: self.model.name().to_string(),
            status,
            iterate,
            projected_gradient_norm,
            iterations,
            counts: self.model.counts(),
            elapsed: self.start.elapsed(),
            error,
        };
        info!("{record}");
        self.observer.on_finish(&record);
        record
    }

    /// Record for a solve whose starting point could not be evaluated.
    pub fn finish_at_start(self, x: DVector<T>, err: ModelError) -> ConvergenceRecord<T> {
        let n = x.len();
        let nan = <T as Float>::nan();
        let iterate = Iterate::new(x, nan, DVector::from_element(n, nan), 0);
        self.finish(
            TerminationStatus::EvaluationFailure,
            iterate,
            nan,
            0,
            Some(SolverError::evaluation_failures(1, err.to_string())),
        )
    }
}

/// Projected gradient norm and active set at `x`.
pub(crate) fn optimality<T: Scalar>(
    bounds: &Bounds<T>,
    x: &DVector<T>,
    g: &DVector<T>,
) -> (T, Vec<bool>) {
    let pg = bounds.projected_gradient(x, g);
    (pg.norm(), bounds.active_mask(x, g, T::zero()))
}

/// Whether every entry is finite.
pub(crate) fn all_finite<T: Scalar>(v: &DVector<T>) -> bool {
    v.iter().all(|vi| Float::is_finite(*vi))
}

//! Finite-difference validation of model derivatives.
//!
//! [`DerivativeChecker`] compares a model's analytic gradient and
//! Hessian-vector products against central differences. It only reads the
//! model and never fails: evaluation errors end up in the report as failed
//! checks, and the caller decides what to do with the verdict.
//!
//! # Example
//!
//! ```
//! use nlpkit_core::prelude::*;
//!
//! let problem = Problem::new(
//!     2,
//!     |x: &DVector<f64>| Ok(x[0].powi(2) * x[1]),
//!     |x: &DVector<f64>| Ok(DVector::from_vec(vec![2.0 * x[0] * x[1], x[0].powi(2)])),
//! );
//!
//! let x = DVector::from_vec(vec![0.7, -1.3]);
//! let report = DerivativeChecker::new().check_gradient(&problem, &x);
//! assert!(report.passed());
//! ```

use crate::{
    core::model::Model,
    types::{constants, DVector, Scalar},
};
use log::{debug, warn};
use num_traits::Float;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::fmt;

/// Derivative being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CheckKind {
    /// Gradient against central differences of the objective
    Gradient,
    /// Hessian-vector product against central differences of the gradient
    HessianVector,
    /// Every Hessian entry, column by column
    Hessian,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gradient => "gradient",
            Self::HessianVector => "Hessian-vector product",
            Self::Hessian => "Hessian",
        })
    }
}

/// One compared component.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DerivativeEntry<T> {
    /// Component index (row-major `i * n + j` for full Hessian checks)
    pub index: usize,
    /// Value reported by the model
    pub analytic: T,
    /// Finite-difference approximation
    pub numeric: T,
    /// `|analytic - numeric| / max(1, |analytic|)`
    pub relative_error: T,
}

impl<T: Scalar> DerivativeEntry<T> {
    fn new(index: usize, analytic: T, numeric: T) -> Self {
        let scale = <T as Float>::max(T::one(), <T as Float>::abs(analytic));
        let diff = <T as Float>::abs(analytic - numeric);
        let relative_error = if Float::is_finite(diff) {
            diff / scale
        } else {
            <T as Float>::infinity()
        };
        Self {
            index,
            analytic,
            numeric,
            relative_error,
        }
    }
}

/// Outcome of one derivative check.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DerivativeReport<T> {
    /// Derivative that was checked
    pub kind: CheckKind,
    /// Per-component comparison
    pub entries: Vec<DerivativeEntry<T>>,
    /// Evaluation errors hit while checking
    pub errors: Vec<String>,
    /// Threshold on the relative error
    pub tolerance: T,
}

impl<T: Scalar> DerivativeReport<T> {
    fn new(kind: CheckKind, tolerance: T) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            errors: Vec::new(),
            tolerance,
        }
    }

    fn failed_with(kind: CheckKind, tolerance: T, error: String) -> Self {
        let mut report = Self::new(kind, tolerance);
        report.errors.push(error);
        report
    }

    /// Whether every entry is within tolerance and no evaluation failed.
    pub fn passed(&self) -> bool {
        self.errors.is_empty() && self.entries.iter().all(|e| e.relative_error <= self.tolerance)
    }

    /// Largest relative error, zero for an empty report.
    pub fn max_relative_error(&self) -> T {
        self.entries
            .iter()
            .fold(T::zero(), |acc, e| <T as Float>::max(acc, e.relative_error))
    }

    /// Entries above tolerance.
    pub fn failures(&self) -> impl Iterator<Item = &DerivativeEntry<T>> {
        self.entries
            .iter()
            .filter(move |e| !(e.relative_error <= self.tolerance))
    }
}

impl<T: Scalar> fmt::Display for DerivativeReport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} check: {} ({} entries, max relative error {:.3e}, tolerance {:.1e})",
            self.kind,
            if self.passed() { "passed" } else { "FAILED" },
            self.entries.len(),
            Scalar::to_f64(self.max_relative_error()),
            Scalar::to_f64(self.tolerance),
        )?;
        for e in self.failures() {
            writeln!(
                f,
                "  [{:>4}] analytic {:>14.7e}  numeric {:>14.7e}  rel. error {:.3e}",
                e.index,
                Scalar::to_f64(e.analytic),
                Scalar::to_f64(e.numeric),
                Scalar::to_f64(e.relative_error),
            )?;
        }
        for err in &self.errors {
            writeln!(f, "  error: {err}")?;
        }
        Ok(())
    }
}

/// Finite-difference derivative checker.
#[derive(Debug, Clone)]
pub struct DerivativeChecker<T: Scalar> {
    tolerance: T,
    step: Option<T>,
    seed: u64,
}

impl<T: Scalar> Default for DerivativeChecker<T> {
    fn default() -> Self {
        Self {
            tolerance: T::DERIVATIVE_CHECK_TOLERANCE,
            step: None,
            seed: 0x5eed,
        }
    }
}

impl<T: Scalar> DerivativeChecker<T> {
    /// Creates a checker with the default tolerance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the relative-error tolerance.
    pub fn with_tolerance(mut self, tolerance: T) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Fixes the difference step instead of scaling it with `x`.
    pub fn with_step(mut self, step: T) -> Self {
        self.step = Some(step);
        self
    }

    /// Seeds the generator used by [`Self::check_random_direction`].
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn step_for(&self, magnitude: T) -> T {
        self.step.unwrap_or_else(|| {
            constants::cbrt_epsilon::<T>() * <T as Float>::max(T::one(), <T as Float>::abs(magnitude))
        })
    }

    /// Compares the gradient against central differences of the objective.
    pub fn check_gradient<M: Model<T> + ?Sized>(&self, model: &M, x: &DVector<T>) -> DerivativeReport<T> {
        let kind = CheckKind::Gradient;
        let analytic = match model.gradient(x) {
            Ok(g) => g,
            Err(err) => return DerivativeReport::failed_with(kind, self.tolerance, err.to_string()),
        };
        if let Some(err) = length_mismatch("gradient", analytic.len(), x.len()) {
            return DerivativeReport::failed_with(kind, self.tolerance, err);
        }

        let mut report = DerivativeReport::new(kind, self.tolerance);
        let two = <T as Scalar>::from_f64(2.0);
        let mut probe = x.clone();

        for i in 0..x.len() {
            let h = self.step_for(x[i]);
            probe[i] = x[i] + h;
            let forward = model.objective(&probe);
            probe[i] = x[i] - h;
            let backward = model.objective(&probe);
            probe[i] = x[i];

            match (forward, backward) {
                (Ok(fp), Ok(fm)) => {
                    report
                        .entries
                        .push(DerivativeEntry::new(i, analytic[i], (fp - fm) / (two * h)));
                }
                (Err(err), _) | (_, Err(err)) => {
                    report.errors.push(format!("coordinate {i}: {err}"));
                }
            }
        }

        self.log(model, &report);
        report
    }

    /// Compares `∇²f(x) v` against central differences of the gradient along `v`.
    pub fn check_hessian_vector<M: Model<T> + ?Sized>(
        &self,
        model: &M,
        x: &DVector<T>,
        v: &DVector<T>,
    ) -> DerivativeReport<T> {
        let report = self.compare_hessian_vector(model, x, v, CheckKind::HessianVector);
        self.log(model, &report);
        report
    }

    /// Runs [`Self::check_hessian_vector`] along a seeded random direction.
    pub fn check_random_direction<M: Model<T> + ?Sized>(&self, model: &M, x: &DVector<T>) -> DerivativeReport<T> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let v = DVector::from_fn(x.len(), |_, _| <T as Scalar>::from_f64(rng.gen_range(-1.0..1.0)));
        self.check_hessian_vector(model, x, &v)
    }

    /// Checks every Hessian column against differences of the gradient.
    pub fn check_hessian<M: Model<T> + ?Sized>(&self, model: &M, x: &DVector<T>) -> DerivativeReport<T> {
        let n = x.len();
        let mut report = DerivativeReport::new(CheckKind::Hessian, self.tolerance);
        let mut e = DVector::zeros(n);

        for j in 0..n {
            e[j] = T::one();
            let column = self.compare_hessian_vector(model, x, &e, CheckKind::Hessian);
            e[j] = T::zero();

            report.entries.extend(column.entries.into_iter().map(|mut entry| {
                entry.index = entry.index * n + j;
                entry
            }));
            report
                .errors
                .extend(column.errors.into_iter().map(|err| format!("column {j}: {err}")));
        }

        self.log(model, &report);
        report
    }

    fn compare_hessian_vector<M: Model<T> + ?Sized>(
        &self,
        model: &M,
        x: &DVector<T>,
        v: &DVector<T>,
        kind: CheckKind,
    ) -> DerivativeReport<T> {
        if let Some(err) = length_mismatch("direction", v.len(), x.len()) {
            return DerivativeReport::failed_with(kind, self.tolerance, err);
        }
        let analytic = match model.hessian_vector_product(x, v) {
            Ok(hv) => hv,
            Err(err) => return DerivativeReport::failed_with(kind, self.tolerance, err.to_string()),
        };
        if let Some(err) = length_mismatch("Hessian-vector product", analytic.len(), x.len()) {
            return DerivativeReport::failed_with(kind, self.tolerance, err);
        }

        let v_norm = v.norm();
        if v_norm == T::zero() {
            let mut report = DerivativeReport::new(kind, self.tolerance);
            report.entries = analytic
                .iter()
                .enumerate()
                .map(|(i, &a)| DerivativeEntry::new(i, a, T::zero()))
                .collect();
            return report;
        }

        let t = self.step_for(x.norm()) / v_norm;
        let forward = model.gradient(&(x + v * t));
        let backward = model.gradient(&(x - v * t));

        match (forward, backward) {
            (Ok(gp), Ok(gm)) => {
                let mismatch = length_mismatch("gradient", gp.len(), x.len())
                    .or_else(|| length_mismatch("gradient", gm.len(), x.len()));
                if let Some(err) = mismatch {
                    return DerivativeReport::failed_with(kind, self.tolerance, err);
                }
                let numeric = (gp - gm) / (<T as Scalar>::from_f64(2.0) * t);
                let mut report = DerivativeReport::new(kind, self.tolerance);
                report.entries = analytic
                    .iter()
                    .zip(numeric.iter())
                    .enumerate()
                    .map(|(i, (&a, &b))| DerivativeEntry::new(i, a, b))
                    .collect();
                report
            }
            (Err(err), _) | (_, Err(err)) => DerivativeReport::failed_with(kind, self.tolerance, err.to_string()),
        }
    }

    fn log<M: Model<T> + ?Sized>(&self, model: &M, report: &DerivativeReport<T>) {
        if report.passed() {
            debug!(
                "{}: {} check passed, max relative error {:.3e}",
                model.name(),
                report.kind,
                Scalar::to_f64(report.max_relative_error())
            );
        } else {
            warn!("{}: {report}", model.name());
        }
    }
}

/// Describes a returned vector whose length differs from the dimension.
fn length_mismatch(what: &str, actual: usize, expected: usize) -> Option<String> {
    (actual != expected).then(|| format!("{what} has length {actual}, expected {expected}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::problem::Problem;
    use crate::error::{ModelError, ModelResult};

    /// f(x) = sum(exp(x_i)) + x_0 x_1
    fn coupled(wrong_gradient: bool) -> Problem<f64> {
        Problem::new(
            2,
            |x: &DVector<f64>| Ok(x[0].exp() + x[1].exp() + x[0] * x[1]),
            move |x: &DVector<f64>| {
                let mut g = DVector::from_vec(vec![x[0].exp() + x[1], x[1].exp() + x[0]]);
                if wrong_gradient {
                    g[1] *= 1.1;
                }
                Ok(g)
            },
        )
        .with_hessian_vector(|x: &DVector<f64>, v: &DVector<f64>| {
            Ok(DVector::from_vec(vec![
                x[0].exp() * v[0] + v[1],
                v[0] + x[1].exp() * v[1],
            ]))
        })
    }

    #[test]
    fn test_correct_gradient_passes() {
        let x = DVector::from_vec(vec![0.3, -0.4]);
        let report = DerivativeChecker::new().check_gradient(&coupled(false), &x);

        assert!(report.passed());
        assert_eq!(report.entries.len(), 2);
        assert!(report.max_relative_error() < 1e-5);
    }

    #[test]
    fn test_wrong_gradient_fails() {
        let x = DVector::from_vec(vec![0.3, -0.4]);
        let report = DerivativeChecker::new().check_gradient(&coupled(true), &x);

        assert!(!report.passed());
        assert!(report.max_relative_error() > 1e-2);
        let failed: Vec<usize> = report.failures().map(|e| e.index).collect();
        assert_eq!(failed, vec![1]);
        assert!(report.to_string().contains("FAILED"));
    }

    #[test]
    fn test_hessian_checks() {
        let x = DVector::from_vec(vec![0.1, 0.2]);
        let checker = DerivativeChecker::new().with_seed(7);
        let model = coupled(false);

        assert!(checker.check_random_direction(&model, &x).passed());
        let full = checker.check_hessian(&model, &x);
        assert!(full.passed());
        assert_eq!(full.entries.len(), 4);
        assert_eq!(full.kind, CheckKind::Hessian);
    }

    /// Reports the wrong number of components from every derivative.
    #[derive(Debug)]
    struct Truncated;

    impl Model<f64> for Truncated {
        fn dimension(&self) -> usize {
            3
        }

        fn objective(&self, x: &DVector<f64>) -> ModelResult<f64> {
            Ok(x.norm_squared())
        }

        fn gradient(&self, x: &DVector<f64>) -> ModelResult<DVector<f64>> {
            Ok(DVector::from_element(1, 2.0 * x[0]))
        }

        fn hessian_vector_product(&self, _x: &DVector<f64>, v: &DVector<f64>) -> ModelResult<DVector<f64>> {
            Ok(DVector::from_element(2, 2.0 * v[0]))
        }
    }

    #[test]
    fn test_wrong_lengths_are_reported() {
        let x = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let checker = DerivativeChecker::new();

        let gradient = checker.check_gradient(&Truncated, &x);
        assert!(!gradient.passed());
        assert!(gradient.entries.is_empty());
        assert!(gradient.errors[0].contains("length 1, expected 3"));

        let product = checker.check_hessian_vector(&Truncated, &x, &DVector::from_element(3, 1.0));
        assert!(!product.passed());
        assert!(product.errors[0].contains("length 2, expected 3"));

        let hessian = checker.check_hessian(&Truncated, &x);
        assert!(!hessian.passed());
        assert_eq!(hessian.errors.len(), 3);
        assert!(hessian.entries.is_empty());
    }

    #[test]
    fn test_evaluation_error_is_reported() {
        let broken = Problem::new(
            1,
            |x: &DVector<f64>| {
                if x[0] > 1.0 {
                    Err(ModelError::evaluation("outside domain"))
                } else {
                    Ok(x[0])
                }
            },
            |_x: &DVector<f64>| Ok(DVector::from_element(1, 1.0)),
        );
        let x = DVector::from_element(1, 1.0);
        let report = DerivativeChecker::new().check_gradient(&broken, &x);

        assert!(!report.passed());
        assert_eq!(report.errors.len(), 1);
        assert!(report.entries.is_empty());
    }
}

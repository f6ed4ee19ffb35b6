//! Solver configuration shared by every algorithm.
//!
//! [`SolverOptions`] carries budgets, tolerances and the few algorithm knobs
//! a caller is expected to tune. Algorithm constants (radius update factors,
//! CG forcing terms, line-search parameters) live in each solver's own
//! config.

use crate::{
    error::{SolverError, SolverResult},
    types::Scalar,
};
use std::time::Duration;

/// Budgets, tolerances and common algorithm settings.
///
/// # Example
///
/// ```
/// use nlpkit_core::prelude::*;
/// use std::time::Duration;
///
/// let options = SolverOptions::<f64>::new()
///     .with_gradient_tolerance(1e-8)
///     .with_max_iterations(500)
///     .with_max_time(Duration::from_secs(10))
///     .with_lbfgs_memory(7);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SolverOptions<T: Scalar> {
    /// Cap on outer iterations
    pub max_iterations: usize,
    /// Cap on objective plus gradient evaluations
    pub max_evaluations: Option<usize>,
    /// Wall-clock budget
    pub max_time: Option<Duration>,
    /// Convergence threshold on the projected-gradient norm
    pub gradient_tolerance: T,
    /// Convergence threshold relative to the initial projected-gradient norm
    pub relative_gradient_tolerance: Option<T>,
    /// Stop when the relative objective decrease of an accepted step falls below this
    pub function_tolerance: Option<T>,
    /// Stop when the norm of an accepted step falls below this
    pub step_tolerance: Option<T>,
    /// Initial trust-region radius; `None` uses the initial gradient norm
    pub trust_region_initial_radius: Option<T>,
    /// L-BFGS history capacity `m`
    pub lbfgs_memory: usize,
    /// Cap on trial steps per line search
    pub line_search_max_trials: usize,
    /// Consecutive rejected trust-region steps tolerated before stagnation
    pub max_consecutive_rejections: usize,
    /// Consecutive evaluation failures tolerated before giving up
    pub max_consecutive_evaluation_failures: usize,
}

impl<T: Scalar> Default for SolverOptions<T> {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            max_evaluations: None,
            max_time: None,
            gradient_tolerance: T::DEFAULT_GRADIENT_TOLERANCE,
            relative_gradient_tolerance: None,
            function_tolerance: None,
            step_tolerance: None,
            trust_region_initial_radius: None,
            lbfgs_memory: 10,
            line_search_max_trials: 20,
            max_consecutive_rejections: 30,
            max_consecutive_evaluation_failures: 10,
        }
    }
}

impl<T: Scalar> SolverOptions<T> {
    /// Creates options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the evaluation cap.
    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = Some(max_evaluations);
        self
    }

    /// Sets the wall-clock budget.
    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    /// Sets the projected-gradient tolerance.
    pub fn with_gradient_tolerance(mut self, tol: T) -> Self {
        self.gradient_tolerance = tol;
        self
    }

    /// Sets the relative projected-gradient tolerance.
    pub fn with_relative_gradient_tolerance(mut self, tol: T) -> Self {
        self.relative_gradient_tolerance = Some(tol);
        self
    }

    /// Sets the objective-decrease tolerance.
    pub fn with_function_tolerance(mut self, tol: T) -> Self {
        self.function_tolerance = Some(tol);
        self
    }

    /// Sets the step-length tolerance.
    pub fn with_step_tolerance(mut self, tol: T) -> Self {
        self.step_tolerance = Some(tol);
        self
    }

    /// Sets the initial trust-region radius.
    pub fn with_trust_region_initial_radius(mut self, radius: T) -> Self {
        self.trust_region_initial_radius = Some(radius);
        self
    }

    /// Sets the L-BFGS history capacity.
    pub fn with_lbfgs_memory(mut self, memory: usize) -> Self {
        self.lbfgs_memory = memory;
        self
    }

    /// Sets the line-search trial cap.
    pub fn with_line_search_max_trials(mut self, trials: usize) -> Self {
        self.line_search_max_trials = trials;
        self
    }

    /// Sets the consecutive-rejection cap.
    pub fn with_max_consecutive_rejections(mut self, cap: usize) -> Self {
        self.max_consecutive_rejections = cap;
        self
    }

    /// Sets the consecutive evaluation-failure cap.
    pub fn with_max_consecutive_evaluation_failures(mut self, cap: usize) -> Self {
        self.max_consecutive_evaluation_failures = cap;
        self
    }

    /// Checks every option for a usable value.
    pub fn validate(&self) -> SolverResult<()> {
        let positive = |name: &str, value: T| -> SolverResult<()> {
            if value > T::zero() && num_traits::Float::is_finite(value) {
                Ok(())
            } else {
                Err(SolverError::invalid_configuration(
                    format!("{name} must be positive and finite"),
                    name,
                    value.to_string(),
                ))
            }
        };
        let non_negative = |name: &str, value: T| -> SolverResult<()> {
            if value >= T::zero() && num_traits::Float::is_finite(value) {
                Ok(())
            } else {
                Err(SolverError::invalid_configuration(
                    format!("{name} must be non-negative and finite"),
                    name,
                    value.to_string(),
                ))
            }
        };

        non_negative("gradient_tolerance", self.gradient_tolerance)?;
        if let Some(tol) = self.relative_gradient_tolerance {
            non_negative("relative_gradient_tolerance", tol)?;
        }
        if let Some(tol) = self.function_tolerance {
            non_negative("function_tolerance", tol)?;
        }
        if let Some(tol) = self.step_tolerance {
            non_negative("step_tolerance", tol)?;
        }
        if let Some(radius) = self.trust_region_initial_radius {
            positive("trust_region_initial_radius", radius)?;
        }

        let at_least_one = [
            ("lbfgs_memory", self.lbfgs_memory),
            ("line_search_max_trials", self.line_search_max_trials),
            ("max_consecutive_rejections", self.max_consecutive_rejections),
            (
                "max_consecutive_evaluation_failures",
                self.max_consecutive_evaluation_failures,
            ),
        ];
        for (name, value) in at_least_one {
            if value == 0 {
                return Err(SolverError::invalid_configuration(
                    format!("{name} must be at least 1"),
                    name,
                    "0",
                ));
            }
        }

        Ok(())
    }
}

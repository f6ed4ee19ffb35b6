//! Error types for model evaluation and solver runs.
//!
//! [`ModelError`] is what a derivative provider reports when it cannot
//! produce a value. [`SolverError`] is the solver-side taxonomy; most of its
//! variants never escape a solve as `Err` but end up attached to the
//! convergence record alongside the terminal status.

use thiserror::Error;

/// Errors reported by a model (derivative provider).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// The provider cannot compute a value at the requested point.
    ///
    /// Typical causes are domain violations (log of a negative number,
    /// division by zero) or a non-finite result. Solvers recover from this
    /// by shortening the step.
    #[error("Evaluation failed: {reason}")]
    Evaluation {
        /// Description of the failure
        reason: String,
    },

    /// Dimension mismatch between vectors.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: String,
        /// Actual dimension
        actual: String,
    },

    /// Optional capability not offered by this provider.
    #[error("Feature not implemented: {feature}")]
    NotImplemented {
        /// Name of the unimplemented feature
        feature: String,
    },

    /// Invalid model construction parameter.
    #[error("Invalid parameter: {reason}")]
    InvalidParameter {
        /// Description of the invalid parameter
        reason: String,
    },
}

impl ModelError {
    /// Create an Evaluation error with a custom reason.
    pub fn evaluation<S: Into<String>>(reason: S) -> Self {
        Self::Evaluation {
            reason: reason.into(),
        }
    }

    /// Create a DimensionMismatch error.
    pub fn dimension_mismatch<S1, S2>(expected: S1, actual: S2) -> Self
    where
        S1: std::fmt::Display,
        S2: std::fmt::Display,
    {
        Self::DimensionMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create a NotImplemented error for a specific feature.
    pub fn not_implemented<S: Into<String>>(feature: S) -> Self {
        Self::NotImplemented {
            feature: feature.into(),
        }
    }

    /// Create an InvalidParameter error.
    pub fn invalid_parameter<S: Into<String>>(reason: S) -> Self {
        Self::InvalidParameter {
            reason: reason.into(),
        }
    }

    /// Whether a solver may recover from this error by shortening the step.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Evaluation { .. })
    }
}

/// Errors that can occur while solving.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    /// Propagated model error.
    #[error("Model evaluation failed: {0}")]
    Model(#[from] ModelError),

    /// Too many consecutive evaluation failures.
    #[error("{failures} consecutive evaluation failures, last: {reason}")]
    EvaluationFailures {
        /// Length of the failure run
        failures: usize,
        /// Reason reported by the last failure
        reason: String,
    },

    /// Too many consecutive rejected trust-region steps.
    #[error("Stagnation: {rejections} consecutive rejected steps (radius {radius:e})")]
    Stagnation {
        /// Length of the rejection run
        rejections: usize,
        /// Trust-region radius when the solve gave up
        radius: f64,
    },

    /// Line search failed to find an acceptable step.
    #[error("Line search failed: {reason}")]
    LineSearchFailed {
        /// Description of why the line search failed
        reason: String,
        /// Number of trial steps attempted
        trials: usize,
        /// Last step length tried
        last_step_size: f64,
        /// Objective value at the starting point
        initial_value: f64,
    },

    /// Linear algebra provider could not factorize or solve.
    #[error("Singular system: {reason}")]
    SingularSystem {
        /// Description of the failure
        reason: String,
    },

    /// Non-finite quantities showed up in the solver state.
    #[error("Numerical failure: {reason}")]
    NumericalFailure {
        /// Description of the numerical issue
        reason: String,
    },

    /// Invalid solver configuration.
    #[error("Invalid solver configuration: {reason}")]
    InvalidConfiguration {
        /// Description of the configuration error
        reason: String,
        /// Name of the invalid parameter
        parameter: String,
        /// Value that was invalid
        value: String,
    },

    /// Starting point or bounds do not match the model dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: String,
        /// Actual dimension
        actual: String,
    },
}

impl SolverError {
    /// Create an EvaluationFailures error.
    pub fn evaluation_failures<S: Into<String>>(failures: usize, reason: S) -> Self {
        Self::EvaluationFailures {
            failures,
            reason: reason.into(),
        }
    }

    /// Create a Stagnation error.
    pub fn stagnation(rejections: usize, radius: f64) -> Self {
        Self::Stagnation { rejections, radius }
    }

    /// Create a LineSearchFailed error with detailed context.
    pub fn line_search_failed<S: Into<String>>(
        reason: S,
        trials: usize,
        last_step_size: f64,
        initial_value: f64,
    ) -> Self {
        Self::LineSearchFailed {
            reason: reason.into(),
            trials,
            last_step_size,
            initial_value,
        }
    }

    /// Create a SingularSystem error.
    pub fn singular_system<S: Into<String>>(reason: S) -> Self {
        Self::SingularSystem {
            reason: reason.into(),
        }
    }

    /// Create a NumericalFailure error.
    pub fn numerical_failure<S: Into<String>>(reason: S) -> Self {
        Self::NumericalFailure {
            reason: reason.into(),
        }
    }

    /// Create an InvalidConfiguration error.
    pub fn invalid_configuration<S1, S2, S3>(reason: S1, parameter: S2, value: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::InvalidConfiguration {
            reason: reason.into(),
            parameter: parameter.into(),
            value: value.into(),
        }
    }

    /// Create a DimensionMismatch error.
    pub fn dimension_mismatch<S1, S2>(expected: S1, actual: S2) -> Self
    where
        S1: std::fmt::Display,
        S2: std::fmt::Display,
    {
        Self::DimensionMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Result type alias for model operations.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Result type alias for solver operations.
pub type SolverResult<T> = std::result::Result<T, SolverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ModelError::evaluation("log of negative argument");
        assert!(matches!(err, ModelError::Evaluation { .. }));
        assert_eq!(err.to_string(), "Evaluation failed: log of negative argument");
        assert!(err.is_recoverable());

        let err = ModelError::dimension_mismatch(3, 4);
        assert_eq!(err.to_string(), "Dimension mismatch: expected 3, got 4");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_solver_error_context() {
        let err = SolverError::line_search_failed("Armijo condition not satisfied", 20, 1e-8, 42.0);

        if let SolverError::LineSearchFailed {
            reason,
            trials,
            last_step_size,
            initial_value,
        } = err
        {
            assert_eq!(reason, "Armijo condition not satisfied");
            assert_eq!(trials, 20);
            assert_eq!(last_step_size, 1e-8);
            assert_eq!(initial_value, 42.0);
        } else {
            panic!("Expected LineSearchFailed variant");
        }

        let err = SolverError::invalid_configuration("must be positive", "lbfgs_memory", "0");
        assert!(err.to_string().contains("Invalid solver configuration"));
    }

    #[test]
    fn test_model_error_propagation() {
        let model_err = ModelError::evaluation("sqrt of negative argument");
        let solver_err: SolverError = model_err.into();

        assert!(matches!(solver_err, SolverError::Model(_)));
        assert!(solver_err.to_string().contains("sqrt of negative argument"));
    }

    #[test]
    fn test_solver_error_display() {
        let errors = vec![
            SolverError::evaluation_failures(5, "domain violation"),
            SolverError::stagnation(20, 1e-12),
            SolverError::singular_system("zero pivot"),
            SolverError::numerical_failure("objective is NaN"),
            SolverError::dimension_mismatch(2, 3),
        ];

        for err in errors {
            assert!(!err.to_string().is_empty());
        }
    }
}

//! Type definitions and aliases for nonlinear programming.
//!
//! This module provides the scalar trait every solver is generic over,
//! the vector/matrix aliases used throughout the workspace, and per-type
//! numerical constants.

use nalgebra::{Dyn, OMatrix, OVector, RealField, Scalar as NalgebraScalar};
use num_traits::{Float, FromPrimitive};
use std::fmt::{Debug, Display};

/// Trait for scalar types used in optimization (f32 or f64).
///
/// This trait combines all the numeric traits the solvers rely on.
pub trait Scalar:
    NalgebraScalar
    + RealField
    + Float
    + FromPrimitive
    + Display
    + Debug
    + Default
    + Copy
    + Send
    + Sync
    + 'static
{
    /// Machine epsilon for this scalar type.
    const EPSILON: Self;

    /// Default tolerance for convergence checks.
    const DEFAULT_TOLERANCE: Self;

    /// Default tolerance on the projected gradient norm.
    const DEFAULT_GRADIENT_TOLERANCE: Self;

    /// Default pass threshold for derivative checks.
    const DERIVATIVE_CHECK_TOLERANCE: Self;

    /// Smallest step length a line search will try.
    const MIN_STEP_SIZE: Self;

    /// Convert from f64 (for constants).
    ///
    /// Conversions that cannot be represented yield NaN.
    fn from_f64(v: f64) -> Self {
        <Self as FromPrimitive>::from_f64(v).unwrap_or_else(<Self as Float>::nan)
    }

    /// Try to convert from f64.
    fn try_from_f64(v: f64) -> Option<Self> {
        <Self as FromPrimitive>::from_f64(v)
    }

    /// Convert to f64 (for logging/display).
    fn to_f64(self) -> f64 {
        num_traits::cast(self).unwrap_or(f64::NAN)
    }

    /// Convert from usize (for dimensions and counters).
    fn from_usize(v: usize) -> Self {
        <Self as FromPrimitive>::from_usize(v).unwrap_or_else(<Self as Float>::nan)
    }
}

impl Scalar for f32 {
    const EPSILON: Self = f32::EPSILON;
    const DEFAULT_TOLERANCE: Self = 1e-4;
    const DEFAULT_GRADIENT_TOLERANCE: Self = 1e-4;
    const DERIVATIVE_CHECK_TOLERANCE: Self = 1e-2;
    const MIN_STEP_SIZE: Self = 1e-10;
}

impl Scalar for f64 {
    const EPSILON: Self = f64::EPSILON;
    const DEFAULT_TOLERANCE: Self = 1e-8;
    const DEFAULT_GRADIENT_TOLERANCE: Self = 1e-6;
    const DERIVATIVE_CHECK_TOLERANCE: Self = 1e-4;
    const MIN_STEP_SIZE: Self = 1e-16;
}

/// Type alias for a dynamically-sized matrix.
pub type DMatrix<T> = OMatrix<T, Dyn, Dyn>;

/// Type alias for a dynamically-sized vector.
pub type DVector<T> = OVector<T, Dyn>;

/// Numerical constants for different precision levels.
pub mod constants {
    use super::Scalar;

    /// Get machine epsilon for the given scalar type.
    pub fn epsilon<T: Scalar>() -> T {
        T::EPSILON
    }

    /// Get default convergence tolerance.
    pub fn default_tolerance<T: Scalar>() -> T {
        T::DEFAULT_TOLERANCE
    }

    /// Get default gradient convergence tolerance.
    pub fn gradient_tolerance<T: Scalar>() -> T {
        T::DEFAULT_GRADIENT_TOLERANCE
    }

    /// Square root of machine epsilon, the usual finite-difference step scale.
    pub fn sqrt_epsilon<T: Scalar>() -> T {
        num_traits::Float::sqrt(T::EPSILON)
    }

    /// Cube root of machine epsilon, the usual central-difference step scale.
    pub fn cbrt_epsilon<T: Scalar>() -> T {
        num_traits::Float::cbrt(T::EPSILON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(<f64 as Scalar>::from_f64(0.25), 0.25);
        assert_eq!(<f32 as Scalar>::from_usize(7), 7.0);
        assert_relative_eq!(<f32 as Scalar>::to_f64(0.5f32), 0.5);
    }

    #[test]
    fn test_constants() {
        assert_eq!(constants::epsilon::<f64>(), f64::EPSILON);
        assert!(constants::gradient_tolerance::<f64>() < constants::gradient_tolerance::<f32>() as f64);
        assert_relative_eq!(constants::sqrt_epsilon::<f64>(), f64::EPSILON.sqrt());
        assert!(constants::cbrt_epsilon::<f64>() > constants::sqrt_epsilon::<f64>());
    }
}

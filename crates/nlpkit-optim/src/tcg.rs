//! Truncated conjugate gradient for the trust-region subproblem.
//!
//! Approximately solves
//!
//! ```text
//! min_w  gᵀw + ½ wᵀHw   s.t.  ‖o + w‖ ≤ Δ
//! ```
//!
//! where `o` is a fixed offset (the Cauchy step in TRON, zero otherwise).
//! This is the Steihaug-Toint variant of CG: the iteration runs the usual
//! recurrence on `Hw = -g` and stops early when
//!
//! 1. the residual drops below tolerance (an interior step),
//! 2. the next iterate would leave the ball (the step is cut at the boundary), or
//! 3. a direction of non-positive curvature shows up (the step follows it to
//!    the boundary).
//!
//! Iterates grow monotonically in norm, so the boundary cut in case 2 is the
//! best point of the ball along the CG path.

use log::trace;
use nlpkit_core::{
    error::{SolverError, SolverResult},
    linalg::LinearOperator,
    optimization::StepKind,
    types::{DVector, Scalar},
};
use num_traits::Float;

/// Configuration for [`TruncatedCg`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TruncatedCgConfig<T: Scalar> {
    /// Residual reduction `‖r‖ ≤ rtol ‖g‖` that counts as converged
    pub relative_tolerance: T,
    /// Cap on CG iterations; `None` uses the operator dimension
    pub max_iterations: Option<usize>,
}

impl<T: Scalar> Default for TruncatedCgConfig<T> {
    fn default() -> Self {
        Self {
            relative_tolerance: <T as Scalar>::from_f64(0.1),
            max_iterations: None,
        }
    }
}

impl<T: Scalar> TruncatedCgConfig<T> {
    /// Sets the relative residual tolerance.
    pub fn with_relative_tolerance(mut self, tol: T) -> Self {
        self.relative_tolerance = tol;
        self
    }

    /// Sets the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SolverResult<()> {
        if !(self.relative_tolerance > T::zero() && self.relative_tolerance < T::one()) {
            return Err(SolverError::invalid_configuration(
                "CG relative tolerance must be in (0, 1)",
                "relative_tolerance",
                self.relative_tolerance.to_string(),
            ));
        }
        if self.max_iterations == Some(0) {
            return Err(SolverError::invalid_configuration(
                "CG needs at least one iteration",
                "max_iterations",
                "0",
            ));
        }
        Ok(())
    }
}

/// Result of a truncated CG solve.
#[derive(Debug, Clone)]
pub struct CgStep<T: Scalar> {
    /// The step `w` (excluding the offset)
    pub step: DVector<T>,
    /// Why the iteration stopped
    pub kind: StepKind,
    /// CG iterations performed
    pub iterations: usize,
    /// Final residual norm
    pub residual_norm: T,
}

/// Steihaug-Toint truncated CG.
#[derive(Debug, Clone, Default)]
pub struct TruncatedCg<T: Scalar> {
    config: TruncatedCgConfig<T>,
}

impl<T: Scalar> TruncatedCg<T> {
    /// Creates a solver with the given configuration.
    pub fn new(config: TruncatedCgConfig<T>) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TruncatedCgConfig<T> {
        &self.config
    }

    /// Solves `min gᵀw + ½ wᵀHw` subject to `‖w‖ ≤ Δ`.
    pub fn solve<O: LinearOperator<T>>(
        &self,
        op: &O,
        g: &DVector<T>,
        radius: T,
    ) -> SolverResult<CgStep<T>> {
        let offset = DVector::zeros(g.len());
        self.solve_from(op, g, radius, &offset, self.config.relative_tolerance)
    }

    /// Solves the subproblem around `offset` with relative tolerance `rtol`.
    ///
    /// Never fails on its own; errors only come from applying the operator.
    pub fn solve_from<O: LinearOperator<T>>(
        &self,
        op: &O,
        g: &DVector<T>,
        radius: T,
        offset: &DVector<T>,
        rtol: T,
    ) -> SolverResult<CgStep<T>> {
        let n = g.len();
        let max_iterations = self.config.max_iterations.unwrap_or(n).max(1);

        let mut w = DVector::zeros(n);
        let mut r = -g;
        let mut p = r.clone();
        let mut rr = r.norm_squared();
        let tolerance = rtol * <T as Float>::sqrt(rr);

        if rr == T::zero() {
            return Ok(CgStep {
                step: w,
                kind: StepKind::Interior,
                iterations: 0,
                residual_norm: T::zero(),
            });
        }

        for k in 1..=max_iterations {
            let hp = op.apply(&p)?;
            let curvature = p.dot(&hp);

            if !(curvature > T::zero()) {
                let tau = boundary_step(&(offset + &w), &p, radius);
                w.axpy(tau, &p, T::one());
                trace!("tcg: negative curvature at iteration {k}");
                return Ok(CgStep {
                    step: w,
                    kind: StepKind::NegativeCurvature,
                    iterations: k,
                    residual_norm: <T as Float>::sqrt(rr),
                });
            }

            let alpha = rr / curvature;
            let next = &w + &p * alpha;
            if (offset + &next).norm() >= radius {
                let tau = boundary_step(&(offset + &w), &p, radius);
                w.axpy(tau, &p, T::one());
                trace!("tcg: boundary reached at iteration {k}");
                return Ok(CgStep {
                    step: w,
                    kind: StepKind::Boundary,
                    iterations: k,
                    residual_norm: <T as Float>::sqrt(rr),
                });
            }

            w = next;
            r.axpy(-alpha, &hp, T::one());
            let rr_next = r.norm_squared();
            if <T as Float>::sqrt(rr_next) <= tolerance {
                return Ok(CgStep {
                    step: w,
                    kind: StepKind::Interior,
                    iterations: k,
                    residual_norm: <T as Float>::sqrt(rr_next),
                });
            }

            let beta = rr_next / rr;
            p = &r + &p * beta;
            rr = rr_next;
        }

        Ok(CgStep {
            step: w,
            kind: StepKind::Interior,
            iterations: max_iterations,
            residual_norm: <T as Float>::sqrt(rr),
        })
    }
}

/// Largest `τ ≥ 0` with `‖z + τp‖ ≤ Δ`; zero for a vanishing direction.
pub(crate) fn boundary_step<T: Scalar>(z: &DVector<T>, p: &DVector<T>, radius: T) -> T {
    let pp = p.norm_squared();
    if pp == T::zero() {
        return T::zero();
    }
    let zp = z.dot(p);
    let slack = <T as Float>::max(radius * radius - z.norm_squared(), T::zero());
    let disc = <T as Float>::sqrt(zp * zp + pp * slack);
    // Conjugate form of the positive root, stable when zp > 0.
    let tau = if zp > T::zero() {
        slack / (zp + disc)
    } else {
        (disc - zp) / pp
    };
    <T as Float>::max(tau, T::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nlpkit_core::types::DMatrix;

    fn spd() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, 0.0, 0.0, 0.0, 2.0])
    }

    #[test]
    fn test_interior_newton_step() {
        let h = spd();
        let g = DVector::from_vec(vec![1.0, -2.0, 0.5]);
        let cg = TruncatedCg::new(TruncatedCgConfig::default().with_relative_tolerance(1e-10));

        let result = cg.solve(&h, &g, 100.0).unwrap();
        let newton = h.clone().lu().solve(&(-&g)).unwrap();

        assert_eq!(result.kind, StepKind::Interior);
        assert_relative_eq!(result.step, newton, epsilon = 1e-8);
        assert!(result.iterations <= 3);
    }

    #[test]
    fn test_boundary_truncation() {
        let h = spd();
        let g = DVector::from_vec(vec![10.0, -20.0, 5.0]);
        let result = TruncatedCg::default().solve(&h, &g, 0.5).unwrap();

        assert_eq!(result.kind, StepKind::Boundary);
        assert_relative_eq!(result.step.norm(), 0.5, epsilon = 1e-12);
        assert!(g.dot(&result.step) < 0.0);
    }

    #[test]
    fn test_negative_curvature_goes_to_boundary() {
        let h = DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 0.0, 1.0]);
        let g = DVector::from_vec(vec![1.0, 0.0]);
        let result = TruncatedCg::default().solve(&h, &g, 2.0).unwrap();

        assert_eq!(result.kind, StepKind::NegativeCurvature);
        assert_relative_eq!(result.step, DVector::from_vec(vec![-2.0, 0.0]), epsilon = 1e-12);
    }

    #[test]
    fn test_zero_gradient_gives_zero_step() {
        let h = DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 0.0, -1.0]);
        let result = TruncatedCg::default().solve(&h, &DVector::zeros(2), 1.0).unwrap();
        assert_eq!(result.kind, StepKind::Interior);
        assert_eq!(result.step, DVector::zeros(2));
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn test_offset_counts_toward_radius() {
        let h = DMatrix::<f64>::identity(2, 2);
        let g = DVector::from_vec(vec![-3.0, 0.0]);
        let offset = DVector::from_vec(vec![0.0, 0.8]);
        let result = TruncatedCg::default().solve_from(&h, &g, 1.0, &offset, 0.1).unwrap();

        assert_eq!(result.kind, StepKind::Boundary);
        assert_relative_eq!((offset + &result.step).norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(result.step[0], 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_boundary_step_roots() {
        let z = DVector::from_vec(vec![0.5, 0.0]);
        let p = DVector::from_vec(vec![1.0, 0.0]);
        assert_relative_eq!(boundary_step(&z, &p, 1.0), 0.5);
        assert_relative_eq!(boundary_step(&z, &(-&p), 1.0), 1.5);
        assert_eq!(boundary_step(&z, &DVector::zeros(2), 1.0), 0.0);
    }

    #[test]
    fn test_config_validation() {
        assert!(TruncatedCgConfig::<f64>::default().validate().is_ok());
        assert!(TruncatedCgConfig::<f64>::default()
            .with_relative_tolerance(1.5)
            .validate()
            .is_err());
        assert!(TruncatedCgConfig::<f64>::default()
            .with_max_iterations(0)
            .validate()
            .is_err());
    }
}

//! Objective scaling and maximization.

use crate::{
    core::model::Model,
    error::{ModelError, ModelResult},
    linalg::sparse::CsrMatrix,
    types::{DMatrix, DVector, Scalar},
};
use num_traits::Float;

/// Multiplies the objective and all its derivatives by a constant factor.
///
/// A maximization problem is solved by minimizing the negated objective:
/// [`ScaledModel::maximize`] sets the sign, [`ScaledModel::with_scale`]
/// applies a positive scale on top. Objective values reported by a solver
/// running on a scaled model are in scaled units; convert them back with
/// [`ScaledModel::unscale_objective`].
#[derive(Debug, Clone)]
pub struct ScaledModel<M> {
    inner: M,
    scale: f64,
    maximize: bool,
}

impl<M> ScaledModel<M> {
    /// Wraps a model with unit scaling (identity transform).
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            scale: 1.0,
            maximize: false,
        }
    }

    /// Wraps a model whose objective should be maximized.
    pub fn maximize(inner: M) -> Self {
        Self {
            inner,
            scale: 1.0,
            maximize: true,
        }
    }

    /// Sets a positive objective scale factor.
    pub fn with_scale(mut self, scale: f64) -> ModelResult<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ModelError::invalid_parameter(format!(
                "objective scale must be positive and finite, got {scale}"
            )));
        }
        self.scale = scale;
        Ok(self)
    }

    /// Signed factor applied to objective, gradient and Hessian.
    pub fn factor(&self) -> f64 {
        if self.maximize {
            -self.scale
        } else {
            self.scale
        }
    }

    /// Whether the wrapped objective is maximized.
    pub fn is_maximization(&self) -> bool {
        self.maximize
    }

    /// Converts a scaled objective value back to the original units.
    pub fn unscale_objective<T: Scalar>(&self, value: T) -> T {
        value / <T as Scalar>::from_f64(self.factor())
    }

    /// The wrapped model.
    pub fn inner(&self) -> &M {
        &self.inner
    }

    fn factor_as<T: Scalar>(&self) -> T {
        <T as Scalar>::from_f64(self.factor())
    }
}

impl<T: Scalar, M: Model<T>> Model<T> for ScaledModel<M> {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn objective(&self, x: &DVector<T>) -> ModelResult<T> {
        Ok(self.inner.objective(x)? * self.factor_as::<T>())
    }

    fn gradient(&self, x: &DVector<T>) -> ModelResult<DVector<T>> {
        Ok(self.inner.gradient(x)? * self.factor_as::<T>())
    }

    fn objective_and_gradient(&self, x: &DVector<T>) -> ModelResult<(T, DVector<T>)> {
        let c = self.factor_as::<T>();
        let (f, g) = self.inner.objective_and_gradient(x)?;
        Ok((f * c, g * c))
    }

    fn hessian_vector_product(&self, x: &DVector<T>, v: &DVector<T>) -> ModelResult<DVector<T>> {
        Ok(self.inner.hessian_vector_product(x, v)? * self.factor_as::<T>())
    }

    fn hessian(&self, x: &DVector<T>) -> ModelResult<DMatrix<T>> {
        Ok(self.inner.hessian(x)? * self.factor_as::<T>())
    }

    fn sparse_hessian(&self, x: &DVector<T>) -> ModelResult<Option<CsrMatrix<T>>> {
        let c = self.factor_as::<T>();
        Ok(self.inner.sparse_hessian(x)?.map(|mut h| {
            h.scale_mut(c);
            h
        }))
    }

    fn bounds(&self) -> (DVector<T>, DVector<T>) {
        self.inner.bounds()
    }

    fn has_bounds(&self) -> bool {
        self.inner.has_bounds()
    }

    fn project(&self, x: &DVector<T>) -> DVector<T> {
        self.inner.project(x)
    }

    fn initial_point(&self) -> Option<DVector<T>> {
        self.inner.initial_point()
    }

    fn accept_step(&self, s: &DVector<T>, y: &DVector<T>) {
        // `y` arrives in scaled units.
        let c = self.factor_as::<T>();
        if Float::abs(c) > T::zero() {
            self.inner.accept_step(s, &(y / c));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::problem::Problem;
    use approx::assert_relative_eq;

    fn cap() -> Problem<f64> {
        // f(x) = 3 - x^2, maximized at 0.
        Problem::new(
            1,
            |x: &DVector<f64>| Ok(3.0 - x[0] * x[0]),
            |x: &DVector<f64>| Ok(DVector::from_element(1, -2.0 * x[0])),
        )
    }

    #[test]
    fn test_maximization_negates() {
        let model = ScaledModel::maximize(cap());
        let x = DVector::from_element(1, 1.0);

        assert!(model.is_maximization());
        assert_relative_eq!(model.objective(&x).unwrap(), -2.0);
        assert_relative_eq!(model.gradient(&x).unwrap()[0], 2.0);
        assert_relative_eq!(model.unscale_objective(-2.0), 2.0);

        let hv = model.hessian_vector_product(&x, &DVector::from_element(1, 1.0)).unwrap();
        assert_relative_eq!(hv[0], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_scale_validation() {
        assert!(ScaledModel::new(cap()).with_scale(0.0).is_err());
        assert!(ScaledModel::new(cap()).with_scale(f64::NAN).is_err());

        let model = ScaledModel::new(cap()).with_scale(0.5).unwrap();
        assert_relative_eq!(model.factor(), 0.5);
        assert_relative_eq!(model.objective(&DVector::from_element(1, 1.0)).unwrap(), 1.0);
    }
}

//! Quasi-Newton Hessian models.

use crate::{
    core::model::Model,
    error::{ModelResult, SolverResult},
    linalg::sparse::CsrMatrix,
    optimization::history::LbfgsHistory,
    types::{DVector, Scalar},
};
use std::cell::RefCell;

/// Replaces a model's curvature with a limited-memory BFGS approximation.
///
/// Objective, gradient and bounds come from the wrapped model. Hessian-vector
/// products multiply with the direct L-BFGS matrix built from the steps the
/// solver reports through [`Model::accept_step`]. This lets a trust-region
/// solver run on problems that only provide first derivatives.
#[derive(Debug)]
pub struct QuasiNewtonModel<T: Scalar, M> {
    inner: M,
    history: RefCell<LbfgsHistory<T>>,
}

impl<T: Scalar, M> QuasiNewtonModel<T, M> {
    /// Wraps `inner` with a history of `memory` pairs.
    pub fn new(inner: M, memory: usize) -> SolverResult<Self> {
        Ok(Self {
            inner,
            history: RefCell::new(LbfgsHistory::new(memory)?),
        })
    }

    /// Number of stored correction pairs.
    pub fn pairs(&self) -> usize {
        self.history.borrow().len()
    }

    /// Forgets all curvature information.
    pub fn reset(&self) {
        self.history.borrow_mut().clear();
    }

    /// The wrapped model.
    pub fn inner(&self) -> &M {
        &self.inner
    }
}

impl<T: Scalar, M: Model<T>> Model<T> for QuasiNewtonModel<T, M> {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn objective(&self, x: &DVector<T>) -> ModelResult<T> {
        self.inner.objective(x)
    }

    fn gradient(&self, x: &DVector<T>) -> ModelResult<DVector<T>> {
        self.inner.gradient(x)
    }

    fn objective_and_gradient(&self, x: &DVector<T>) -> ModelResult<(T, DVector<T>)> {
        self.inner.objective_and_gradient(x)
    }

    fn hessian_vector_product(&self, _x: &DVector<T>, v: &DVector<T>) -> ModelResult<DVector<T>> {
        Ok(self.history.borrow().apply(v))
    }

    fn sparse_hessian(&self, _x: &DVector<T>) -> ModelResult<Option<CsrMatrix<T>>> {
        Ok(None)
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
        self.history.borrow_mut().try_push(s.clone(), y.clone());
        self.inner.accept_step(s, y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::problem::Problem;
    use approx::assert_relative_eq;

    fn diagonal() -> Problem<f64> {
        Problem::new(
            2,
            |x: &DVector<f64>| Ok(x[0] * x[0] + 5.0 * x[1] * x[1]),
            |x: &DVector<f64>| Ok(DVector::from_vec(vec![2.0 * x[0], 10.0 * x[1]])),
        )
    }

    #[test]
    fn test_identity_before_first_step() {
        let model = QuasiNewtonModel::<f64, _>::new(diagonal(), 3).unwrap();
        let x = DVector::zeros(2);
        let v = DVector::from_vec(vec![1.0, 2.0]);

        assert_relative_eq!(model.hessian_vector_product(&x, &v).unwrap(), v);
        assert_eq!(model.pairs(), 0);
    }

    #[test]
    fn test_accepted_step_updates_curvature() {
        let model = QuasiNewtonModel::<f64, _>::new(diagonal(), 3).unwrap();
        let x = DVector::zeros(2);
        let s = DVector::from_vec(vec![0.0, 1.0]);
        let y = DVector::from_vec(vec![0.0, 10.0]);

        model.accept_step(&s, &y);
        assert_eq!(model.pairs(), 1);
        assert_relative_eq!(model.hessian_vector_product(&x, &s).unwrap(), y, epsilon = 1e-12);

        model.reset();
        assert_eq!(model.pairs(), 0);
    }

    #[test]
    fn test_negative_curvature_pair_ignored() {
        let model = QuasiNewtonModel::<f64, _>::new(diagonal(), 3).unwrap();
        let s = DVector::from_vec(vec![1.0, 0.0]);
        let y = DVector::from_vec(vec![-1.0, 0.0]);
        model.accept_step(&s, &y);
        assert_eq!(model.pairs(), 0);
    }
}

//! Box constraints: projection, active sets and projected gradients.

use crate::{
    core::model::{check_dimension, Model},
    error::{ModelError, ModelResult},
    types::{DVector, Scalar},
};
use num_traits::Float;

/// Validated variable bounds `lower ≤ x ≤ upper`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds<T: Scalar> {
    lower: DVector<T>,
    upper: DVector<T>,
}

impl<T: Scalar> Bounds<T> {
    /// Creates bounds, checking lengths and ordering.
    pub fn new(lower: DVector<T>, upper: DVector<T>) -> ModelResult<Self> {
        check_dimension(lower.len(), &upper)?;
        for i in 0..lower.len() {
            if Float::is_nan(lower[i]) || Float::is_nan(upper[i]) || lower[i] > upper[i] {
                return Err(ModelError::invalid_parameter(format!(
                    "invalid bounds [{}, {}] for variable {i}",
                    lower[i], upper[i]
                )));
            }
        }
        Ok(Self { lower, upper })
    }

    /// Bounds of an unconstrained problem.
    pub fn unbounded(n: usize) -> Self {
        Self {
            lower: DVector::from_element(n, <T as Float>::neg_infinity()),
            upper: DVector::from_element(n, <T as Float>::infinity()),
        }
    }

    /// Reads and validates the bounds of a model.
    pub fn from_model<M: Model<T> + ?Sized>(model: &M) -> ModelResult<Self> {
        let (lower, upper) = model.bounds();
        check_dimension(model.dimension(), &lower)?;
        Self::new(lower, upper)
    }

    /// Lower bounds.
    pub fn lower(&self) -> &DVector<T> {
        &self.lower
    }

    /// Upper bounds.
    pub fn upper(&self) -> &DVector<T> {
        &self.upper
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.lower.len()
    }

    /// Whether there are no variables.
    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    /// Whether any bound is finite.
    pub fn is_bounded(&self) -> bool {
        self.lower
            .iter()
            .chain(self.upper.iter())
            .any(|b| Float::is_finite(*b))
    }

    /// Clips `x` to the box.
    pub fn project(&self, x: &DVector<T>) -> DVector<T> {
        x.zip_zip_map(&self.lower, &self.upper, |xi, li, ui| {
            <T as Float>::min(<T as Float>::max(xi, li), ui)
        })
    }

    /// Whether `x` lies in the box.
    pub fn contains(&self, x: &DVector<T>) -> bool {
        (0..x.len()).all(|i| x[i] >= self.lower[i] && x[i] <= self.upper[i])
    }

    fn at_lower(&self, x: &DVector<T>, i: usize, tol: T) -> bool {
        Float::is_finite(self.lower[i]) && x[i] <= self.lower[i] + tol
    }

    fn at_upper(&self, x: &DVector<T>, i: usize, tol: T) -> bool {
        Float::is_finite(self.upper[i]) && x[i] >= self.upper[i] - tol
    }

    /// Active set: variables within `tol` of a bound with the gradient
    /// pushing them outward.
    pub fn active_mask(&self, x: &DVector<T>, g: &DVector<T>, tol: T) -> Vec<bool> {
        (0..x.len())
            .map(|i| {
                (self.at_lower(x, i, tol) && g[i] >= T::zero())
                    || (self.at_upper(x, i, tol) && g[i] <= T::zero())
            })
            .collect()
    }

    /// Variables within `tol` of either bound, whatever the gradient.
    pub fn binding_mask(&self, x: &DVector<T>, tol: T) -> Vec<bool> {
        (0..x.len())
            .map(|i| self.at_lower(x, i, tol) || self.at_upper(x, i, tol))
            .collect()
    }

    /// Gradient with the components of active variables zeroed.
    ///
    /// Its norm is the first-order optimality measure for bound-constrained
    /// problems.
    pub fn projected_gradient(&self, x: &DVector<T>, g: &DVector<T>) -> DVector<T> {
        let mask = self.active_mask(x, g, T::zero());
        DVector::from_fn(x.len(), |i, _| if mask[i] { T::zero() } else { g[i] })
    }

    /// Largest `alpha ≥ 0` such that `x + alpha d` stays in the box.
    ///
    /// Infinite when `d` never leaves the box.
    pub fn max_feasible_step(&self, x: &DVector<T>, d: &DVector<T>) -> T {
        let mut alpha = <T as Float>::infinity();
        for i in 0..x.len() {
            if d[i] > T::zero() && Float::is_finite(self.upper[i]) {
                alpha = <T as Float>::min(alpha, (self.upper[i] - x[i]) / d[i]);
            } else if d[i] < T::zero() && Float::is_finite(self.lower[i]) {
                alpha = <T as Float>::min(alpha, (self.lower[i] - x[i]) / d[i]);
            }
        }
        <T as Float>::max(alpha, T::zero())
    }
}

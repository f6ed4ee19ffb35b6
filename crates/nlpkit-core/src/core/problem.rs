//! Callback-backed problem definition.
//!
//! [`Problem`] is the hand-coded provider: the caller supplies objective and
//! gradient closures (and optionally a Hessian-vector closure and bounds),
//! and the problem forwards evaluations to them after checking dimensions.

use crate::{
    core::model::{check_dimension, finite_difference_hessian_vector, Model},
    error::{ModelError, ModelResult},
    types::{DVector, Scalar},
};
use num_traits::Float;
use std::fmt;

type ObjectiveFn<T> = Box<dyn Fn(&DVector<T>) -> ModelResult<T>>;
type GradientFn<T> = Box<dyn Fn(&DVector<T>) -> ModelResult<DVector<T>>>;
type HessianVectorFn<T> = Box<dyn Fn(&DVector<T>, &DVector<T>) -> ModelResult<DVector<T>>>;

/// A problem defined by closures.
///
/// # Example
///
/// ```
/// use nlpkit_core::prelude::*;
///
/// let problem = Problem::new(
///     1,
///     |x: &DVector<f64>| Ok((x[0] - 2.0).powi(2)),
///     |x: &DVector<f64>| Ok(DVector::from_element(1, 2.0 * (x[0] - 2.0))),
/// )
/// .with_bounds(DVector::from_element(1, 0.0), DVector::from_element(1, 1.0))
/// .with_name("shifted parabola");
///
/// assert_eq!(problem.project(&DVector::from_element(1, 3.0))[0], 1.0);
/// ```
pub struct Problem<T: Scalar> {
    name: String,
    dimension: usize,
    lower: DVector<T>,
    upper: DVector<T>,
    initial_point: Option<DVector<T>>,
    objective: ObjectiveFn<T>,
    gradient: GradientFn<T>,
    hessian_vector: Option<HessianVectorFn<T>>,
}

impl<T: Scalar> Problem<T> {
    /// Creates an unconstrained problem of dimension `n`.
    pub fn new<F, G>(n: usize, objective: F, gradient: G) -> Self
    where
        F: Fn(&DVector<T>) -> ModelResult<T> + 'static,
        G: Fn(&DVector<T>) -> ModelResult<DVector<T>> + 'static,
    {
        Self {
            name: "problem".to_string(),
            dimension: n,
            lower: DVector::from_element(n, <T as Float>::neg_infinity()),
            upper: DVector::from_element(n, <T as Float>::infinity()),
            initial_point: None,
            objective: Box::new(objective),
            gradient: Box::new(gradient),
            hessian_vector: None,
        }
    }

    /// Supplies an analytic Hessian-vector product.
    pub fn with_hessian_vector<H>(mut self, hessian_vector: H) -> Self
    where
        H: Fn(&DVector<T>, &DVector<T>) -> ModelResult<DVector<T>> + 'static,
    {
        self.hessian_vector = Some(Box::new(hessian_vector));
        self
    }

    /// Sets variable bounds. Use infinite entries for free variables.
    ///
    /// Lengths and ordering are checked by [`Problem::validate`] and again
    /// by the solvers before iterating.
    pub fn with_bounds(mut self, lower: DVector<T>, upper: DVector<T>) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    /// Sets an upper bound on every variable.
    pub fn with_upper_bound(mut self, upper: T) -> Self {
        self.upper = DVector::from_element(self.dimension, upper);
        self
    }

    /// Sets a lower bound on every variable.
    pub fn with_lower_bound(mut self, lower: T) -> Self {
        self.lower = DVector::from_element(self.dimension, lower);
        self
    }

    /// Sets the suggested starting point.
    pub fn with_initial_point(mut self, x0: DVector<T>) -> Self {
        self.initial_point = Some(x0);
        self
    }

    /// Sets the problem name.
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Checks bound lengths, bound ordering and the starting point length.
    pub fn validate(&self) -> ModelResult<()> {
        check_dimension(self.dimension, &self.lower)?;
        check_dimension(self.dimension, &self.upper)?;
        if let Some(x0) = &self.initial_point {
            check_dimension(self.dimension, x0)?;
        }
        if let Some(i) = (0..self.dimension).find(|&i| self.lower[i] > self.upper[i]) {
            return Err(ModelError::invalid_parameter(format!(
                "lower bound {} exceeds upper bound {} for variable {i}",
                self.lower[i], self.upper[i]
            )));
        }
        Ok(())
    }
}

impl<T: Scalar> fmt::Debug for Problem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Problem")
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .field("bounded", &self.has_bounds())
            .field("analytic_hessian_vector", &self.hessian_vector.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Scalar> Model<T> for Problem<T> {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn objective(&self, x: &DVector<T>) -> ModelResult<T> {
        check_dimension(self.dimension, x)?;
        (self.objective)(x)
    }

    fn gradient(&self, x: &DVector<T>) -> ModelResult<DVector<T>> {
        check_dimension(self.dimension, x)?;
        let g = (self.gradient)(x)?;
        check_dimension(self.dimension, &g)?;
        Ok(g)
    }

    fn hessian_vector_product(&self, x: &DVector<T>, v: &DVector<T>) -> ModelResult<DVector<T>> {
        check_dimension(self.dimension, x)?;
        check_dimension(self.dimension, v)?;
        match &self.hessian_vector {
            Some(hv) => hv(x, v),
            None => finite_difference_hessian_vector(self, x, v),
        }
    }

    fn bounds(&self) -> (DVector<T>, DVector<T>) {
        (self.lower.clone(), self.upper.clone())
    }

    fn initial_point(&self) -> Option<DVector<T>> {
        self.initial_point.clone()
    }
}

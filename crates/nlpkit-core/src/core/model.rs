//! Model interface for nonlinear programming solvers.
//!
//! Every problem instance, whatever provider computes its derivatives
//! (hand-written callbacks, a modeling system, an automatic
//! differentiation engine), implements [`Model`]. Solvers only ever talk to
//! this trait, so providers are interchangeable at construction time.
//!
//! # Contract
//!
//! - All evaluations are pure functions of `x` (and `v`): calling them twice
//!   at the same point must give the same answer. Providers may cache.
//! - A provider that cannot compute a value at `x` returns
//!   [`ModelError::Evaluation`]. Solvers treat that as "step too long" and
//!   retry closer to the current iterate.
//! - Second-order information is optional. The default Hessian-vector
//!   product differentiates the gradient numerically, and the default dense
//!   Hessian is assembled column by column from Hessian-vector products.

use crate::{
    error::{ModelError, ModelResult},
    linalg::sparse::CsrMatrix,
    types::{constants, DMatrix, DVector, Scalar},
};
use num_traits::Float;
use std::cell::Cell;
use std::fmt::{self, Debug};

/// Trait for nonlinear programming problems.
///
/// Minimization is implied. Wrap a model in
/// [`ScaledModel`](crate::core::scaling::ScaledModel) to maximize or to
/// rescale the objective.
pub trait Model<T: Scalar>: Debug {
    /// Number of variables.
    fn dimension(&self) -> usize;

    /// Human-readable problem name, used in logs and summaries.
    fn name(&self) -> &str {
        "model"
    }

    /// Evaluates the objective at `x`.
    fn objective(&self, x: &DVector<T>) -> ModelResult<T>;

    /// Evaluates the gradient at `x`.
    fn gradient(&self, x: &DVector<T>) -> ModelResult<DVector<T>>;

    /// Evaluates objective and gradient together.
    ///
    /// Override when both share intermediate work.
    fn objective_and_gradient(&self, x: &DVector<T>) -> ModelResult<(T, DVector<T>)> {
        let f = self.objective(x)?;
        let g = self.gradient(x)?;
        Ok((f, g))
    }

    /// Computes the Hessian-vector product `∇²f(x) v`.
    ///
    /// # Default Implementation
    ///
    /// Forward differences of the gradient along `v`.
    fn hessian_vector_product(&self, x: &DVector<T>, v: &DVector<T>) -> ModelResult<DVector<T>> {
        finite_difference_hessian_vector(self, x, v)
    }

    /// Evaluates the dense Hessian at `x`.
    ///
    /// # Default Implementation
    ///
    /// Assembles columns from Hessian-vector products against the coordinate
    /// directions and symmetrizes the result.
    fn hessian(&self, x: &DVector<T>) -> ModelResult<DMatrix<T>> {
        let n = self.dimension();
        let mut h = DMatrix::zeros(n, n);
        let mut e = DVector::zeros(n);

        for j in 0..n {
            e[j] = T::one();
            let column = self.hessian_vector_product(x, &e)?;
            h.set_column(j, &column);
            e[j] = T::zero();
        }

        let half = <T as Scalar>::from_f64(0.5);
        Ok((&h + h.transpose()) * half)
    }

    /// Explicit sparse Hessian, when the provider assembles one.
    ///
    /// Returning `Some` makes solvers multiply with the matrix instead of
    /// calling [`Model::hessian_vector_product`].
    fn sparse_hessian(&self, _x: &DVector<T>) -> ModelResult<Option<CsrMatrix<T>>> {
        Ok(None)
    }

    /// Variable bounds `(lower, upper)`; entries may be infinite.
    fn bounds(&self) -> (DVector<T>, DVector<T>) {
        let n = self.dimension();
        (
            DVector::from_element(n, <T as Float>::neg_infinity()),
            DVector::from_element(n, <T as Float>::infinity()),
        )
    }

    /// Whether any bound is finite.
    fn has_bounds(&self) -> bool {
        let (lower, upper) = self.bounds();
        lower.iter().chain(upper.iter()).any(|b| Float::is_finite(*b))
    }

    /// Clips `x` to the bounds.
    fn project(&self, x: &DVector<T>) -> DVector<T> {
        let (lower, upper) = self.bounds();
        x.zip_zip_map(&lower, &upper, |xi, li, ui| {
            <T as Float>::min(<T as Float>::max(xi, li), ui)
        })
    }

    /// Suggested starting point, if the provider carries one.
    fn initial_point(&self) -> Option<DVector<T>> {
        None
    }

    /// Notification of an accepted step `s = x⁺ - x` with `y = g⁺ - g`.
    ///
    /// Models that learn curvature from the trajectory (quasi-Newton
    /// Hessian models) override this; everything else ignores it.
    fn accept_step(&self, _s: &DVector<T>, _y: &DVector<T>) {}
}

impl<T: Scalar, M: Model<T> + ?Sized> Model<T> for &M {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn objective(&self, x: &DVector<T>) -> ModelResult<T> {
        (**self).objective(x)
    }

    fn gradient(&self, x: &DVector<T>) -> ModelResult<DVector<T>> {
        (**self).gradient(x)
    }

    fn objective_and_gradient(&self, x: &DVector<T>) -> ModelResult<(T, DVector<T>)> {
        (**self).objective_and_gradient(x)
    }

    fn hessian_vector_product(&self, x: &DVector<T>, v: &DVector<T>) -> ModelResult<DVector<T>> {
        (**self).hessian_vector_product(x, v)
    }

    fn hessian(&self, x: &DVector<T>) -> ModelResult<DMatrix<T>> {
        (**self).hessian(x)
    }

    fn sparse_hessian(&self, x: &DVector<T>) -> ModelResult<Option<CsrMatrix<T>>> {
        (**self).sparse_hessian(x)
    }

    fn bounds(&self) -> (DVector<T>, DVector<T>) {
        (**self).bounds()
    }

    fn has_bounds(&self) -> bool {
        (**self).has_bounds()
    }

    fn project(&self, x: &DVector<T>) -> DVector<T> {
        (**self).project(x)
    }

    fn initial_point(&self) -> Option<DVector<T>> {
        (**self).initial_point()
    }

    fn accept_step(&self, s: &DVector<T>, y: &DVector<T>) {
        (**self).accept_step(s, y);
    }
}

/// Evaluation counters reported in the convergence record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EvaluationCounts {
    /// Objective evaluations
    pub objective: usize,
    /// Gradient evaluations
    pub gradient: usize,
    /// Hessian-vector products
    pub hessian_vector: usize,
    /// Dense or sparse Hessian assemblies
    pub hessian: usize,
}

impl EvaluationCounts {
    /// Objective plus gradient evaluations, the quantity budgets cap.
    pub fn function_evaluations(&self) -> usize {
        self.objective + self.gradient
    }
}

impl fmt::Display for EvaluationCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#f={} #g={} #Hv={} #H={}",
            self.objective, self.gradient, self.hessian_vector, self.hessian
        )
    }
}

/// Wrapper counting every evaluation forwarded to the inner model.
///
/// Solvers wrap the caller's model in this to fill the record's counters and
/// to enforce evaluation budgets. Failed evaluations are counted too.
#[derive(Debug)]
pub struct CountingModel<M> {
    inner: M,
    objective: Cell<usize>,
    gradient: Cell<usize>,
    hessian_vector: Cell<usize>,
    hessian: Cell<usize>,
}

impl<M> CountingModel<M> {
    /// Creates a new counting wrapper around a model.
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            objective: Cell::new(0),
            gradient: Cell::new(0),
            hessian_vector: Cell::new(0),
            hessian: Cell::new(0),
        }
    }

    /// Returns the current evaluation counts.
    pub fn counts(&self) -> EvaluationCounts {
        EvaluationCounts {
            objective: self.objective.get(),
            gradient: self.gradient.get(),
            hessian_vector: self.hessian_vector.get(),
            hessian: self.hessian.get(),
        }
    }

    /// Resets all counters to zero.
    pub fn reset_counts(&self) {
        self.objective.set(0);
        self.gradient.set(0);
        self.hessian_vector.set(0);
        self.hessian.set(0);
    }

    /// The wrapped model.
    pub fn inner(&self) -> &M {
        &self.inner
    }

    /// Unwraps the model.
    pub fn into_inner(self) -> M {
        self.inner
    }
}

fn bump(counter: &Cell<usize>) {
    counter.set(counter.get() + 1);
}

impl<T: Scalar, M: Model<T>> Model<T> for CountingModel<M> {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn objective(&self, x: &DVector<T>) -> ModelResult<T> {
        bump(&self.objective);
        self.inner.objective(x)
    }

    fn gradient(&self, x: &DVector<T>) -> ModelResult<DVector<T>> {
        bump(&self.gradient);
        self.inner.gradient(x)
    }

    fn objective_and_gradient(&self, x: &DVector<T>) -> ModelResult<(T, DVector<T>)> {
        bump(&self.objective);
        bump(&self.gradient);
        self.inner.objective_and_gradient(x)
    }

    fn hessian_vector_product(&self, x: &DVector<T>, v: &DVector<T>) -> ModelResult<DVector<T>> {
        bump(&self.hessian_vector);
        self.inner.hessian_vector_product(x, v)
    }

    fn hessian(&self, x: &DVector<T>) -> ModelResult<DMatrix<T>> {
        bump(&self.hessian);
        self.inner.hessian(x)
    }

    fn sparse_hessian(&self, x: &DVector<T>) -> ModelResult<Option<CsrMatrix<T>>> {
        let h = self.inner.sparse_hessian(x)?;
        if h.is_some() {
            bump(&self.hessian);
        }
        Ok(h)
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
        self.inner.accept_step(s, y);
    }
}

/// Forward-difference Hessian-vector product from two gradient evaluations.
pub fn finite_difference_hessian_vector<T, M>(
    model: &M,
    x: &DVector<T>,
    v: &DVector<T>,
) -> ModelResult<DVector<T>>
where
    T: Scalar,
    M: Model<T> + ?Sized,
{
    let norm = v.norm();
    if norm == T::zero() {
        return Ok(DVector::zeros(x.len()));
    }

    let scale = <T as Float>::max(T::one(), x.norm());
    let t = constants::sqrt_epsilon::<T>() * scale / norm;
    let perturbed = x + v * t;

    let g0 = model.gradient(x)?;
    let g1 = model.gradient(&perturbed)?;

    Ok((g1 - g0) / t)
}

/// Checks that a vector has the model dimension.
pub fn check_dimension<T: Scalar>(expected: usize, v: &DVector<T>) -> ModelResult<()> {
    if v.len() == expected {
        Ok(())
    } else {
        Err(ModelError::dimension_mismatch(expected, v.len()))
    }
}

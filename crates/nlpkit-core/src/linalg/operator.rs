//! Linear operators for the Newton subproblem.
//!
//! The truncated CG solver only needs `v ↦ Hv`. [`HessianOperator`] hides
//! whether that product comes from a Hessian-vector callback, an explicit
//! sparse matrix, or a dense matrix, and [`MaskedOperator`] restricts any
//! operator to a subset of free variables.

use crate::{
    core::model::Model,
    error::{ModelError, ModelResult},
    linalg::sparse::CsrMatrix,
    types::{DMatrix, DVector, Scalar},
};

/// A symmetric linear operator `v ↦ Hv`.
///
/// Applying the operator has no side effects on the operator itself.
pub trait LinearOperator<T: Scalar> {
    /// Size of the (square) operator.
    fn dimension(&self) -> usize;

    /// Computes `Hv`.
    fn apply(&self, v: &DVector<T>) -> ModelResult<DVector<T>>;
}

impl<T: Scalar> LinearOperator<T> for DMatrix<T> {
    fn dimension(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, v: &DVector<T>) -> ModelResult<DVector<T>> {
        if v.len() != self.ncols() {
            return Err(ModelError::dimension_mismatch(self.ncols(), v.len()));
        }
        Ok(self * v)
    }
}

impl<T: Scalar> LinearOperator<T> for CsrMatrix<T> {
    fn dimension(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, v: &DVector<T>) -> ModelResult<DVector<T>> {
        self.mul_vec(v)
    }
}

/// Curvature of a model at a fixed point.
pub enum HessianOperator<'a, T: Scalar, M: Model<T> + ?Sized> {
    /// Products delegated to [`Model::hessian_vector_product`].
    Products {
        /// The model
        model: &'a M,
        /// Linearization point
        x: &'a DVector<T>,
    },
    /// Explicit sparse Hessian.
    Sparse(CsrMatrix<T>),
    /// Explicit dense Hessian.
    Dense(DMatrix<T>),
}

impl<'a, T: Scalar, M: Model<T> + ?Sized> HessianOperator<'a, T, M> {
    /// Picks the cheapest curvature source the model offers at `x`.
    ///
    /// An explicit sparse Hessian wins over Hessian-vector products.
    pub fn at(model: &'a M, x: &'a DVector<T>) -> ModelResult<Self> {
        Ok(match model.sparse_hessian(x)? {
            Some(h) => Self::Sparse(h),
            None => Self::Products { model, x },
        })
    }

    /// Always uses Hessian-vector products.
    pub fn products(model: &'a M, x: &'a DVector<T>) -> Self {
        Self::Products { model, x }
    }

    /// Whether the operator holds an assembled matrix.
    pub fn is_explicit(&self) -> bool {
        !matches!(self, Self::Products { .. })
    }

    /// Dense copy of the operator, for direct factorization.
    pub fn to_dense(&self) -> ModelResult<DMatrix<T>> {
        match self {
            Self::Products { model, x } => model.hessian(x),
            Self::Sparse(h) => Ok(h.to_dense()),
            Self::Dense(h) => Ok(h.clone()),
        }
    }
}

impl<T: Scalar, M: Model<T> + ?Sized> LinearOperator<T> for HessianOperator<'_, T, M> {
    fn dimension(&self) -> usize {
        match self {
            Self::Products { x, .. } => x.len(),
            Self::Sparse(h) => h.nrows(),
            Self::Dense(h) => h.nrows(),
        }
    }

    fn apply(&self, v: &DVector<T>) -> ModelResult<DVector<T>> {
        match self {
            Self::Products { model, x } => model.hessian_vector_product(x, v),
            Self::Sparse(h) => LinearOperator::apply(h, v),
            Self::Dense(h) => LinearOperator::apply(h, v),
        }
    }
}

impl<T: Scalar, M: Model<T> + ?Sized> std::fmt::Debug for HessianOperator<'_, T, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Products { x, .. } => write!(f, "HessianOperator::Products(n={})", x.len()),
            Self::Sparse(h) => write!(f, "HessianOperator::Sparse(n={}, nnz={})", h.nrows(), h.nnz()),
            Self::Dense(h) => write!(f, "HessianOperator::Dense(n={})", h.nrows()),
        }
    }
}

/// Restriction of an operator to the free variables.
///
/// Computes `Z Zᵀ H Z Zᵀ v`, where `Z` selects the free coordinates: fixed
/// components of the input are ignored and fixed components of the output
/// are zero.
#[derive(Debug)]
pub struct MaskedOperator<'a, O> {
    inner: &'a O,
    free: &'a [bool],
}

impl<'a, O> MaskedOperator<'a, O> {
    /// Restricts `inner` to the coordinates where `free` is true.
    pub fn new(inner: &'a O, free: &'a [bool]) -> Self {
        Self { inner, free }
    }

    /// Number of free variables.
    pub fn free_count(&self) -> usize {
        self.free.iter().filter(|&&f| f).count()
    }
}

/// Zeroes the components of `v` that are not free.
pub fn mask_vector<T: Scalar>(v: &DVector<T>, free: &[bool]) -> DVector<T> {
    DVector::from_fn(v.len(), |i, _| if free[i] { v[i] } else { T::zero() })
}

impl<T: Scalar, O: LinearOperator<T>> LinearOperator<T> for MaskedOperator<'_, O> {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn apply(&self, v: &DVector<T>) -> ModelResult<DVector<T>> {
        if v.len() != self.free.len() {
            return Err(ModelError::dimension_mismatch(self.free.len(), v.len()));
        }
        let hv = self.inner.apply(&mask_vector(v, self.free))?;
        Ok(mask_vector(&hv, self.free))
    }
}

/// Quadratic model value `gᵀs + ½ sᵀHs`.
pub fn quadratic_model<T, O>(op: &O, g: &DVector<T>, s: &DVector<T>) -> ModelResult<T>
where
    T: Scalar,
    O: LinearOperator<T> + ?Sized,
{
    let hs = op.apply(s)?;
    Ok(g.dot(s) + s.dot(&hs) * <T as Scalar>::from_f64(0.5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::problem::Problem;
    use approx::assert_relative_eq;

    fn quadratic() -> Problem<f64> {
        // f(x) = 2 x1^2 + x1 x2 + x2^2
        Problem::new(
            2,
            |x: &DVector<f64>| Ok(2.0 * x[0] * x[0] + x[0] * x[1] + x[1] * x[1]),
            |x: &DVector<f64>| Ok(DVector::from_vec(vec![4.0 * x[0] + x[1], x[0] + 2.0 * x[1]])),
        )
        .with_hessian_vector(|_x: &DVector<f64>, v: &DVector<f64>| {
            Ok(DVector::from_vec(vec![4.0 * v[0] + v[1], v[0] + 2.0 * v[1]]))
        })
    }

    #[test]
    fn test_sources_agree() {
        let model = quadratic();
        let x = DVector::from_vec(vec![0.2, 0.7]);
        let v = DVector::from_vec(vec![1.0, -1.0]);

        let products = HessianOperator::at(&model, &x).unwrap();
        assert!(!products.is_explicit());
        let dense = products.to_dense().unwrap();
        let sparse: HessianOperator<'_, f64, Problem<f64>> =
            HessianOperator::Sparse(CsrMatrix::from_dense(&dense, 0.0));

        let expected = DVector::from_vec(vec![3.0, -1.0]);
        assert_relative_eq!(products.apply(&v).unwrap(), expected);
        assert_relative_eq!(sparse.apply(&v).unwrap(), expected, epsilon = 1e-12);
        assert_relative_eq!(LinearOperator::apply(&dense, &v).unwrap(), expected, epsilon = 1e-12);
        assert_eq!(sparse.dimension(), 2);
    }

    #[test]
    fn test_masked_operator() {
        let h = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 2.0]);
        let free = [true, false];
        let masked = MaskedOperator::new(&h, &free);

        let hv = masked.apply(&DVector::from_vec(vec![1.0, 5.0])).unwrap();
        assert_eq!(hv, DVector::from_vec(vec![4.0, 0.0]));
        assert_eq!(masked.free_count(), 1);
    }

    #[test]
    fn test_quadratic_model() {
        let h = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 2.0]);
        let g = DVector::from_vec(vec![1.0, 0.0]);
        let s = DVector::from_vec(vec![-0.25, 0.0]);
        // -0.25 + 0.5 * 0.25 = -0.125
        assert_relative_eq!(quadratic_model(&h, &g, &s).unwrap(), -0.125);
    }
}

//! Standard test problems for tests and benchmarks.

#![cfg(any(test, feature = "test-utils"))]

use crate::{
    core::model::{check_dimension, Model},
    error::{ModelError, ModelResult},
    linalg::sparse::CsrMatrix,
    types::{DMatrix, DVector},
};

/// Extended Rosenbrock function in `n` variables (`n` even).
///
/// f(x) = Σ 100 (x₂ᵢ - x₂ᵢ₋₁²)² + (1 - x₂ᵢ₋₁)², minimum 0 at (1, …, 1).
/// Starts from (-1.2, 1, -1.2, 1, …).
#[derive(Debug, Clone)]
pub struct Rosenbrock {
    n: usize,
    lower: DVector<f64>,
    upper: DVector<f64>,
}

impl Rosenbrock {
    /// Unbounded Rosenbrock in `n` variables.
    ///
    /// # Panics
    ///
    /// Panics if `n` is odd or smaller than 2.
    pub fn new(n: usize) -> Self {
        assert!(n >= 2 && n % 2 == 0, "extended Rosenbrock needs an even dimension");
        Self {
            n,
            lower: DVector::from_element(n, f64::NEG_INFINITY),
            upper: DVector::from_element(n, f64::INFINITY),
        }
    }

    /// Replaces the bounds; either side may hold infinities.
    pub fn with_bounds(mut self, lower: DVector<f64>, upper: DVector<f64>) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }
}

impl Model<f64> for Rosenbrock {
    fn dimension(&self) -> usize {
        self.n
    }

    fn name(&self) -> &str {
        "rosenbrock"
    }

    fn objective(&self, x: &DVector<f64>) -> ModelResult<f64> {
        check_dimension(self.n, x)?;
        Ok((0..self.n)
            .step_by(2)
            .map(|i| 100.0 * (x[i + 1] - x[i] * x[i]).powi(2) + (1.0 - x[i]).powi(2))
            .sum())
    }

    fn gradient(&self, x: &DVector<f64>) -> ModelResult<DVector<f64>> {
        check_dimension(self.n, x)?;
        let mut g = DVector::zeros(self.n);
        for i in (0..self.n).step_by(2) {
            let r = x[i + 1] - x[i] * x[i];
            g[i] = -400.0 * x[i] * r - 2.0 * (1.0 - x[i]);
            g[i + 1] = 200.0 * r;
        }
        Ok(g)
    }

    fn hessian_vector_product(
        &self,
        x: &DVector<f64>,
        v: &DVector<f64>,
    ) -> ModelResult<DVector<f64>> {
        check_dimension(self.n, x)?;
        check_dimension(self.n, v)?;
        let mut hv = DVector::zeros(self.n);
        for i in (0..self.n).step_by(2) {
            let h11 = 1200.0 * x[i] * x[i] - 400.0 * x[i + 1] + 2.0;
            let h12 = -400.0 * x[i];
            hv[i] = h11 * v[i] + h12 * v[i + 1];
            hv[i + 1] = h12 * v[i] + 200.0 * v[i + 1];
        }
        Ok(hv)
    }

    fn bounds(&self) -> (DVector<f64>, DVector<f64>) {
        (self.lower.clone(), self.upper.clone())
    }

    fn initial_point(&self) -> Option<DVector<f64>> {
        Some(DVector::from_fn(self.n, |i, _| if i % 2 == 0 { -1.2 } else { 1.0 }))
    }
}

/// Convex quadratic f(x) = ½ xᵀAx - bᵀx with optional bounds.
///
/// With `sparse` set, the Hessian is exposed as a CSR matrix.
#[derive(Debug, Clone)]
pub struct Quadratic {
    a: DMatrix<f64>,
    b: DVector<f64>,
    lower: DVector<f64>,
    upper: DVector<f64>,
    sparse: bool,
}

impl Quadratic {
    /// Unbounded quadratic with dense Hessian `a` and linear term `b`.
    ///
    /// `a` is expected to be symmetric; it is used as given.
    pub fn new(a: DMatrix<f64>, b: DVector<f64>) -> Self {
        let n = b.len();
        Self {
            a,
            b,
            lower: DVector::from_element(n, f64::NEG_INFINITY),
            upper: DVector::from_element(n, f64::INFINITY),
            sparse: false,
        }
    }

    /// Diagonal quadratic ½ Σ dᵢ xᵢ² - bᵀx.
    pub fn diagonal(d: &[f64], b: &[f64]) -> Self {
        Self::new(
            DMatrix::from_diagonal(&DVector::from_column_slice(d)),
            DVector::from_column_slice(b),
        )
    }

    /// Tridiagonal (2, -1) Laplacian of size `n` with unit right-hand side.
    pub fn laplacian(n: usize) -> Self {
        let a = DMatrix::from_fn(n, n, |i, j| match i.abs_diff(j) {
            0 => 2.0,
            1 => -1.0,
            _ => 0.0,
        });
        Self::new(a, DVector::from_element(n, 1.0))
    }

    /// Replaces the bounds; either side may hold infinities.
    pub fn with_bounds(mut self, lower: DVector<f64>, upper: DVector<f64>) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    /// Exposes the Hessian in CSR form.
    pub fn with_sparse_hessian(mut self) -> Self {
        self.sparse = true;
        self
    }

    /// Unconstrained minimizer A⁻¹b.
    pub fn minimizer(&self) -> Option<DVector<f64>> {
        self.a.clone().lu().solve(&self.b)
    }
}

impl Model<f64> for Quadratic {
    fn dimension(&self) -> usize {
        self.b.len()
    }

    fn name(&self) -> &str {
        "quadratic"
    }

    fn objective(&self, x: &DVector<f64>) -> ModelResult<f64> {
        check_dimension(self.b.len(), x)?;
        Ok(0.5 * x.dot(&(&self.a * x)) - self.b.dot(x))
    }

    fn gradient(&self, x: &DVector<f64>) -> ModelResult<DVector<f64>> {
        check_dimension(self.b.len(), x)?;
        Ok(&self.a * x - &self.b)
    }

    fn hessian_vector_product(
        &self,
        _x: &DVector<f64>,
        v: &DVector<f64>,
    ) -> ModelResult<DVector<f64>> {
        check_dimension(self.b.len(), v)?;
        Ok(&self.a * v)
    }

    fn hessian(&self, _x: &DVector<f64>) -> ModelResult<DMatrix<f64>> {
        Ok(self.a.clone())
    }

    fn sparse_hessian(&self, _x: &DVector<f64>) -> ModelResult<Option<CsrMatrix<f64>>> {
        Ok(self.sparse.then(|| CsrMatrix::from_dense(&self.a, 0.0)))
    }

    fn bounds(&self) -> (DVector<f64>, DVector<f64>) {
        (self.lower.clone(), self.upper.clone())
    }

    fn initial_point(&self) -> Option<DVector<f64>> {
        Some(DVector::zeros(self.b.len()))
    }
}

/// f(x) = Σ xᵢ - ln xᵢ, undefined for any xᵢ ≤ 0. Minimum n at (1, …, 1).
///
/// Long steps from near the origin leave the domain, which exercises the
/// evaluation-failure recovery of the solvers.
#[derive(Debug, Clone)]
pub struct LogBarrier {
    n: usize,
}

impl LogBarrier {
    /// Barrier in `n` variables, starting at 0.05 in every coordinate.
    pub fn new(n: usize) -> Self {
        Self { n }
    }

    fn domain_check(x: &DVector<f64>) -> ModelResult<()> {
        match x.iter().position(|&xi| !(xi > 0.0)) {
            Some(i) => Err(ModelError::evaluation(format!("x[{i}] = {} outside the domain", x[i]))),
            None => Ok(()),
        }
    }
}

impl Model<f64> for LogBarrier {
    fn dimension(&self) -> usize {
        self.n
    }

    fn name(&self) -> &str {
        "log-barrier"
    }

    fn objective(&self, x: &DVector<f64>) -> ModelResult<f64> {
        check_dimension(self.n, x)?;
        Self::domain_check(x)?;
        Ok(x.iter().map(|&xi| xi - xi.ln()).sum())
    }

    fn gradient(&self, x: &DVector<f64>) -> ModelResult<DVector<f64>> {
        check_dimension(self.n, x)?;
        Self::domain_check(x)?;
        Ok(x.map(|xi| 1.0 - 1.0 / xi))
    }

    fn hessian_vector_product(
        &self,
        x: &DVector<f64>,
        v: &DVector<f64>,
    ) -> ModelResult<DVector<f64>> {
        check_dimension(self.n, v)?;
        Self::domain_check(x)?;
        Ok(v.zip_map(x, |vi, xi| vi / (xi * xi)))
    }

    fn initial_point(&self) -> Option<DVector<f64>> {
        Some(DVector::from_element(self.n, 0.05))
    }
}

/// A problem that fails at every point.
#[derive(Debug, Clone, Copy)]
pub struct Unevaluable;

impl Model<f64> for Unevaluable {
    fn dimension(&self) -> usize {
        2
    }

    fn objective(&self, _x: &DVector<f64>) -> ModelResult<f64> {
        Err(ModelError::evaluation("objective unavailable"))
    }

    fn gradient(&self, _x: &DVector<f64>) -> ModelResult<DVector<f64>> {
        Err(ModelError::evaluation("gradient unavailable"))
    }
}

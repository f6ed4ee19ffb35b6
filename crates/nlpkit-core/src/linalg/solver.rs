//! Direct linear solvers.
//!
//! Trust-region solvers can replace the truncated CG inner iteration with an
//! exact solve of the Newton system. Any factorization backend plugs in
//! through [`LinearSolver`]; two dense backends built on nalgebra's
//! decompositions ship with the crate.

use crate::{
    error::{SolverError, SolverResult},
    types::{DMatrix, DVector, Scalar},
};
use nalgebra::{Cholesky, Dyn, LU};
use std::fmt::Debug;

/// A factorize-then-solve linear algebra provider.
pub trait LinearSolver<T: Scalar>: Debug {
    /// Name of the backend.
    fn name(&self) -> &str;

    /// Factorizes `matrix`, replacing any previous factorization.
    ///
    /// Fails with [`SolverError::SingularSystem`] when the matrix cannot be
    /// factorized by this backend.
    fn factorize(&mut self, matrix: &DMatrix<T>) -> SolverResult<()>;

    /// Solves `A x = rhs` with the current factorization.
    fn solve(&self, rhs: &DVector<T>) -> SolverResult<DVector<T>>;
}

/// Available dense backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LinearSolverKind {
    /// Cholesky factorization, symmetric positive definite systems only.
    #[default]
    Cholesky,
    /// LU factorization with partial pivoting.
    Lu,
}

impl LinearSolverKind {
    /// Instantiates the backend.
    pub fn build<T: Scalar>(self) -> Box<dyn LinearSolver<T>> {
        match self {
            Self::Cholesky => Box::new(CholeskySolver::new()),
            Self::Lu => Box::new(LuSolver::new()),
        }
    }
}

/// Cholesky backend.
///
/// Rejects matrices that are not positive definite, which in a Newton
/// subproblem means the model has no interior minimizer.
#[derive(Debug, Default)]
pub struct CholeskySolver<T: Scalar> {
    factor: Option<Cholesky<T, Dyn>>,
}

impl<T: Scalar> CholeskySolver<T> {
    /// Creates an empty solver.
    pub fn new() -> Self {
        Self { factor: None }
    }
}

impl<T: Scalar> LinearSolver<T> for CholeskySolver<T> {
    fn name(&self) -> &str {
        "cholesky"
    }

    fn factorize(&mut self, matrix: &DMatrix<T>) -> SolverResult<()> {
        if !matrix.is_square() {
            return Err(SolverError::dimension_mismatch(
                "square matrix",
                format!("{}x{}", matrix.nrows(), matrix.ncols()),
            ));
        }
        self.factor = None;
        let factor = matrix
            .clone()
            .cholesky()
            .ok_or_else(|| SolverError::singular_system("matrix is not positive definite"))?;
        self.factor = Some(factor);
        Ok(())
    }

    fn solve(&self, rhs: &DVector<T>) -> SolverResult<DVector<T>> {
        let factor = self
            .factor
            .as_ref()
            .ok_or_else(|| SolverError::singular_system("solve called before factorize"))?;
        if rhs.len() != factor.l_dirty().nrows() {
            return Err(SolverError::dimension_mismatch(factor.l_dirty().nrows(), rhs.len()));
        }
        Ok(factor.solve(rhs))
    }
}

/// LU backend.
#[derive(Debug, Default)]
pub struct LuSolver<T: Scalar> {
    factor: Option<LU<T, Dyn, Dyn>>,
}

impl<T: Scalar> LuSolver<T> {
    /// Creates an empty solver.
    pub fn new() -> Self {
        Self { factor: None }
    }
}

impl<T: Scalar> LinearSolver<T> for LuSolver<T> {
    fn name(&self) -> &str {
        "lu"
    }

    fn factorize(&mut self, matrix: &DMatrix<T>) -> SolverResult<()> {
        if !matrix.is_square() {
            return Err(SolverError::dimension_mismatch(
                "square matrix",
                format!("{}x{}", matrix.nrows(), matrix.ncols()),
            ));
        }
        self.factor = None;
        let lu = matrix.clone().lu();
        if !lu.is_invertible() {
            return Err(SolverError::singular_system("zero pivot in LU factorization"));
        }
        self.factor = Some(lu);
        Ok(())
    }

    fn solve(&self, rhs: &DVector<T>) -> SolverResult<DVector<T>> {
        let factor = self
            .factor
            .as_ref()
            .ok_or_else(|| SolverError::singular_system("solve called before factorize"))?;
        factor
            .solve(rhs)
            .ok_or_else(|| SolverError::singular_system("LU solve failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spd() -> DMatrix<f64> {
        DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0])
    }

    #[test]
    fn test_backends_solve_spd_system() {
        let rhs = DVector::from_vec(vec![1.0, 2.0]);
        let expected = DVector::from_vec(vec![1.0 / 11.0, 7.0 / 11.0]);

        for kind in [LinearSolverKind::Cholesky, LinearSolverKind::Lu] {
            let mut solver = kind.build::<f64>();
            solver.factorize(&spd()).unwrap();
            assert_relative_eq!(solver.solve(&rhs).unwrap(), expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_singular_and_indefinite() {
        let singular = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let indefinite = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, -1.0]);

        let mut lu = LuSolver::new();
        assert!(matches!(lu.factorize(&singular), Err(SolverError::SingularSystem { .. })));
        assert!(lu.factorize(&indefinite).is_ok());

        let mut chol = CholeskySolver::new();
        assert!(matches!(chol.factorize(&indefinite), Err(SolverError::SingularSystem { .. })));
        assert!(chol.solve(&DVector::zeros(2)).is_err());
    }
}

//! Sparse matrix storage for explicit Hessians.
//!
//! Providers that assemble the Hessian (modeling systems typically emit the
//! lower triangle in coordinate form) hand it over as a [`CsrMatrix`], which
//! the solvers then use as a linear operator.

use crate::{
    error::{ModelError, ModelResult},
    types::{DMatrix, DVector, Scalar},
};
use num_traits::Float;

/// Compressed Sparse Row (CSR) format matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix<T: Scalar> {
    /// Number of rows
    nrows: usize,
    /// Number of columns
    ncols: usize,
    /// Row pointers (length nrows + 1)
    row_ptr: Vec<usize>,
    /// Column indices (length nnz)
    col_idx: Vec<usize>,
    /// Non-zero values (length nnz)
    values: Vec<T>,
}

impl<T: Scalar> CsrMatrix<T> {
    /// Creates a new CSR matrix from raw data.
    pub fn new(
        nrows: usize,
        ncols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<T>,
    ) -> ModelResult<Self> {
        if row_ptr.len() != nrows + 1 {
            return Err(ModelError::dimension_mismatch(
                format!("row_ptr length {}", nrows + 1),
                format!("row_ptr length {}", row_ptr.len()),
            ));
        }

        let nnz = row_ptr[nrows];
        if col_idx.len() != nnz || values.len() != nnz {
            return Err(ModelError::dimension_mismatch(
                format!("{nnz} column indices and values"),
                format!("{} column indices, {} values", col_idx.len(), values.len()),
            ));
        }

        if row_ptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(ModelError::invalid_parameter(
                "row pointers must be non-decreasing",
            ));
        }

        if let Some(&j) = col_idx.iter().find(|&&j| j >= ncols) {
            return Err(ModelError::invalid_parameter(format!(
                "column index {j} out of range for {ncols} columns"
            )));
        }

        Ok(Self {
            nrows,
            ncols,
            row_ptr,
            col_idx,
            values,
        })
    }

    /// Builds a CSR matrix from coordinate-format triplets.
    ///
    /// Duplicate entries are summed. With `symmetric` set, the triplets are
    /// read as one triangle of a symmetric matrix and every off-diagonal
    /// entry is mirrored.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        rows: &[usize],
        cols: &[usize],
        vals: &[T],
        symmetric: bool,
    ) -> ModelResult<Self> {
        if rows.len() != cols.len() || rows.len() != vals.len() {
            return Err(ModelError::dimension_mismatch(
                format!("{} rows, columns and values", vals.len()),
                format!("{} rows, {} columns", rows.len(), cols.len()),
            ));
        }

        let mut entries: Vec<(usize, usize, T)> = Vec::with_capacity(vals.len() * 2);
        for ((&i, &j), &v) in rows.iter().zip(cols).zip(vals) {
            if i >= nrows || j >= ncols {
                return Err(ModelError::invalid_parameter(format!(
                    "entry ({i}, {j}) outside a {nrows}x{ncols} matrix"
                )));
            }
            entries.push((i, j, v));
            if symmetric && i != j {
                if j >= nrows || i >= ncols {
                    return Err(ModelError::invalid_parameter(format!(
                        "mirrored entry ({j}, {i}) outside a {nrows}x{ncols} matrix"
                    )));
                }
                entries.push((j, i, v));
            }
        }
        entries.sort_by_key(|&(i, j, _)| (i, j));

        let mut row_ptr = vec![0; nrows + 1];
        let mut col_idx = Vec::with_capacity(entries.len());
        let mut values: Vec<T> = Vec::with_capacity(entries.len());
        let mut last: Option<(usize, usize)> = None;

        for (i, j, v) in entries {
            if last == Some((i, j)) {
                if let Some(acc) = values.last_mut() {
                    *acc += v;
                }
                continue;
            }
            col_idx.push(j);
            values.push(v);
            row_ptr[i + 1] += 1;
            last = Some((i, j));
        }
        for i in 0..nrows {
            row_ptr[i + 1] += row_ptr[i];
        }

        Self::new(nrows, ncols, row_ptr, col_idx, values)
    }

    /// Creates a CSR matrix from a dense matrix, dropping entries below `tolerance`.
    pub fn from_dense(dense: &DMatrix<T>, tolerance: T) -> Self {
        let mut row_ptr = vec![0];
        let mut col_idx = Vec::new();
        let mut values = Vec::new();

        for i in 0..dense.nrows() {
            for j in 0..dense.ncols() {
                let val = dense[(i, j)];
                if Float::abs(val) > tolerance {
                    col_idx.push(j);
                    values.push(val);
                }
            }
            row_ptr.push(col_idx.len());
        }

        Self {
            nrows: dense.nrows(),
            ncols: dense.ncols(),
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Converts to a dense matrix.
    pub fn to_dense(&self) -> DMatrix<T> {
        let mut dense = DMatrix::zeros(self.nrows, self.ncols);
        for (i, j, v) in self.iter() {
            dense[(i, j)] = v;
        }
        dense
    }

    /// Iterates over the stored `(row, column, value)` entries in row order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.nrows).flat_map(move |i| {
            (self.row_ptr[i]..self.row_ptr[i + 1]).map(move |k| (i, self.col_idx[k], self.values[k]))
        })
    }

    /// Returns the number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Returns the number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Returns the number of stored elements.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Multiplies every stored value by `factor`.
    pub fn scale_mut(&mut self, factor: T) {
        for v in &mut self.values {
            *v *= factor;
        }
    }

    /// Sparse matrix-vector multiplication: y = A * x
    pub fn spmv(&self, x: &DVector<T>, y: &mut DVector<T>) -> ModelResult<()> {
        if x.len() != self.ncols {
            return Err(ModelError::dimension_mismatch(
                format!("vector length {}", self.ncols),
                format!("vector length {}", x.len()),
            ));
        }
        if y.len() != self.nrows {
            return Err(ModelError::dimension_mismatch(
                format!("result length {}", self.nrows),
                format!("result length {}", y.len()),
            ));
        }

        for i in 0..self.nrows {
            let mut sum = T::zero();
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                sum += self.values[k] * x[self.col_idx[k]];
            }
            y[i] = sum;
        }

        Ok(())
    }

    /// Allocating matrix-vector product.
    pub fn mul_vec(&self, x: &DVector<T>) -> ModelResult<DVector<T>> {
        let mut y = DVector::zeros(self.nrows);
        self.spmv(x, &mut y)?;
        Ok(y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_csr_creation() {
        let m = CsrMatrix::new(2, 2, vec![0, 1, 3], vec![0, 0, 1], vec![4.0, 1.0, 3.0]).unwrap();
        assert_eq!(m.nnz(), 3);
        assert_eq!(m.to_dense(), DMatrix::from_row_slice(2, 2, &[4.0, 0.0, 1.0, 3.0]));

        assert!(CsrMatrix::new(2, 2, vec![0, 1], vec![0], vec![1.0]).is_err());
        assert!(CsrMatrix::new(1, 2, vec![0, 1], vec![5], vec![1.0]).is_err());
    }

    #[test]
    fn test_symmetric_triplets() {
        // Lower triangle of [[4, 1], [1, 3]] with the diagonal split in two.
        let m = CsrMatrix::from_triplets(
            2,
            2,
            &[0, 1, 1, 0],
            &[0, 0, 1, 0],
            &[3.0, 1.0, 3.0, 1.0],
            true,
        )
        .unwrap();

        let dense = m.to_dense();
        assert_eq!(dense, DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]));
        assert_eq!(m.nnz(), 4);
    }

    #[test]
    fn test_triplets_out_of_range() {
        let err = CsrMatrix::<f64>::from_triplets(2, 2, &[2], &[0], &[1.0], false);
        assert!(matches!(err, Err(ModelError::InvalidParameter { .. })));
    }

    #[test]
    fn test_spmv_matches_dense() {
        let dense = DMatrix::from_row_slice(3, 3, &[2.0, 0.0, 1.0, 0.0, 3.0, 0.0, 1.0, 0.0, 5.0]);
        let sparse = CsrMatrix::from_dense(&dense, 0.0);
        let x = DVector::from_vec(vec![1.0, -2.0, 0.5]);

        let y = sparse.mul_vec(&x).unwrap();
        assert_relative_eq!(y, &dense * &x, epsilon = 1e-14);

        let mut scaled = sparse.clone();
        scaled.scale_mut(-1.0);
        assert_relative_eq!(scaled.mul_vec(&x).unwrap(), -(&dense * &x), epsilon = 1e-14);

        assert!(sparse.mul_vec(&DVector::zeros(2)).is_err());
    }
}

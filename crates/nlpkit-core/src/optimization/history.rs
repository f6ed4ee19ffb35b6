//! Limited-memory BFGS curvature history.
//!
//! [`LbfgsHistory`] keeps the last `m` correction pairs `(s, y)` with
//! `sᵀy > 0` and applies the implicit inverse Hessian approximation by the
//! two-loop recursion. The same pairs also yield products with the direct
//! approximation `B`, which is what a quasi-Newton trust-region model needs.

use crate::{
    error::{SolverError, SolverResult},
    types::{DVector, Scalar},
};
use log::trace;
use num_traits::Float;
use std::collections::VecDeque;

/// One correction pair with its cached `ρ = 1 / sᵀy`.
#[derive(Debug, Clone)]
struct Correction<T: Scalar> {
    s: DVector<T>,
    y: DVector<T>,
    rho: T,
}

/// Bounded FIFO of correction pairs.
///
/// Pairs violating the curvature condition are rejected by
/// [`LbfgsHistory::try_push`]; once full, the oldest pair is evicted.
#[derive(Debug, Clone)]
pub struct LbfgsHistory<T: Scalar> {
    capacity: usize,
    pairs: VecDeque<Correction<T>>,
}

impl<T: Scalar> LbfgsHistory<T> {
    /// Creates an empty history holding at most `capacity` pairs.
    pub fn new(capacity: usize) -> SolverResult<Self> {
        if capacity == 0 {
            return Err(SolverError::invalid_configuration(
                "L-BFGS memory must be at least 1",
                "lbfgs_memory",
                "0",
            ));
        }
        Ok(Self {
            capacity,
            pairs: VecDeque::with_capacity(capacity),
        })
    }

    /// Maximum number of stored pairs.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether no pair is stored.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Drops every stored pair.
    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    /// Stores `(s, y)` if `sᵀy` is safely positive.
    ///
    /// Returns whether the pair was stored.
    pub fn try_push(&mut self, s: DVector<T>, y: DVector<T>) -> bool {
        let sy = s.dot(&y);
        let threshold = T::EPSILON * s.norm() * y.norm();
        if !(sy > threshold) || !Float::is_finite(sy) {
            trace!("lbfgs: skipping pair with sᵀy = {:e}", Scalar::to_f64(sy));
            return false;
        }

        if self.pairs.len() == self.capacity {
            self.pairs.pop_front();
        }
        self.pairs.push_back(Correction {
            s,
            y,
            rho: T::one() / sy,
        });
        true
    }

    /// Initial scaling `γ = sᵀy / yᵀy` of the newest pair, 1 when empty.
    pub fn gamma(&self) -> T {
        match self.pairs.back() {
            Some(last) => {
                let yy = last.y.norm_squared();
                if yy > T::zero() {
                    last.s.dot(&last.y) / yy
                } else {
                    T::one()
                }
            }
            None => T::one(),
        }
    }

    /// Applies the inverse approximation `H ≈ ∇²f⁻¹` to `v` (two-loop recursion).
    pub fn apply_inverse(&self, v: &DVector<T>) -> DVector<T> {
        let mut q = v.clone();
        let mut alphas = Vec::with_capacity(self.pairs.len());

        for pair in self.pairs.iter().rev() {
            let alpha = pair.rho * pair.s.dot(&q);
            q.axpy(-alpha, &pair.y, T::one());
            alphas.push(alpha);
        }

        q *= self.gamma();

        for (pair, alpha) in self.pairs.iter().zip(alphas.into_iter().rev()) {
            let beta = pair.rho * pair.y.dot(&q);
            q.axpy(alpha - beta, &pair.s, T::one());
        }

        q
    }

    /// Applies the direct approximation `B ≈ ∇²f` to `v`.
    ///
    /// Replays the BFGS updates from `B₀ = I / γ`, which costs `O(m²n)` per
    /// product.
    pub fn apply(&self, v: &DVector<T>) -> DVector<T> {
        let b0 = T::one() / self.gamma();
        let k = self.pairs.len();

        // bs[i] = B_i s_i, where B_i has absorbed pairs 0..i.
        let mut bs: Vec<DVector<T>> = Vec::with_capacity(k);
        for i in 0..k {
            let mut w = &self.pairs[i].s * b0;
            for j in 0..i {
                Self::update(&mut w, &self.pairs[i].s, &self.pairs[j], &bs[j]);
            }
            bs.push(w);
        }

        let mut result = v * b0;
        for (pair, b_s) in self.pairs.iter().zip(&bs) {
            Self::update(&mut result, v, pair, b_s);
        }
        result
    }

    /// Adds the rank-two BFGS correction of `pair` to `w = B u`.
    fn update(w: &mut DVector<T>, u: &DVector<T>, pair: &Correction<T>, b_s: &DVector<T>) {
        let s_bs = pair.s.dot(b_s);
        if s_bs > T::zero() {
            let coeff = b_s.dot(u) / s_bs;
            w.axpy(-coeff, b_s, T::one());
        }
        let coeff = pair.y.dot(u) * pair.rho;
        w.axpy(coeff, &pair.y, T::one());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    fn quadratic() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, 0.5, 0.0, 0.5, 2.0])
    }

    fn fill(history: &mut LbfgsHistory<f64>, a: &DMatrix<f64>) {
        for k in 0..3 {
            let s = DVector::from_fn(3, |i, _| if i == k { 1.0 } else { 0.1 * (i + k) as f64 });
            let y = a * &s;
            assert!(history.try_push(s, y));
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(LbfgsHistory::<f64>::new(0).is_err());
    }

    #[test]
    fn test_empty_history_is_identity() {
        let history = LbfgsHistory::<f64>::new(5).unwrap();
        let v = DVector::from_vec(vec![1.0, -2.0, 3.0]);
        assert_relative_eq!(history.apply_inverse(&v), v);
        assert_relative_eq!(history.apply(&v), v);
    }

    #[test]
    fn test_curvature_guard() {
        let mut history = LbfgsHistory::<f64>::new(5).unwrap();
        let s = DVector::from_vec(vec![1.0, 0.0]);
        assert!(!history.try_push(s.clone(), DVector::from_vec(vec![-1.0, 0.0])));
        assert!(!history.try_push(s.clone(), DVector::from_vec(vec![0.0, 1.0])));
        assert!(history.is_empty());
        assert!(history.try_push(s, DVector::from_vec(vec![2.0, 0.0])));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_rejected_pairs_leave_full_history_untouched() {
        let a = quadratic();
        let mut history = LbfgsHistory::new(3).unwrap();
        fill(&mut history, &a);
        assert_eq!(history.len(), history.capacity());

        let snapshot: Vec<(DVector<f64>, DVector<f64>)> =
            history.pairs.iter().map(|p| (p.s.clone(), p.y.clone())).collect();
        let v = DVector::from_vec(vec![1.0, -0.5, 0.25]);
        let before = history.apply_inverse(&v);

        let s = DVector::from_vec(vec![1.0, 1.0, 0.0]);
        assert!(!history.try_push(s.clone(), -(&a * &s)));
        assert!(!history.try_push(s, DVector::from_vec(vec![f64::NAN, 1.0, f64::INFINITY])));

        let after: Vec<(DVector<f64>, DVector<f64>)> =
            history.pairs.iter().map(|p| (p.s.clone(), p.y.clone())).collect();
        assert_eq!(after, snapshot);
        assert_eq!(history.apply_inverse(&v), before);
    }

    #[test]
    fn test_eviction_keeps_newest() {
        let mut history = LbfgsHistory::<f64>::new(2).unwrap();
        for k in 1..=4 {
            let s = DVector::from_element(1, k as f64);
            let y = DVector::from_element(1, 2.0 * k as f64);
            history.try_push(s, y);
        }
        assert_eq!(history.len(), 2);
        assert_relative_eq!(history.pairs[0].s[0], 3.0);
        assert_relative_eq!(history.pairs[1].s[0], 4.0);
    }

    #[test]
    fn test_secant_equations() {
        let a = quadratic();
        let mut history = LbfgsHistory::new(5).unwrap();
        fill(&mut history, &a);

        // Newest pair satisfies both secant equations exactly.
        let last = history.pairs.back().unwrap().clone();
        assert_relative_eq!(history.apply(&last.s), last.y, epsilon = 1e-10);
        assert_relative_eq!(history.apply_inverse(&last.y), last.s, epsilon = 1e-10);
    }

    #[test]
    fn test_direct_and_inverse_agree() {
        let a = quadratic();
        let mut history = LbfgsHistory::new(5).unwrap();
        fill(&mut history, &a);

        let v = DVector::from_vec(vec![0.3, -1.0, 2.0]);
        assert!(v.dot(&history.apply(&v)) > 0.0);
        assert_relative_eq!(history.apply_inverse(&history.apply(&v)), v, epsilon = 1e-8);
    }

    proptest::proptest! {
        #[test]
        fn prop_length_bounded_by_capacity(
            capacity in 1usize..8,
            pairs in proptest::collection::vec((-3.0f64..3.0, -3.0f64..3.0), 0..30),
        ) {
            let mut history = LbfgsHistory::<f64>::new(capacity).unwrap();
            for (s, y) in pairs {
                let before = history.len();
                let stored = history.try_push(DVector::from_element(1, s), DVector::from_element(1, y));
                proptest::prop_assert_eq!(stored, s * y > f64::EPSILON * s.abs() * y.abs());
                if !stored {
                    proptest::prop_assert_eq!(history.len(), before);
                }
                proptest::prop_assert!(history.len() <= capacity);
            }
        }
    }
}

//! Integration tests for the model contract and its wrappers.

use approx::assert_relative_eq;
use nlpkit_core::{
    linalg::{quadratic_model, HessianOperator, LinearOperator, MaskedOperator},
    prelude::*,
};

/// f(x, y) = (x - 1)^2 + 10 (y + 2)^2 with 0 <= x <= 0.5.
fn bounded_bowl() -> Problem<f64> {
    Problem::new(
        2,
        |x: &DVector<f64>| Ok((x[0] - 1.0).powi(2) + 10.0 * (x[1] + 2.0).powi(2)),
        |x: &DVector<f64>| Ok(DVector::from_vec(vec![2.0 * (x[0] - 1.0), 20.0 * (x[1] + 2.0)])),
    )
    .with_bounds(
        DVector::from_vec(vec![0.0, f64::NEG_INFINITY]),
        DVector::from_vec(vec![0.5, f64::INFINITY]),
    )
    .with_name("bounded bowl")
}

#[test]
fn test_counting_through_references() {
    let counted = CountingModel::new(bounded_bowl());
    let x = DVector::from_vec(vec![0.2, 0.0]);

    {
        let by_ref: &dyn Model<f64> = &counted;
        by_ref.objective(&x).unwrap();
        by_ref.objective_and_gradient(&x).unwrap();
        by_ref.hessian_vector_product(&x, &x).unwrap();
        assert_eq!(by_ref.name(), "bounded bowl");
    }

    let counts = counted.counts();
    assert_eq!(counts.objective, 2);
    // Finite-difference products go through the inner model, not the counter.
    assert_eq!(counts.gradient, 1);
    assert_eq!(counts.hessian_vector, 1);
    assert_eq!(counts.function_evaluations(), 3);
}

#[test]
fn test_projection_and_active_set() {
    let model = bounded_bowl();
    let bounds = Bounds::from_model(&model).unwrap();
    let x = model.project(&DVector::from_vec(vec![3.0, -7.0]));

    assert_eq!(x, DVector::from_vec(vec![0.5, -7.0]));
    assert!(bounds.contains(&x));

    let g = model.gradient(&x).unwrap();
    let active = bounds.active_mask(&x, &g, 0.0);
    assert_eq!(active, vec![true, false]);

    let pg = bounds.projected_gradient(&x, &g);
    assert_eq!(pg[0], 0.0);
    assert_relative_eq!(pg[1], g[1]);
}

#[test]
fn test_hessian_operator_variants_agree() {
    let model = bounded_bowl();
    let x = DVector::from_vec(vec![0.3, 0.1]);
    let v = DVector::from_vec(vec![1.0, -1.0]);

    let products = HessianOperator::products(&model, &x);
    let dense = HessianOperator::<f64, Problem<f64>>::Dense(model.hessian(&x).unwrap());
    let sparse = HessianOperator::<f64, Problem<f64>>::Sparse(CsrMatrix::from_dense(
        &model.hessian(&x).unwrap(),
        1e-8,
    ));

    let expected = DVector::from_vec(vec![2.0, -20.0]);
    for op in [&products, &dense, &sparse] {
        assert_relative_eq!(op.apply(&v).unwrap(), expected, epsilon = 1e-5);
    }
    assert!(!products.is_explicit());
    assert!(dense.is_explicit());
}

#[test]
fn test_masked_quadratic_model() {
    let h = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 20.0]);
    let free = [false, true];
    let masked = MaskedOperator::new(&h, &free);
    let g = DVector::from_vec(vec![-1.0, 4.0]);
    let s = DVector::from_vec(vec![0.0, -0.2]);

    // q(s) = g.s + 0.5 s.Hs = -0.8 + 0.4
    assert_relative_eq!(quadratic_model(&masked, &g, &s).unwrap(), -0.4, epsilon = 1e-12);
    assert_eq!(masked.free_count(), 1);
}

#[test]
fn test_maximization_wrapper() {
    let concave = Problem::new(
        1,
        |x: &DVector<f64>| Ok(-(x[0] - 3.0).powi(2)),
        |x: &DVector<f64>| Ok(DVector::from_element(1, -2.0 * (x[0] - 3.0))),
    );
    let scaled = ScaledModel::maximize(concave);
    let x = DVector::from_element(1, 1.0);

    assert_relative_eq!(scaled.objective(&x).unwrap(), 4.0);
    assert_relative_eq!(scaled.gradient(&x).unwrap()[0], -4.0);
    assert_relative_eq!(scaled.unscale_objective(4.0), -4.0);
    assert!(scaled.is_maximization());
}

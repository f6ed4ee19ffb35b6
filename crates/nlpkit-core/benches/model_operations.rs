//! Benchmarks for Hessian products and line searches.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nlpkit_core::{linalg::HessianOperator, prelude::*};

/// Tridiagonal quadratic with an analytic gradient and no analytic HVP.
fn chain(n: usize) -> Problem<f64> {
    Problem::new(
        n,
        |x: &DVector<f64>| {
            let mut f = 0.0;
            for i in 0..x.len() {
                f += x[i] * x[i];
                if i + 1 < x.len() {
                    f -= x[i] * x[i + 1];
                }
            }
            Ok(f - x.sum())
        },
        |x: &DVector<f64>| {
            let n = x.len();
            Ok(DVector::from_fn(n, |i, _| {
                let mut g = 2.0 * x[i] - 1.0;
                if i > 0 {
                    g -= x[i - 1];
                }
                if i + 1 < n {
                    g -= x[i + 1];
                }
                g
            }))
        },
    )
}

fn laplacian(n: usize) -> DMatrix<f64> {
    DMatrix::from_fn(n, n, |i, j| match i.abs_diff(j) {
        0 => 2.0,
        1 => -1.0,
        _ => 0.0,
    })
}

fn bench_hessian_products(c: &mut Criterion) {
    let mut group = c.benchmark_group("hessian_product");

    for n in [10, 100, 1000] {
        let model = chain(n);
        let x = DVector::from_fn(n, |i, _| (i as f64 * 0.1).sin());
        let v = DVector::from_fn(n, |i, _| (i as f64 * 0.3).cos());
        let dense = laplacian(n);
        let sparse = CsrMatrix::from_dense(&dense, 0.0);

        group.bench_with_input(BenchmarkId::new("finite_difference", n), &n, |b, _| {
            let op = HessianOperator::products(&model, &x);
            b.iter(|| op.apply(black_box(&v)))
        });
        group.bench_with_input(BenchmarkId::new("csr", n), &n, |b, _| {
            b.iter(|| sparse.mul_vec(black_box(&v)))
        });
        group.bench_with_input(BenchmarkId::new("dense", n), &n, |b, _| {
            b.iter(|| LinearOperator::apply(&dense, black_box(&v)))
        });
    }

    group.finish();
}

fn bench_line_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_search");
    let n = 100;
    let model = chain(n);
    let x = DVector::zeros(n);
    let (f0, g0) = model.objective_and_gradient(&x).unwrap();
    let d = -&g0;

    for kind in [LineSearchKind::Backtracking, LineSearchKind::Wolfe, LineSearchKind::StrongWolfe] {
        let ls = kind.build(kind.params::<f64>());
        group.bench_function(format!("{kind:?}"), |b| {
            b.iter(|| ls.search(&model, &x, f0, &g0, black_box(&d), 4.0))
        });
    }

    group.finish();
}

fn bench_lbfgs_two_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("lbfgs_history");
    let n = 500;

    for m in [3, 10, 20] {
        let mut history = LbfgsHistory::<f64>::new(m).unwrap();
        for k in 0..m {
            let s = DVector::from_fn(n, |i, _| ((i + k) as f64 * 0.7).sin());
            let y = &s * (1.0 + k as f64);
            history.try_push(s, y);
        }
        let g = DVector::from_fn(n, |i, _| (i as f64).cos());

        group.bench_with_input(BenchmarkId::new("apply_inverse", m), &m, |b, _| {
            b.iter(|| history.apply_inverse(black_box(&g)))
        });
        group.bench_with_input(BenchmarkId::new("apply", m), &m, |b, _| {
            b.iter(|| history.apply(black_box(&g)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_hessian_products, bench_line_search, bench_lbfgs_two_loop);
criterion_main!(benches);

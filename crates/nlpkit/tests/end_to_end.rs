//! End-to-end tests through the facade

use approx::assert_relative_eq;
use nlpkit::prelude::*;
use nlpkit_core::utils::test_problems::{Quadratic, Rosenbrock};
use pretty_assertions::assert_eq;
use simplelog::{Config, LevelFilter, TestLogger};

#[test]
fn test_every_kind_solves_rosenbrock_from_its_initial_point() {
    let _ = TestLogger::init(LevelFilter::Info, Config::default());
    let model = Rosenbrock::new(4);
    let options = SolverOptions::default().with_gradient_tolerance(1e-7);

    for kind in SolverKind::ALL {
        let record = nlpkit::solve(&model, kind, &options).unwrap();
        assert!(record.is_converged(), "{kind}: {record}");
        assert_relative_eq!(record.iterate.x, DVector::from_element(4, 1.0), epsilon = 1e-5);
        assert_eq!(record.model, "rosenbrock");
    }
}

#[test]
fn test_bounded_model_needs_tron() {
    let model = Quadratic::laplacian(4).with_bounds(DVector::zeros(4), DVector::from_element(4, 0.5));
    let options = SolverOptions::default();

    for kind in SolverKind::ALL {
        let result = nlpkit::solve(&model, kind, &options);
        if kind.supports_bounds() {
            let record = result.unwrap();
            assert!(record.is_converged());
            assert!(record.iterate.x.iter().all(|&xi| (0.0..=0.5).contains(&xi)));
        } else {
            assert!(matches!(result, Err(SolverError::InvalidConfiguration { .. })), "{kind}");
        }
    }
}

#[test]
fn test_maximization_through_scaling() {
    // max 5 - (x0 - 1)² - (x1 - 2)²
    let problem = Problem::new(
        2,
        |x: &DVector<f64>| Ok(5.0 - (x[0] - 1.0).powi(2) - (x[1] - 2.0).powi(2)),
        |x: &DVector<f64>| Ok(DVector::from_vec(vec![-2.0 * (x[0] - 1.0), -2.0 * (x[1] - 2.0)])),
    )
    .with_name("paraboloid");
    let model = ScaledModel::maximize(problem);

    let record = nlpkit::solve(&model, SolverKind::Trunk, &SolverOptions::default()).unwrap();

    assert!(record.is_converged());
    assert_relative_eq!(record.iterate.x, DVector::from_vec(vec![1.0, 2.0]), epsilon = 1e-6);
    assert_relative_eq!(model.unscale_objective(record.objective()), 5.0, epsilon = 1e-10);
}

#[test]
fn test_check_derivatives_before_solving() {
    let model = Rosenbrock::new(2);
    let x = DVector::from_vec(vec![-1.2, 1.0]);
    let checker = DerivativeChecker::<f64>::new();

    assert!(checker.check_gradient(&model, &x).passed());
    assert!(checker.check_hessian_vector(&model, &x, &DVector::from_vec(vec![0.3, -0.7])).passed());

    let record = nlpkit::solve(&model, SolverKind::Tron, &SolverOptions::default()).unwrap();
    assert!(record.is_converged());
}

#[test]
fn test_observer_through_facade() {
    let model = Rosenbrock::new(2);
    let mut history = HistoryObserver::new();
    let record = nlpkit::solve_with_observer(&model, SolverKind::Lbfgs, &SolverOptions::default(), &mut history)
        .unwrap();

    assert_eq!(history.iterations.len(), record.iterations);
    let last = history.iterations.last().unwrap();
    assert_eq!(last.objective, record.objective());
}

#[test]
fn test_summary_line() {
    let record = nlpkit::solve(&Rosenbrock::new(2), SolverKind::Tron, &SolverOptions::default()).unwrap();
    let line = record.summary_line();

    assert!(line.starts_with("rosenbrock"));
    assert!(line.contains(" opt "));
}

#[cfg(feature = "serde")]
#[test]
fn test_configuration_from_json() {
    let kind: SolverKind = serde_json::from_str("\"lbfgs\"").unwrap();
    assert_eq!(kind, SolverKind::Lbfgs);
    assert_eq!(serde_json::to_string(&SolverKind::Trunk).unwrap(), "\"trunk\"");

    let options: SolverOptions<f64> =
        serde_json::from_str(r#"{"max_iterations": 7, "gradient_tolerance": 1e-9}"#).unwrap();
    assert_eq!(options.max_iterations, 7);

    let record = nlpkit::solve(&Rosenbrock::new(2), kind, &options).unwrap();
    assert_eq!(record.status, TerminationStatus::IterationLimit);
}

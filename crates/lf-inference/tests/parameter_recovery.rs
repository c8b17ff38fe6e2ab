//! End-to-end recovery of the two-scenario pipeline on synthetic data.

use approx::assert_relative_eq;
use lf_inference::{
    Driver, DriverSeries, EstimatorConfig, Metric, OptimizerConfig, RateEstimator, Topology,
    build_histogram,
};

fn synthetic_tokens() -> Vec<&'static str> {
    vec!["0", "0", "1", "1", "1", "2", "2", "3"]
}

#[test]
fn histogram_shape_matches_the_synthetic_column() {
    let hist = build_histogram(synthetic_tokens(), -1).unwrap();

    // Observed max 3 < 10 and max_count < 10, so 11 buckets.
    assert_eq!(hist.nominal_max(), 11);
    assert_relative_eq!(hist.probabilities()[0], 0.25);
    assert_relative_eq!(hist.probabilities()[1], 0.375);
    assert_relative_eq!(hist.probabilities()[2], 0.25);
    assert_relative_eq!(hist.probabilities()[3], 0.125);
    assert!(hist.probabilities()[4..].iter().all(|&p| p == 0.0));
}

#[test]
fn two_scenario_fit_recovers_finite_rates() {
    let hist = build_histogram(synthetic_tokens(), -1).unwrap();
    let series = DriverSeries::from_rows(
        [("0", "0.05"), ("48", "0.2"), ("96", "0.1"), ("200", "0.1")],
        None,
    )
    .unwrap();

    let config = EstimatorConfig {
        dimensionality: Some(6),
        optimizer: OptimizerConfig { max_iter: 120, sd_tolerance: 1e-8 },
        ..EstimatorConfig::default()
    };
    let report = RateEstimator::new(config).fit(&hist, &series).unwrap();

    for scenario in [&report.reference, &report.forced] {
        assert!(scenario.distance.is_finite() && scenario.distance >= 0.0);
        assert!(scenario.rates.iter().all(|&r| r.is_finite() && r >= 0.0));
        assert_eq!(scenario.totals.len(), 6);
    }
    assert_eq!(report.hosts_sampled(), 8);
}

#[test]
fn fitted_distance_beats_the_initial_guess() {
    let hist = build_histogram(synthetic_tokens(), -1).unwrap();
    let series = DriverSeries::from_rows([("0", "0.1"), ("200", "0.1")], None).unwrap();

    let config = EstimatorConfig {
        dimensionality: Some(6),
        optimizer: OptimizerConfig { max_iter: 120, sd_tolerance: 1e-8 },
        ..EstimatorConfig::default()
    };

    // Score the initial guess by hand through the public objective.
    let initial = config.initial_rates.clone();
    let mut y0 = vec![0.0; 6];
    y0[0] = config.initial_population;
    let objective = lf_inference::DistanceObjective::new(
        Topology::FallOff,
        Driver::Constant(config.reference_density),
        config.volume,
        y0,
        0.0,
        config.horizon,
        hist.density().to_vec(),
        None,
        Metric::Wasserstein,
        config.ode.clone(),
    )
    .unwrap();
    let initial_distance = objective.evaluate(&initial);

    let report = RateEstimator::new(config).fit(&hist, &series).unwrap();
    assert!(
        report.reference.distance <= initial_distance + 1e-12,
        "optimizer must not do worse than its starting point: {} vs {initial_distance}",
        report.reference.distance
    );
}

#[test]
fn zero_split_metric_runs_end_to_end() {
    let hist = build_histogram(synthetic_tokens(), -1).unwrap();
    let series = DriverSeries::from_rows([("0", "0.1"), ("200", "0.1")], None).unwrap();

    let config = EstimatorConfig {
        dimensionality: Some(6),
        metric: Metric::ZeroSplit { weight: 0.5 },
        optimizer: OptimizerConfig { max_iter: 120, sd_tolerance: 1e-8 },
        ..EstimatorConfig::default()
    };
    let report = RateEstimator::new(config).fit(&hist, &series).unwrap();
    assert!(report.reference.distance.is_finite());
    assert!(report.forced.distance.is_finite());
}

//! Rate-constant estimation against measured count distributions.
//!
//! One invocation fits the model twice from the same initial guess: once
//! against a constant driver (the reference baseline) and once against
//! the measured driver series (the forced scenario). Both share the
//! measured density and dimensionality, so the two minimized distances
//! are directly comparable.

use lf_core::{Error, FitReport, Result, ScenarioFit};

use crate::driver::{Driver, DriverSeries};
use crate::histogram::{CountHistogram, downsample};
use crate::model::{CompartmentOde, Topology};
use crate::objective::{DistanceObjective, Metric};
use crate::ode::{OdeOptions, rk45};
use crate::optimizer::{NelderMeadOptimizer, OptimizerConfig};

/// Configuration of one estimation run.
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    /// Transition topology of the compartment chain.
    pub topology: Topology,
    /// Simulation horizon in hours.
    pub horizon: f64,
    /// Cage volume; multiplies the driver into an ambient parasite count.
    pub volume: f64,
    /// Constant driver value for the reference scenario.
    pub reference_density: f64,
    /// Initial host population, all seeded into compartment 0.
    pub initial_population: f64,
    /// Initial guess for the rate constants, in topology order.
    pub initial_rates: Vec<f64>,
    /// Number of compartments. Defaults to `2 * nominal_upper` of the
    /// measured histogram when `None`.
    pub dimensionality: Option<usize>,
    /// Coarsen both densities to `n + 1` buckets before comparison.
    pub downsample_to: Option<usize>,
    /// Discrepancy metric.
    pub metric: Metric,
    /// Minimizer configuration.
    pub optimizer: OptimizerConfig,
    /// Integrator tolerances.
    pub ode: OdeOptions,
}

impl EstimatorConfig {
    /// Defaults for the given topology (the historical initial guesses).
    pub fn for_topology(topology: Topology) -> Self {
        let initial_rates = match topology {
            Topology::FallOff => vec![0.02, 0.02, 0.01],
            Topology::Accumulation => vec![0.02, 1.0],
        };
        Self {
            topology,
            horizon: 168.0,
            volume: 10.0,
            reference_density: 0.1,
            initial_population: 100.0,
            initial_rates,
            dimensionality: None,
            downsample_to: None,
            metric: Metric::Wasserstein,
            optimizer: OptimizerConfig::default(),
            ode: OdeOptions::default(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.initial_rates.len() != self.topology.n_rates() {
            return Err(Error::Validation(format!(
                "estimator: {:?} needs {} initial rates ({}), got {}",
                self.topology,
                self.topology.n_rates(),
                self.topology.rate_names().join(", "),
                self.initial_rates.len()
            )));
        }
        if self.initial_rates.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(Error::Validation(
                "estimator: initial rates must be finite and non-negative".into(),
            ));
        }
        if !self.horizon.is_finite() || self.horizon < 0.0 {
            return Err(Error::Validation("estimator: horizon must be finite and >= 0".into()));
        }
        if !self.volume.is_finite() || self.volume <= 0.0 {
            return Err(Error::Validation("estimator: volume must be finite and > 0".into()));
        }
        if !self.initial_population.is_finite() || self.initial_population <= 0.0 {
            return Err(Error::Validation("estimator: initial population must be > 0".into()));
        }
        if self.dimensionality == Some(0) {
            return Err(Error::Validation("estimator: dimensionality must be >= 1".into()));
        }
        Ok(())
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self::for_topology(Topology::FallOff)
    }
}

/// Two-scenario rate estimator.
pub struct RateEstimator {
    config: EstimatorConfig,
}

impl RateEstimator {
    /// Create an estimator with the given configuration.
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    /// Fit both scenarios against the measured histogram.
    ///
    /// All configuration is validated here, before any optimization
    /// begins. Optimizer non-convergence is not an error; the scenario
    /// carries `converged: false` and the best point found.
    pub fn fit(&self, histogram: &CountHistogram, series: &DriverSeries) -> Result<FitReport> {
        self.config.validate()?;

        let dimensionality =
            self.config.dimensionality.unwrap_or_else(|| 2 * histogram.nominal_upper());
        if dimensionality < 1 {
            return Err(Error::Validation("estimator: derived dimensionality is 0".into()));
        }

        let mut measured = histogram.density().to_vec();
        if let Some(n) = self.config.downsample_to {
            measured = downsample(&measured, n)?;
        }

        let mut y0 = vec![0.0; dimensionality];
        y0[0] = self.config.initial_population;

        let reference = self.fit_scenario(
            Driver::Constant(self.config.reference_density),
            &measured,
            &y0,
        )?;
        let forced = self.fit_scenario(Driver::Series(series), &measured, &y0)?;

        Ok(FitReport {
            observed_counts: histogram.frequencies().to_vec(),
            observed_probabilities: histogram.probabilities().to_vec(),
            reference,
            forced,
        })
    }

    fn fit_scenario(
        &self,
        driver: Driver<'_>,
        measured: &[f64],
        y0: &[f64],
    ) -> Result<ScenarioFit> {
        let objective = DistanceObjective::new(
            self.config.topology,
            driver,
            self.config.volume,
            y0.to_vec(),
            0.0,
            self.config.horizon,
            measured.to_vec(),
            self.config.downsample_to,
            self.config.metric,
            self.config.ode.clone(),
        )?;

        let optimizer = NelderMeadOptimizer::new(self.config.optimizer.clone());
        let result = optimizer.minimize(&objective, &self.config.initial_rates)?;

        let totals = self.final_trajectory(driver, &result.parameters, y0);

        Ok(ScenarioFit {
            rates: result.parameters,
            rate_names: self.config.topology.rate_names().iter().map(|s| s.to_string()).collect(),
            distance: result.fval,
            converged: result.converged,
            n_evaluations: result.n_fev,
            totals,
        })
    }

    /// Integrate once more at the best-found rates and normalize back to
    /// a per-compartment fraction of the initial population. A failed
    /// final integration yields an all-zero trajectory rather than
    /// aborting the report.
    fn final_trajectory(&self, driver: Driver<'_>, rates: &[f64], y0: &[f64]) -> Vec<f64> {
        let sys = match CompartmentOde::new(
            self.config.topology,
            rates,
            driver,
            self.config.volume,
            y0.len(),
        ) {
            Ok(sys) => sys,
            Err(_) => return vec![0.0; y0.len()],
        };
        match rk45(&sys, y0, 0.0, self.config.horizon, &self.config.ode) {
            Ok(y) => {
                y.iter().map(|&c| c.max(0.0) / self.config.initial_population).collect()
            }
            Err(_) => vec![0.0; y0.len()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::histogram::build_histogram;

    fn synthetic_histogram() -> CountHistogram {
        build_histogram(["0", "0", "1", "1", "1", "2", "2", "3"], -1).unwrap()
    }

    fn flat_series() -> DriverSeries {
        DriverSeries::from_rows([("0", "0.1"), ("200", "0.1")], None).unwrap()
    }

    fn quick_config() -> EstimatorConfig {
        EstimatorConfig {
            dimensionality: Some(6),
            optimizer: OptimizerConfig { max_iter: 60, sd_tolerance: 1e-8 },
            ..EstimatorConfig::default()
        }
    }

    #[test]
    fn fit_produces_finite_non_negative_rates() {
        let estimator = RateEstimator::new(quick_config());
        let report = estimator.fit(&synthetic_histogram(), &flat_series()).unwrap();

        for scenario in [&report.reference, &report.forced] {
            assert!(scenario.distance.is_finite());
            assert_eq!(scenario.rates.len(), 3);
            assert!(scenario.rates.iter().all(|&r| r >= 0.0 && r.is_finite()));
            assert_eq!(scenario.totals.len(), 6);
            assert!(scenario.n_evaluations > 0);
        }
        assert_eq!(report.observed_counts.len(), 11);
        assert_relative_eq!(report.observed_probabilities[1], 0.375);
    }

    #[test]
    fn reference_scenario_is_deterministic() {
        let hist = synthetic_histogram();
        let series = flat_series();
        let a = RateEstimator::new(quick_config()).fit(&hist, &series).unwrap();
        let b = RateEstimator::new(quick_config()).fit(&hist, &series).unwrap();
        assert_relative_eq!(a.reference.distance, b.reference.distance, epsilon = 1e-12);
        for (x, y) in a.reference.rates.iter().zip(&b.reference.rates) {
            assert_relative_eq!(x, y, epsilon = 1e-12);
        }
    }

    #[test]
    fn totals_are_population_fractions() {
        let estimator = RateEstimator::new(quick_config());
        let report = estimator.fit(&synthetic_histogram(), &flat_series()).unwrap();
        let total: f64 = report.reference.totals.iter().sum();
        assert!(total > 0.0 && total <= 1.0 + 1e-6, "total fraction {total}");
    }

    #[test]
    fn accumulation_topology_fits_two_rates() {
        let config = EstimatorConfig {
            dimensionality: Some(6),
            optimizer: OptimizerConfig { max_iter: 60, sd_tolerance: 1e-8 },
            ..EstimatorConfig::for_topology(Topology::Accumulation)
        };
        let report =
            RateEstimator::new(config).fit(&synthetic_histogram(), &flat_series()).unwrap();
        assert_eq!(report.reference.rates.len(), 2);
        assert_eq!(report.reference.rate_names, vec!["k_inf", "acc"]);
    }

    #[test]
    fn wrong_rate_arity_fails_before_fitting() {
        let config = EstimatorConfig {
            initial_rates: vec![0.02, 0.02],
            ..EstimatorConfig::default()
        };
        assert!(RateEstimator::new(config)
            .fit(&synthetic_histogram(), &flat_series())
            .is_err());
    }

    #[test]
    fn bad_weight_fails_before_fitting() {
        let config = EstimatorConfig {
            dimensionality: Some(6),
            metric: Metric::ZeroSplit { weight: 2.0 },
            ..EstimatorConfig::default()
        };
        assert!(RateEstimator::new(config)
            .fit(&synthetic_histogram(), &flat_series())
            .is_err());
    }
}

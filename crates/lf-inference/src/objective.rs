//! Distribution-distance objective bridging measured and simulated
//! count distributions.
//!
//! Each evaluation: reject negative rate proposals outright, integrate
//! the compartment model to the horizon, convert the final state to a
//! density, and score it against the measured density. Numerical
//! infeasibility (failed integration, zero simulated mass) maps to an
//! infinite distance so the optimizer keeps searching; it never errors
//! out of the search loop.

use std::sync::atomic::{AtomicUsize, Ordering};

use lf_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::driver::Driver;
use crate::histogram::downsample;
use crate::model::{CompartmentOde, Topology};
use crate::ode::{OdeOptions, rk45};
use crate::optimizer::ObjectiveFunction;
use crate::wasserstein::wasserstein_indexed;

/// Discrepancy metric between measured and simulated densities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Single Earth-Mover distance over the full bucket range.
    Wasserstein,
    /// Weighted split: `weight` times a two-point distance on the
    /// zero-vs-nonzero mass, plus `1 - weight` times the distance between
    /// the renormalized nonzero tails. A zero-mass tail contributes zero
    /// rather than dividing by zero.
    ZeroSplit {
        /// Blend weight in `[0, 1]` for the zero-bucket component.
        weight: f64,
    },
}

/// Objective function over rate-constant vectors.
pub struct DistanceObjective<'a> {
    topology: Topology,
    driver: Driver<'a>,
    volume: f64,
    y0: Vec<f64>,
    t0: f64,
    t1: f64,
    measured: Vec<f64>,
    dimensionality: usize,
    downsample_to: Option<usize>,
    metric: Metric,
    ode_options: OdeOptions,
    n_integrations: AtomicUsize,
}

impl<'a> DistanceObjective<'a> {
    /// Build the objective, validating the whole configuration eagerly so
    /// nothing fails mid-optimization.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        topology: Topology,
        driver: Driver<'a>,
        volume: f64,
        y0: Vec<f64>,
        t0: f64,
        t1: f64,
        measured: Vec<f64>,
        downsample_to: Option<usize>,
        metric: Metric,
        ode_options: OdeOptions,
    ) -> Result<Self> {
        let dimensionality = y0.len();
        if dimensionality < 1 {
            return Err(Error::Validation("objective: dimensionality must be >= 1".into()));
        }
        if measured.is_empty() {
            return Err(Error::Validation("objective: measured density is empty".into()));
        }
        if measured.iter().any(|&p| !p.is_finite() || p < 0.0) {
            return Err(Error::Validation(
                "objective: measured density must be finite and non-negative".into(),
            ));
        }
        if !t0.is_finite() || !t1.is_finite() || t1 < t0 {
            return Err(Error::Validation("objective: requires finite t1 >= t0".into()));
        }
        if let Metric::ZeroSplit { weight } = metric {
            if !(0.0..=1.0).contains(&weight) {
                return Err(Error::Validation(format!(
                    "objective: zero-mass blend weight {weight} outside [0, 1]"
                )));
            }
        }
        if let Some(n) = downsample_to {
            if n == 0 || n > dimensionality - 1 {
                return Err(Error::Validation(format!(
                    "objective: downsample factor {n} exceeds the {} simulated buckets",
                    dimensionality - 1
                )));
            }
        }

        Ok(Self {
            topology,
            driver,
            volume,
            y0,
            t0,
            t1,
            measured,
            dimensionality,
            downsample_to,
            metric,
            ode_options,
            n_integrations: AtomicUsize::new(0),
        })
    }

    /// Number of integrations performed so far. Rejected proposals do not
    /// integrate, so this also counts feasible evaluations.
    pub fn integrations(&self) -> usize {
        self.n_integrations.load(Ordering::Relaxed)
    }

    /// Score one rate proposal. Infeasible or numerically failed
    /// proposals score `f64::INFINITY`.
    pub fn evaluate(&self, params: &[f64]) -> f64 {
        if params.iter().any(|&p| p < 0.0 || !p.is_finite()) {
            return f64::INFINITY;
        }

        let Ok(sys) =
            CompartmentOde::new(self.topology, params, self.driver, self.volume, self.dimensionality)
        else {
            return f64::INFINITY;
        };

        self.n_integrations.fetch_add(1, Ordering::Relaxed);
        let Ok(y) = rk45(&sys, &self.y0, self.t0, self.t1, &self.ode_options) else {
            return f64::INFINITY;
        };

        // Clamp integration artifacts before normalizing.
        let mut simulated: Vec<f64> = y.iter().map(|&c| c.max(0.0)).collect();
        let total: f64 = simulated.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return f64::INFINITY;
        }
        for c in &mut simulated {
            *c /= total;
        }

        if let Some(n) = self.downsample_to {
            match downsample(&simulated, n) {
                Ok(coarse) => simulated = coarse,
                Err(_) => return f64::INFINITY,
            }
        }

        match self.metric {
            Metric::Wasserstein => {
                wasserstein_indexed(&self.measured, &simulated).unwrap_or(f64::INFINITY)
            }
            Metric::ZeroSplit { weight } => self.zero_split(&simulated, weight),
        }
    }

    fn zero_split(&self, simulated: &[f64], weight: f64) -> f64 {
        let p0 = self.measured[0].min(1.0);
        let q0 = simulated[0].min(1.0);
        let zero_part = wasserstein_indexed(&[p0, 1.0 - p0], &[q0, 1.0 - q0])
            .unwrap_or(f64::INFINITY);

        let measured_tail = &self.measured[1..];
        let simulated_tail = &simulated[1..];
        let tail_part = if measured_tail.iter().sum::<f64>() <= 0.0
            || simulated_tail.iter().sum::<f64>() <= 0.0
        {
            // All mass sits in the zero bucket on one side; the tail
            // comparison is undefined and contributes nothing.
            0.0
        } else {
            wasserstein_indexed(measured_tail, simulated_tail).unwrap_or(f64::INFINITY)
        };

        weight * zero_part + (1.0 - weight) * tail_part
    }
}

impl ObjectiveFunction for DistanceObjective<'_> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        Ok(self.evaluate(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objective(metric: Metric) -> DistanceObjective<'static> {
        let mut y0 = vec![0.0; 6];
        y0[0] = 100.0;
        let measured = vec![0.25, 0.375, 0.25, 0.125, 0.0, 0.0];
        DistanceObjective::new(
            Topology::FallOff,
            Driver::Constant(0.1),
            10.0,
            y0,
            0.0,
            168.0,
            measured,
            None,
            metric,
            OdeOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn negative_proposal_scores_infinity_without_integrating() {
        let obj = objective(Metric::Wasserstein);
        assert_eq!(obj.evaluate(&[0.02, -0.01, 0.01]), f64::INFINITY);
        assert_eq!(obj.evaluate(&[-1.0, 0.02, 0.01]), f64::INFINITY);
        assert_eq!(obj.integrations(), 0);
    }

    #[test]
    fn non_finite_proposal_scores_infinity() {
        let obj = objective(Metric::Wasserstein);
        assert_eq!(obj.evaluate(&[f64::NAN, 0.02, 0.01]), f64::INFINITY);
        assert_eq!(obj.integrations(), 0);
    }

    #[test]
    fn feasible_proposal_scores_finite_and_integrates() {
        let obj = objective(Metric::Wasserstein);
        let d = obj.evaluate(&[0.02, 0.02, 0.01]);
        assert!(d.is_finite() && d >= 0.0, "distance {d}");
        assert_eq!(obj.integrations(), 1);
    }

    #[test]
    fn zero_split_weight_is_validated_eagerly() {
        let mut y0 = vec![0.0; 4];
        y0[0] = 100.0;
        let err = DistanceObjective::new(
            Topology::FallOff,
            Driver::Constant(0.1),
            10.0,
            y0,
            0.0,
            168.0,
            vec![0.5, 0.5],
            None,
            Metric::ZeroSplit { weight: 1.5 },
            OdeOptions::default(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn zero_split_scores_finite() {
        let obj = objective(Metric::ZeroSplit { weight: 0.5 });
        let d = obj.evaluate(&[0.02, 0.02, 0.01]);
        assert!(d.is_finite() && d >= 0.0, "distance {d}");
    }

    #[test]
    fn zero_sum_tail_contributes_nothing() {
        // Measured mass entirely in the zero bucket.
        let mut y0 = vec![0.0; 4];
        y0[0] = 100.0;
        let obj = DistanceObjective::new(
            Topology::FallOff,
            Driver::Constant(0.1),
            10.0,
            y0,
            0.0,
            10.0,
            vec![1.0, 0.0, 0.0, 0.0],
            None,
            Metric::ZeroSplit { weight: 0.3 },
            OdeOptions::default(),
        )
        .unwrap();
        let d = obj.evaluate(&[0.02, 0.02, 0.01]);
        assert!(d.is_finite(), "zero-sum tail must not divide by zero: {d}");
    }

    #[test]
    fn oversized_downsample_is_rejected_eagerly() {
        let mut y0 = vec![0.0; 4];
        y0[0] = 100.0;
        let err = DistanceObjective::new(
            Topology::FallOff,
            Driver::Constant(0.1),
            10.0,
            y0,
            0.0,
            168.0,
            vec![0.5, 0.5],
            Some(5),
            Metric::Wasserstein,
            OdeOptions::default(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn downsampled_simulation_is_compared_coarsely() {
        let mut y0 = vec![0.0; 7];
        y0[0] = 100.0;
        let obj = DistanceObjective::new(
            Topology::Accumulation,
            Driver::Constant(0.1),
            10.0,
            y0,
            0.0,
            168.0,
            vec![0.4, 0.3, 0.2, 0.1],
            Some(3),
            Metric::Wasserstein,
            OdeOptions::default(),
        )
        .unwrap();
        let d = obj.evaluate(&[0.02, 1.0]);
        assert!(d.is_finite() && d >= 0.0);
    }
}

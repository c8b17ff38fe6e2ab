//! Common data types for licefit

use serde::{Deserialize, Serialize};

/// Fit result for a single driver scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioFit {
    /// Best-fit rate constants, in the order given by `rate_names`.
    pub rates: Vec<f64>,

    /// Names of the rate constants (topology-dependent).
    pub rate_names: Vec<String>,

    /// Minimized distribution distance.
    pub distance: f64,

    /// Convergence status. `false` means the iteration guard was hit and
    /// the best point found is reported.
    pub converged: bool,

    /// Number of objective evaluations
    pub n_evaluations: usize,

    /// Final compartment populations as a fraction of the initial
    /// population, indexed by compartment (parasite count).
    pub totals: Vec<f64>,
}

impl ScenarioFit {
    /// Rate value by name, if the topology carries it.
    pub fn rate(&self, name: &str) -> Option<f64> {
        self.rate_names.iter().position(|n| n == name).map(|i| self.rates[i])
    }
}

/// Full two-scenario fit report: observed distribution, reference fit
/// (constant driver), forced fit (measured driver).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitReport {
    /// Observed raw frequency per count bucket.
    pub observed_counts: Vec<u64>,

    /// Observed probability per count bucket.
    pub observed_probabilities: Vec<f64>,

    /// Fit against the constant driver.
    pub reference: ScenarioFit,

    /// Fit against the measured driver.
    pub forced: ScenarioFit,
}

impl FitReport {
    /// Number of hosts sampled.
    pub fn hosts_sampled(&self) -> u64 {
        self.observed_counts.iter().sum()
    }
}

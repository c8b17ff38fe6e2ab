//! Compartment ODE model of parasite accumulation.
//!
//! Hosts live in discrete compartments indexed by parasite burden;
//! compartment 0 is burden-free and the last index is the maximal-burden
//! compartment. Every compartment-to-compartment flow is scaled by
//! `driver(t) * volume`, the instantaneous number of ambient parasites,
//! so the system is linear in the state but time-dependent through the
//! driver.
//!
//! Two incompatible transition topologies exist and are kept as an
//! explicit configuration choice rather than merged.

use lf_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::driver::Driver;
use crate::ode::OdeSystem;

/// Transition topology of the accumulation chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// Birth–death chain with detachment: infection rate `k_inf` out of
    /// compartment 0, flat accumulation rate `k_acc` up the chain, and a
    /// fall process returning burden `n` hosts downward at `n * k_fall`.
    FallOff,
    /// Pure accumulation chain: outflow `k_inf` from compartment 0 and
    /// `n * k_inf * acc` from compartment `n >= 1`; the terminal
    /// compartment is absorbing.
    Accumulation,
}

impl Topology {
    /// Names of the rate constants, in parameter-vector order.
    pub fn rate_names(&self) -> &'static [&'static str] {
        match self {
            Topology::FallOff => &["k_inf", "k_acc", "k_fall"],
            Topology::Accumulation => &["k_inf", "acc"],
        }
    }

    /// Number of rate constants the topology requires.
    pub fn n_rates(&self) -> usize {
        self.rate_names().len()
    }
}

/// The accumulation chain as an [`OdeSystem`].
///
/// Per-compartment transition rates are precomputed at construction; the
/// per-call work in [`OdeSystem::rhs`] is one driver query plus the flow
/// loop. The driver is re-queried on every RHS evaluation, never cached
/// across calls.
pub struct CompartmentOde<'a> {
    driver: Driver<'a>,
    volume: f64,
    /// Upward (accumulation) rate out of compartment `n` into `n + 1`.
    /// The terminal entry is zero: mass never leaves the last index
    /// upward.
    up: Vec<f64>,
    /// Downward (fall) rate out of compartment `n` into `n - 1`. All
    /// zeros for [`Topology::Accumulation`].
    down: Vec<f64>,
}

impl<'a> CompartmentOde<'a> {
    /// Build the model for the given topology and rate vector.
    ///
    /// `rates` must carry exactly [`Topology::n_rates`] finite entries;
    /// `dimensionality >= 1` is required before any closure over the
    /// rates is built.
    pub fn new(
        topology: Topology,
        rates: &[f64],
        driver: Driver<'a>,
        volume: f64,
        dimensionality: usize,
    ) -> Result<Self> {
        if dimensionality < 1 {
            return Err(Error::Validation("model: dimensionality must be >= 1".into()));
        }
        if rates.len() != topology.n_rates() {
            return Err(Error::Validation(format!(
                "model: {:?} needs {} rates ({}), got {}",
                topology,
                topology.n_rates(),
                topology.rate_names().join(", "),
                rates.len()
            )));
        }
        if rates.iter().any(|r| !r.is_finite()) {
            return Err(Error::Validation("model: rate constants must be finite".into()));
        }
        if !volume.is_finite() || volume <= 0.0 {
            return Err(Error::Validation("model: volume must be finite and > 0".into()));
        }

        let d = dimensionality;
        let mut up = vec![0.0; d];
        let mut down = vec![0.0; d];
        match topology {
            Topology::FallOff => {
                let (k_inf, k_acc, k_fall) = (rates[0], rates[1], rates[2]);
                for n in 0..d.saturating_sub(1) {
                    up[n] = if n == 0 { k_inf } else { k_acc };
                }
                for (n, slot) in down.iter_mut().enumerate().skip(1) {
                    *slot = n as f64 * k_fall;
                }
            }
            Topology::Accumulation => {
                let (k_inf, acc) = (rates[0], rates[1]);
                for n in 0..d.saturating_sub(1) {
                    up[n] = if n == 0 { k_inf } else { n as f64 * k_inf * acc };
                }
            }
        }

        Ok(Self { driver, volume, up, down })
    }
}

impl OdeSystem for CompartmentOde<'_> {
    fn ndim(&self) -> usize {
        self.up.len()
    }

    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]) {
        let c = self.driver.value_at(t) * self.volume;
        dydt.fill(0.0);
        let d = self.up.len();
        for n in 0..d.saturating_sub(1) {
            let flow = self.up[n] * y[n] * c;
            dydt[n] -= flow;
            dydt[n + 1] += flow;
        }
        for n in 1..d {
            let flow = self.down[n] * y[n] * c;
            dydt[n] -= flow;
            dydt[n - 1] += flow;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::ode::{OdeOptions, rk45};

    fn rhs_at(sys: &CompartmentOde<'_>, t: f64, y: &[f64]) -> Vec<f64> {
        let mut dydt = vec![0.0; y.len()];
        sys.rhs(t, y, &mut dydt);
        dydt
    }

    #[test]
    fn fall_off_chain_conserves_population() {
        let sys = CompartmentOde::new(
            Topology::FallOff,
            &[0.02, 0.03, 0.01],
            Driver::Constant(0.1),
            10.0,
            6,
        )
        .unwrap();
        let y = [10.0, 5.0, 3.0, 2.0, 1.0, 0.5];
        let dydt = rhs_at(&sys, 0.0, &y);
        assert_relative_eq!(dydt.iter().sum::<f64>(), 0.0, epsilon = 1e-14);
    }

    #[test]
    fn accumulation_chain_conserves_population() {
        let sys = CompartmentOde::new(
            Topology::Accumulation,
            &[0.02, 1.5],
            Driver::Constant(0.1),
            10.0,
            5,
        )
        .unwrap();
        let y = [4.0, 3.0, 2.0, 1.0, 0.5];
        let dydt = rhs_at(&sys, 0.0, &y);
        assert_relative_eq!(dydt.iter().sum::<f64>(), 0.0, epsilon = 1e-14);
    }

    #[test]
    fn accumulation_terminal_compartment_is_absorbing() {
        let sys = CompartmentOde::new(
            Topology::Accumulation,
            &[0.05, 1.0],
            Driver::Constant(0.2),
            10.0,
            4,
        )
        .unwrap();
        // All mass in the last compartment: nothing moves.
        let dydt = rhs_at(&sys, 0.0, &[0.0, 0.0, 0.0, 7.0]);
        assert!(dydt.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn flows_scale_with_driver_and_volume() {
        let lo = CompartmentOde::new(
            Topology::FallOff,
            &[0.02, 0.03, 0.01],
            Driver::Constant(0.1),
            10.0,
            4,
        )
        .unwrap();
        let hi = CompartmentOde::new(
            Topology::FallOff,
            &[0.02, 0.03, 0.01],
            Driver::Constant(0.2),
            10.0,
            4,
        )
        .unwrap();
        let y = [5.0, 2.0, 1.0, 0.5];
        let d_lo = rhs_at(&lo, 0.0, &y);
        let d_hi = rhs_at(&hi, 0.0, &y);
        for (a, b) in d_lo.iter().zip(&d_hi) {
            assert_relative_eq!(2.0 * a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn rhs_does_not_mutate_state() {
        let sys = CompartmentOde::new(
            Topology::Accumulation,
            &[0.02, 1.0],
            Driver::Constant(0.1),
            10.0,
            3,
        )
        .unwrap();
        let y = [1.0, 2.0, 3.0];
        let _ = rhs_at(&sys, 0.0, &y);
        assert_eq!(y, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn zero_dimensionality_is_rejected() {
        let err =
            CompartmentOde::new(Topology::FallOff, &[0.1, 0.1, 0.1], Driver::Constant(0.1), 10.0, 0);
        assert!(err.is_err());
    }

    #[test]
    fn rate_arity_is_checked_per_topology() {
        assert!(
            CompartmentOde::new(Topology::FallOff, &[0.1, 0.1], Driver::Constant(0.1), 10.0, 4)
                .is_err()
        );
        assert!(CompartmentOde::new(
            Topology::Accumulation,
            &[0.1, 0.1, 0.1],
            Driver::Constant(0.1),
            10.0,
            4
        )
        .is_err());
    }

    #[test]
    fn population_stays_conserved_through_integration() {
        let sys = CompartmentOde::new(
            Topology::FallOff,
            &[0.02, 0.02, 0.01],
            Driver::Constant(0.1),
            10.0,
            8,
        )
        .unwrap();
        let mut y0 = vec![0.0; 8];
        y0[0] = 100.0;
        let y = rk45(&sys, &y0, 0.0, 168.0, &OdeOptions::default()).unwrap();
        assert_relative_eq!(y.iter().sum::<f64>(), 100.0, epsilon = 1e-3);
        assert!(y[0] < 100.0, "mass should have moved up the chain");
    }
}

//! Adaptive ODE integration for the compartment model.
//!
//! Single solver: Dormand–Prince 4(5) explicit pair with PI step-size
//! control, suitable for the mildly stiff birth–death chains produced by
//! both model topologies. Only the state at the horizon is returned;
//! intermediate steps are not retained.
//!
//! Tolerances are configuration ([`OdeOptions`]) because they directly
//! affect fit reproducibility; the defaults (rtol 1e-6, atol 1e-9) are
//! the values every committed fit was produced with.

use lf_core::{Error, Result};

/// Right-hand side of an ODE system `dy/dt = f(t, y)`.
pub trait OdeSystem {
    /// Number of state variables.
    fn ndim(&self) -> usize;

    /// Evaluate `f(t, y)` and write into `dydt`.
    ///
    /// `y` and `dydt` have length `ndim()`. Implementations must not
    /// mutate `y`.
    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]);
}

/// Configuration for the adaptive solver.
#[derive(Debug, Clone)]
pub struct OdeOptions {
    /// Relative tolerance (default: 1e-6).
    pub rtol: f64,
    /// Absolute tolerance (default: 1e-9).
    pub atol: f64,
    /// Initial step size (default: 0.0 = automatic).
    pub h0: f64,
    /// Minimum step size (default: 1e-14).
    pub h_min: f64,
    /// Maximum number of steps (default: 100_000).
    pub max_steps: usize,
}

impl Default for OdeOptions {
    fn default() -> Self {
        Self { rtol: 1e-6, atol: 1e-9, h0: 0.0, h_min: 1e-14, max_steps: 100_000 }
    }
}

impl OdeOptions {
    fn validate(&self) -> Result<()> {
        if !self.rtol.is_finite() || self.rtol <= 0.0 {
            return Err(Error::Validation("rtol must be finite and > 0".into()));
        }
        if !self.atol.is_finite() || self.atol <= 0.0 {
            return Err(Error::Validation("atol must be finite and > 0".into()));
        }
        if self.max_steps == 0 {
            return Err(Error::Validation("max_steps must be > 0".into()));
        }
        Ok(())
    }

    fn initial_step(&self, span: f64) -> f64 {
        if self.h0 > 0.0 {
            self.h0.min(span)
        } else {
            (span * 1e-3).max(self.h_min).min(span)
        }
    }
}

/// Integrate `sys` from `y0` at `t0` to `t1` with the Dormand–Prince
/// RK4(5) method, returning the state at `t1`.
///
/// # Errors
///
/// Dimension mismatches, invalid tolerances, non-finite bounds, and
/// exhausting `max_steps` before reaching `t1` are all `Err`; the
/// objective maps the last of these to an infinite distance so the
/// optimizer keeps searching.
pub fn rk45<S: OdeSystem>(sys: &S, y0: &[f64], t0: f64, t1: f64, opts: &OdeOptions) -> Result<Vec<f64>> {
    opts.validate()?;
    let n = sys.ndim();
    if y0.len() != n {
        return Err(Error::Validation(format!("rk45: y0.len()={} != ndim()={n}", y0.len())));
    }
    if !t0.is_finite() || !t1.is_finite() {
        return Err(Error::Validation("rk45: t0/t1 must be finite".into()));
    }
    if t1 < t0 {
        return Err(Error::Validation("rk45: requires t1 >= t0".into()));
    }
    if y0.iter().any(|v| !v.is_finite()) {
        return Err(Error::Validation("rk45: y0 must be finite".into()));
    }

    let span = t1 - t0;
    if span == 0.0 {
        return Ok(y0.to_vec());
    }

    // Dormand–Prince coefficients
    const A21: f64 = 1.0 / 5.0;
    const A31: f64 = 3.0 / 40.0;
    const A32: f64 = 9.0 / 40.0;
    const A41: f64 = 44.0 / 45.0;
    const A42: f64 = -56.0 / 15.0;
    const A43: f64 = 32.0 / 9.0;
    const A51: f64 = 19372.0 / 6561.0;
    const A52: f64 = -25360.0 / 2187.0;
    const A53: f64 = 64448.0 / 6561.0;
    const A54: f64 = -212.0 / 729.0;
    const A61: f64 = 9017.0 / 3168.0;
    const A62: f64 = -355.0 / 33.0;
    const A63: f64 = 46732.0 / 5247.0;
    const A64: f64 = 49.0 / 176.0;
    const A65: f64 = -5103.0 / 18656.0;

    // 4th-order weights
    const B1: f64 = 5179.0 / 57600.0;
    const B3: f64 = 7571.0 / 16695.0;
    const B4: f64 = 393.0 / 640.0;
    const B5: f64 = -92097.0 / 339200.0;
    const B6: f64 = 187.0 / 2100.0;
    const B7: f64 = 1.0 / 40.0;

    // 5th-order weights (advancing solution, local extrapolation)
    const BH1: f64 = 35.0 / 384.0;
    const BH3: f64 = 500.0 / 1113.0;
    const BH4: f64 = 125.0 / 192.0;
    const BH5: f64 = -2187.0 / 6784.0;
    const BH6: f64 = 11.0 / 84.0;

    // Error = y5 - y4
    const E1: f64 = BH1 - B1;
    const E3: f64 = BH3 - B3;
    const E4: f64 = BH4 - B4;
    const E5: f64 = BH5 - B5;
    const E6: f64 = BH6 - B6;
    const E7: f64 = -B7;

    let mut t = t0;
    let mut y = y0.to_vec();
    let mut h = opts.initial_step(span);

    let mut k1 = vec![0.0; n];
    let mut k2 = vec![0.0; n];
    let mut k3 = vec![0.0; n];
    let mut k4 = vec![0.0; n];
    let mut k5 = vec![0.0; n];
    let mut k6 = vec![0.0; n];
    let mut k7 = vec![0.0; n];
    let mut y_tmp = vec![0.0; n];
    let mut y_new = vec![0.0; n];

    sys.rhs(t, &y, &mut k1);

    for _step in 0..opts.max_steps {
        if t >= t1 {
            break;
        }
        h = h.min(t1 - t).max(opts.h_min);

        for i in 0..n {
            y_tmp[i] = y[i] + h * A21 * k1[i];
        }
        sys.rhs(t + h / 5.0, &y_tmp, &mut k2);

        for i in 0..n {
            y_tmp[i] = y[i] + h * (A31 * k1[i] + A32 * k2[i]);
        }
        sys.rhs(t + 3.0 * h / 10.0, &y_tmp, &mut k3);

        for i in 0..n {
            y_tmp[i] = y[i] + h * (A41 * k1[i] + A42 * k2[i] + A43 * k3[i]);
        }
        sys.rhs(t + 4.0 * h / 5.0, &y_tmp, &mut k4);

        for i in 0..n {
            y_tmp[i] = y[i] + h * (A51 * k1[i] + A52 * k2[i] + A53 * k3[i] + A54 * k4[i]);
        }
        sys.rhs(t + 8.0 * h / 9.0, &y_tmp, &mut k5);

        for i in 0..n {
            y_tmp[i] =
                y[i] + h * (A61 * k1[i] + A62 * k2[i] + A63 * k3[i] + A64 * k4[i] + A65 * k5[i]);
        }
        sys.rhs(t + h, &y_tmp, &mut k6);

        for i in 0..n {
            y_new[i] =
                y[i] + h * (BH1 * k1[i] + BH3 * k3[i] + BH4 * k4[i] + BH5 * k5[i] + BH6 * k6[i]);
        }

        // FSAL stage
        sys.rhs(t + h, &y_new, &mut k7);

        let mut err_norm = 0.0;
        for i in 0..n {
            let ei =
                h * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i] + E7 * k7[i]);
            let sc = opts.atol + opts.rtol * y[i].abs().max(y_new[i].abs());
            err_norm += (ei / sc) * (ei / sc);
        }
        err_norm = (err_norm / n as f64).sqrt();

        if err_norm <= 1.0 {
            t += h;
            y.copy_from_slice(&y_new);
            k1.copy_from_slice(&k7);

            if t >= t1 {
                break;
            }
        }

        let factor =
            if err_norm == 0.0 { 5.0 } else { (0.9 * err_norm.powf(-0.2)).min(5.0).max(0.2) };
        h = (h * factor).max(opts.h_min);
    }

    if t < t1 - opts.h_min {
        return Err(Error::Computation(format!(
            "rk45: exceeded max_steps={} at t={t:.6e} before reaching t1={t1:.6e}",
            opts.max_steps
        )));
    }

    Ok(y)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ExpDecay {
        k: f64,
    }

    impl OdeSystem for ExpDecay {
        fn ndim(&self) -> usize {
            1
        }

        fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
            dydt[0] = -self.k * y[0];
        }
    }

    #[test]
    fn exp_decay_matches_analytic() {
        let sys = ExpDecay { k: 1.3 };
        let y = rk45(&sys, &[2.0], 0.0, 1.0, &OdeOptions::default()).unwrap();
        let expected = 2.0 * (-1.3_f64).exp();
        assert!((y[0] - expected).abs() < 1e-6, "y={} expected={expected}", y[0]);
    }

    #[test]
    fn zero_span_returns_initial_state() {
        let sys = ExpDecay { k: 1.0 };
        let y = rk45(&sys, &[5.0], 3.0, 3.0, &OdeOptions::default()).unwrap();
        assert_eq!(y, vec![5.0]);
    }

    #[test]
    fn exhausted_step_budget_is_an_error() {
        let sys = ExpDecay { k: 1.0 };
        let opts = OdeOptions { max_steps: 2, ..OdeOptions::default() };
        assert!(rk45(&sys, &[1.0], 0.0, 1000.0, &opts).is_err());
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let sys = ExpDecay { k: 1.0 };
        assert!(rk45(&sys, &[1.0, 2.0], 0.0, 1.0, &OdeOptions::default()).is_err());
    }

    #[test]
    fn backwards_interval_is_an_error() {
        let sys = ExpDecay { k: 1.0 };
        assert!(rk45(&sys, &[1.0], 1.0, 0.0, &OdeOptions::default()).is_err());
    }
}

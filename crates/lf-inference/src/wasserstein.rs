//! First Wasserstein (Earth-Mover) distance over an integer bucket grid.

use lf_core::{Error, Result};

/// W1 distance between two weight vectors whose support is the bucket
/// index (`0, 1, 2, ...`, unit spacing).
///
/// Both vectors are normalized to total mass 1 before comparison, so raw
/// frequencies and densities are accepted alike. The lengths may differ;
/// the shorter vector carries zero mass on the missing tail. For a unit
/// grid W1 reduces to the sum of absolute CDF differences.
pub fn wasserstein_indexed(u: &[f64], v: &[f64]) -> Result<f64> {
    if u.is_empty() || v.is_empty() {
        return Err(Error::Validation("wasserstein: empty weight vector".into()));
    }
    if u.iter().chain(v.iter()).any(|&w| !w.is_finite() || w < 0.0) {
        return Err(Error::Computation(
            "wasserstein: weights must be finite and non-negative".into(),
        ));
    }
    let (su, sv) = (u.iter().sum::<f64>(), v.iter().sum::<f64>());
    if su <= 0.0 || sv <= 0.0 {
        return Err(Error::Computation("wasserstein: zero total mass".into()));
    }

    let n = u.len().max(v.len());
    let mut cu = 0.0;
    let mut cv = 0.0;
    let mut dist = 0.0;
    for k in 0..n - 1 {
        cu += u.get(k).copied().unwrap_or(0.0) / su;
        cv += v.get(k).copied().unwrap_or(0.0) / sv;
        dist += (cu - cv).abs();
    }
    Ok(dist)
}

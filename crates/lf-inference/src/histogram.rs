//! Count histogram construction.
//!
//! Builds the measured parasite-count distribution from a column of raw
//! tokens: a dense frequency table over `[0, nominal_max)`, the matching
//! probability table, and a normalized density vector ready for the
//! distance objective.

use lf_core::{Error, Result};

/// Tokens recognized as missing values and skipped without error.
///
/// This is the pandas NA sentinel set; it is fixed, not configurable, so
/// that files round-tripped through the usual tabular tooling parse the
/// same way everywhere.
pub const MISSING_SENTINELS: &[&str] = &[
    " ", "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND",
    "1.#QNAN", "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Whether a raw token is one of the recognized missing-value sentinels.
pub fn is_missing(token: &str) -> bool {
    MISSING_SENTINELS.contains(&token)
}

/// Measured parasite-count distribution over dense buckets `[0, nominal_max)`.
///
/// Immutable once built; every accessor is index-aligned with the bucket
/// (parasite count) it describes.
#[derive(Debug, Clone)]
pub struct CountHistogram {
    frequencies: Vec<u64>,
    probabilities: Vec<f64>,
    density: Vec<f64>,
}

impl CountHistogram {
    /// Number of buckets (`nominal_max`).
    pub fn nominal_max(&self) -> usize {
        self.frequencies.len()
    }

    /// Largest representable bucket, `nominal_max - 1`. The default model
    /// dimensionality is derived from this.
    pub fn nominal_upper(&self) -> usize {
        self.frequencies.len() - 1
    }

    /// Raw observation frequency per bucket.
    pub fn frequencies(&self) -> &[u64] {
        &self.frequencies
    }

    /// Observation probability per bucket. Sums to 1.
    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    /// Normalized density vector, the measured side of the distance
    /// objective. Sums to 1.
    pub fn density(&self) -> &[f64] {
        &self.density
    }

    /// Total number of hosts counted.
    pub fn total_observations(&self) -> u64 {
        self.frequencies.iter().sum()
    }
}

/// Build a [`CountHistogram`] from a column of raw tokens.
///
/// Missing-value sentinels are skipped. Any other token that does not
/// parse as an integer is a hard error: the primary count column is never
/// silently coerced. Observations outside `[0, nominal_max)` are dropped.
///
/// `nominal_max` guards the downstream binning against degenerate bucket
/// counts: with `max_count < 10` it is `observed_max + 1` when the data
/// exceed 10, and 11 otherwise; with `max_count >= 10` it is
/// `max_count + 1`.
pub fn build_histogram<'a, I>(tokens: I, max_count: i64) -> Result<CountHistogram>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut raw: Vec<(i64, u64)> = Vec::new();
    for token in tokens {
        if is_missing(token) {
            continue;
        }
        let count: i64 = token.parse().map_err(|_| {
            Error::Validation(format!("histogram: count column token {token:?} is not an integer"))
        })?;
        match raw.iter_mut().find(|(k, _)| *k == count) {
            Some((_, n)) => *n += 1,
            None => raw.push((count, 1)),
        }
    }

    if raw.is_empty() {
        return Err(Error::Validation("histogram: no usable counts in column".into()));
    }

    let observed_max = raw.iter().map(|&(k, _)| k).max().unwrap_or(0);
    let nominal_max = if max_count < 10 && observed_max > 10 {
        observed_max + 1
    } else if max_count < 10 {
        11
    } else {
        max_count + 1
    };
    let nominal_max = nominal_max as usize;

    let mut frequencies = vec![0u64; nominal_max];
    for &(count, n) in &raw {
        if count >= 0 && (count as usize) < nominal_max {
            frequencies[count as usize] += n;
        }
    }

    let total: u64 = frequencies.iter().sum();
    if total == 0 {
        return Err(Error::Validation(format!(
            "histogram: every count fell outside [0, {nominal_max})"
        )));
    }

    let probabilities: Vec<f64> = frequencies.iter().map(|&n| n as f64 / total as f64).collect();
    let density = probabilities.clone();

    Ok(CountHistogram { frequencies, probabilities, density })
}

/// Coarsen a density vector to `n + 1` buckets.
///
/// Bucket 0 (the "no parasites" mass) is kept verbatim. The remaining
/// `L - 1` buckets are partitioned into `n` contiguous groups of width
/// `floor((L - 1) / n)` and summed; any remainder buckets beyond the last
/// full group are dropped, not folded into it.
pub fn downsample(hist: &[f64], n: usize) -> Result<Vec<f64>> {
    if n == 0 {
        return Err(Error::Validation("downsample: group count must be >= 1".into()));
    }
    if n > hist.len().saturating_sub(1) {
        return Err(Error::Validation(format!(
            "downsample: {n} groups exceed the {} available buckets",
            hist.len().saturating_sub(1)
        )));
    }
    let width = (hist.len() - 1) / n;
    let mut out = Vec::with_capacity(n + 1);
    out.push(hist[0]);
    for i in 0..n {
        out.push(hist[1 + width * i..1 + width * (i + 1)].iter().sum());
    }
    Ok(out)
}

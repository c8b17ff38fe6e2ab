//! Environmental driver sampling.
//!
//! Turns two aligned columns (time, value) into a step-function lookup of
//! the ambient parasite source density.
//!
//! # Lookup semantics
//!
//! `value_at(t)` returns the value of the **first sample recorded at a
//! time >= t**, falling back to the **last** recorded value once `t` is
//! past the end of the data. This looks *ahead*, not behind: it is not a
//! step-hold interpolation, and inverting it silently changes every fit.

use chrono::NaiveDateTime;
use lf_core::{Error, Result};

use crate::histogram::is_missing;

/// Ordered (time, value) samples of the environmental driver.
///
/// Times are hours: either bare numbers from the file, or elapsed hours
/// since the first valid timestamp when a parse format is supplied.
#[derive(Debug, Clone)]
pub struct DriverSeries {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl DriverSeries {
    /// Build a series from raw (time, value) token pairs.
    ///
    /// Rows where either token is a missing-value sentinel are skipped.
    /// With `time_format` set, times parse as timestamps
    /// (`chrono::NaiveDateTime` format syntax) and become elapsed hours
    /// from the first valid timestamp; otherwise they parse as bare
    /// floats. Parse failures on surviving rows are hard errors.
    pub fn from_rows<'a, I>(rows: I, time_format: Option<&str>) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut times = Vec::new();
        let mut values = Vec::new();
        let mut start: Option<NaiveDateTime> = None;

        for (time_token, value_token) in rows {
            if is_missing(time_token) || is_missing(value_token) {
                continue;
            }
            let t = match time_format {
                Some(fmt) => {
                    let stamp = NaiveDateTime::parse_from_str(time_token, fmt).map_err(|e| {
                        Error::Validation(format!(
                            "driver: timestamp {time_token:?} does not match {fmt:?}: {e}"
                        ))
                    })?;
                    let start = *start.get_or_insert(stamp);
                    (stamp - start).num_seconds() as f64 / 3600.0
                }
                None => time_token.parse().map_err(|_| {
                    Error::Validation(format!("driver: time token {time_token:?} is not numeric"))
                })?,
            };
            let v: f64 = value_token.parse().map_err(|_| {
                Error::Validation(format!("driver: value token {value_token:?} is not numeric"))
            })?;
            times.push(t);
            values.push(v);
        }

        if times.is_empty() {
            return Err(Error::Validation("driver: no usable (time, value) rows".into()));
        }

        Ok(Self { times, values })
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Whether the series is empty. Construction guarantees it never is.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// First recorded value at a sampled time >= `t`; the last recorded
    /// value if `t` is past the final sample.
    pub fn value_at(&self, t: f64) -> f64 {
        self.times
            .iter()
            .position(|&s| s >= t)
            .map(|i| self.values[i])
            .unwrap_or_else(|| *self.values.last().expect("non-empty by construction"))
    }
}

/// Driver closure handed to the compartment model: either a constant
/// reference density or a measured series.
#[derive(Debug, Clone, Copy)]
pub enum Driver<'a> {
    /// Constant density (the reference scenario).
    Constant(f64),
    /// Measured density series (the forced scenario).
    Series(&'a DriverSeries),
}

impl Driver<'_> {
    /// Driver value in effect for a query at time `t`.
    pub fn value_at(&self, t: f64) -> f64 {
        match self {
            Driver::Constant(v) => *v,
            Driver::Series(s) => s.value_at(t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn series(rows: &[(&'static str, &'static str)]) -> DriverSeries {
        DriverSeries::from_rows(rows.iter().copied(), None).unwrap()
    }

    #[test]
    fn lookahead_then_clamp_to_last() {
        let s = series(&[("0", "1"), ("5", "2"), ("10", "3")]);
        assert_relative_eq!(s.value_at(3.0), 2.0);
        assert_relative_eq!(s.value_at(10.0), 3.0);
        assert_relative_eq!(s.value_at(20.0), 3.0);
        assert_relative_eq!(s.value_at(0.0), 1.0);
        assert_relative_eq!(s.value_at(-1.0), 1.0);
    }

    #[test]
    fn missing_rows_are_skipped() {
        let s = series(&[("NA", "9"), ("0", ""), ("2", "4.5")]);
        assert_eq!(s.len(), 1);
        assert_relative_eq!(s.value_at(0.0), 4.5);
    }

    #[test]
    fn timestamps_become_elapsed_hours() {
        let rows = [
            ("2023-04-01 00:00:00", "0.1"),
            ("2023-04-01 06:00:00", "0.2"),
            ("2023-04-03 00:00:00", "0.3"),
        ];
        let s =
            DriverSeries::from_rows(rows.iter().copied(), Some("%Y-%m-%d %H:%M:%S")).unwrap();
        assert_relative_eq!(s.value_at(0.0), 0.1);
        assert_relative_eq!(s.value_at(1.0), 0.2);
        // Two days out: 48h elapsed, not the intra-day remainder.
        assert_relative_eq!(s.value_at(12.0), 0.3);
        assert_relative_eq!(s.value_at(100.0), 0.3);
    }

    #[test]
    fn bad_time_token_is_a_hard_error() {
        assert!(DriverSeries::from_rows([("soon", "1.0")], None).is_err());
        assert!(DriverSeries::from_rows([("1.0", "lots")], None).is_err());
    }

    #[test]
    fn empty_series_is_an_error() {
        assert!(DriverSeries::from_rows([("NA", "1.0")], None).is_err());
    }

    #[test]
    fn constant_driver_ignores_time() {
        let d = Driver::Constant(0.1);
        assert_relative_eq!(d.value_at(0.0), 0.1);
        assert_relative_eq!(d.value_at(1e6), 0.1);
    }
}

//! Sentinel-cage record aggregation.
//!
//! Groups per-host count records by cage and deployment window, chaining
//! windows whose recovery falls within one day of a later deployment, and
//! emits one count series per (cage, deployment, recovery) with the
//! deployment duration in hours.
//!
//! The historical pipeline silently coerced unparseable count fields to
//! zero. That leniency is not replicated by default: the policy is
//! explicit configuration, and `Zero` exists only to reproduce legacy
//! outputs knowingly.

use chrono::NaiveDate;
use lf_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::histogram::is_missing;

/// How to treat a count field that does not parse as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadCountPolicy {
    /// Abort the aggregation with a diagnostic naming the record.
    #[default]
    Fail,
    /// Drop the record.
    Skip,
    /// Historical behavior: record a zero count.
    Zero,
}

/// One raw host record from the sentinel-cage file.
#[derive(Debug, Clone)]
pub struct CageRecord {
    /// Cage identifier.
    pub cage: String,
    /// Deployment date.
    pub deployment: NaiveDate,
    /// Recovery date.
    pub recovery: NaiveDate,
    /// Raw count token, parsed during aggregation under the configured
    /// policy.
    pub count: String,
}

/// Aggregated counts for one deployment window of one cage.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentWindow {
    /// Cage identifier.
    pub cage: String,
    /// Window start (deployment of the first chained record).
    pub deployment: NaiveDate,
    /// Window end (recovery of the last chained record).
    pub recovery: NaiveDate,
    /// Window length in hours.
    pub duration_hours: f64,
    /// Parasite counts of the hosts recovered at the window end.
    pub counts: Vec<i64>,
}

/// Parse a `d/m/y` date token.
pub fn parse_cage_date(token: &str) -> Result<NaiveDate> {
    let mut parts = token.split('/');
    let (d, m, y) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(d), Some(m), Some(y), None) => (d, m, y),
        _ => {
            return Err(Error::Validation(format!("cages: date {token:?} is not d/m/y")));
        }
    };
    let parse = |s: &str, what: &str| {
        s.trim().parse::<i32>().map_err(|_| {
            Error::Validation(format!("cages: {what} {s:?} in date {token:?} is not numeric"))
        })
    };
    NaiveDate::from_ymd_opt(parse(y, "year")?, parse(m, "month")? as u32, parse(d, "day")? as u32)
        .ok_or_else(|| Error::Validation(format!("cages: date {token:?} is out of range")))
}

/// Aggregate host records into per-cage deployment windows.
///
/// Within one cage, windows `(d1, r1)` and `(d2, r2)` chain into
/// `(d1, r2)` when `r1` lands on or at most one day before `d2`; the
/// chained window carries the counts of the records recovered at `r2`.
/// Output order follows first appearance in the input.
pub fn aggregate_cages(
    records: &[CageRecord],
    policy: BadCountPolicy,
) -> Result<Vec<DeploymentWindow>> {
    // (cage, deployment, recovery) -> counts, insertion-ordered.
    let mut groups: Vec<(String, NaiveDate, NaiveDate, Vec<i64>)> = Vec::new();

    for record in records {
        let count = match record.count.parse::<i64>() {
            Ok(c) => c,
            Err(_) => match policy {
                BadCountPolicy::Fail => {
                    let kind =
                        if is_missing(&record.count) { "missing" } else { "non-integer" };
                    return Err(Error::Validation(format!(
                        "cages: {kind} count {:?} for cage {} deployed {}",
                        record.count, record.cage, record.deployment
                    )));
                }
                BadCountPolicy::Skip => continue,
                BadCountPolicy::Zero => 0,
            },
        };

        match groups.iter_mut().find(|(c, d, r, _)| {
            *c == record.cage && *d == record.deployment && *r == record.recovery
        }) {
            Some((_, _, _, counts)) => counts.push(count),
            None => groups.push((
                record.cage.clone(),
                record.deployment,
                record.recovery,
                vec![count],
            )),
        }
    }

    let mut windows = Vec::new();
    let cages: Vec<String> = groups.iter().fold(Vec::new(), |mut acc, (c, ..)| {
        if !acc.contains(c) {
            acc.push(c.clone());
        }
        acc
    });

    for cage in cages {
        let cage_groups: Vec<&(String, NaiveDate, NaiveDate, Vec<i64>)> =
            groups.iter().filter(|(c, ..)| *c == cage).collect();

        for (_, d1, r1, _) in &cage_groups {
            for (_, d2, r2, counts) in &cage_groups {
                let gap = (*r1 - *d2).num_days();
                if (0..=1).contains(&gap) {
                    let duration_hours = (*r2 - *d1).num_seconds() as f64 / 3600.0;
                    windows.push(DeploymentWindow {
                        cage: cage.clone(),
                        deployment: *d1,
                        recovery: *r2,
                        duration_hours,
                        counts: counts.clone(),
                    });
                }
            }
        }
    }

    Ok(windows)
}

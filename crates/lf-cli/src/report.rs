//! Result rendering: JSON report and delimited comparison tables.

use anyhow::Result;
use lf_core::{FitReport, ScenarioFit};
use serde_json::json;

fn scenario_json(scenario: &ScenarioFit) -> serde_json::Value {
    let mut obj = serde_json::Map::new();
    for (name, value) in scenario.rate_names.iter().zip(&scenario.rates) {
        obj.insert(name.clone(), json!(value));
    }
    obj.insert("dist".into(), json!(scenario.distance));
    obj.insert("converged".into(), json!(scenario.converged));
    obj.insert("n_evaluations".into(), json!(scenario.n_evaluations));
    obj.insert("totals".into(), json!(scenario.totals));
    serde_json::Value::Object(obj)
}

/// Assemble the three-section report: observed distribution, reference
/// fit, forced fit.
pub fn report_json(report: &FitReport) -> serde_json::Value {
    json!({
        "obs": {
            "counts": report.observed_counts,
            "probs": report.observed_probabilities,
            "hosts_sampled": report.hosts_sampled(),
        },
        "ref": scenario_json(&report.reference),
        "test": scenario_json(&report.forced),
    })
}

/// Write the per-bucket comparison table to stdout and the rate summary
/// to stderr, both with the given delimiter.
pub fn write_tables(report: &FitReport, delimiter: u8) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().delimiter(delimiter).from_writer(std::io::stdout());
    wtr.write_record(["count", "obs", "ref", "test"])?;
    for (count, &obs) in report.observed_probabilities.iter().enumerate() {
        let reference = report.reference.totals.get(count).copied().unwrap_or(0.0);
        let forced = report.forced.totals.get(count).copied().unwrap_or(0.0);
        wtr.write_record([
            count.to_string(),
            obs.to_string(),
            reference.to_string(),
            forced.to_string(),
        ])?;
    }
    wtr.flush()?;

    let mut meta = csv::WriterBuilder::new().delimiter(delimiter).from_writer(std::io::stderr());
    let mut header = vec!["series".to_string()];
    header.extend(report.reference.rate_names.iter().cloned());
    header.push("dist".into());
    meta.write_record(&header)?;
    for (series, scenario) in [("ref", &report.reference), ("test", &report.forced)] {
        let mut row = vec![series.to_string()];
        row.extend(scenario.rates.iter().map(|r| r.to_string()));
        row.push(scenario.distance.to_string());
        meta.write_record(&row)?;
    }
    meta.flush()?;
    Ok(())
}

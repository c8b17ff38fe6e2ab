//! Delimited-input ingestion: named-column extraction from CSV/TSV files.

use anyhow::{Context, Result, bail};
use std::path::Path;

/// Input delimiter by file extension: `.tsv`/`.txt` are tab-delimited,
/// everything else is comma-delimited.
pub fn input_delimiter(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase().as_str() {
        "tsv" | "txt" => b'\t',
        _ => b',',
    }
}

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .delimiter(input_delimiter(path))
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))
}

fn column_index(headers: &csv::StringRecord, column: &str, path: &Path) -> Result<usize> {
    match headers.iter().position(|h| h == column) {
        Some(i) => Ok(i),
        None => bail!(
            "column {column:?} not found in {} (available: {})",
            path.display(),
            headers.iter().collect::<Vec<_>>().join(", ")
        ),
    }
}

/// Read every value of one named column.
pub fn read_column(path: &Path, column: &str) -> Result<Vec<String>> {
    let mut rdr = open_reader(path)?;
    let headers = rdr.headers().context("failed to read header row")?.clone();
    let idx = column_index(&headers, column, path)?;

    let mut values = Vec::new();
    for record in rdr.records() {
        let record = record.with_context(|| format!("failed to read row of {}", path.display()))?;
        values.push(record.get(idx).unwrap_or("").to_string());
    }
    Ok(values)
}

/// Read two named columns as aligned (a, b) pairs.
pub fn read_pair_columns(path: &Path, a: &str, b: &str) -> Result<Vec<(String, String)>> {
    let mut rdr = open_reader(path)?;
    let headers = rdr.headers().context("failed to read header row")?.clone();
    let ia = column_index(&headers, a, path)?;
    let ib = column_index(&headers, b, path)?;

    let mut pairs = Vec::new();
    for record in rdr.records() {
        let record = record.with_context(|| format!("failed to read row of {}", path.display()))?;
        pairs.push((
            record.get(ia).unwrap_or("").to_string(),
            record.get(ib).unwrap_or("").to_string(),
        ));
    }
    Ok(pairs)
}

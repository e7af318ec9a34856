use std::{fs::File, path::Path};

use eyre::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum FlagError {
    #[error("Invalid flag value {0:?}, expected true/false or a number")]
    InvalidFlag(String),
}

/// Parses the boolean-like columns written by the benchmark.
pub fn parse_flag(raw: &str) -> Result<bool, FlagError> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("true") {
        return Ok(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Ok(false);
    }
    raw.parse::<f64>()
        .map(|x| x != 0.0)
        .map_err(|_| FlagError::InvalidFlag(raw.to_owned()))
}

pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Sample standard deviation (n - 1 denominator)
pub fn sample_stddev(data: &[f64]) -> Option<f64> {
    if data.len() < 2 {
        return None;
    }
    let mean = mean(data)?;
    let sum_sq = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
    Some((sum_sq / (data.len() - 1) as f64).sqrt())
}

/// Empirical quantile with linear interpolation between the two closest ranks.
pub fn quantile(data: &[f64], p: f64) -> Option<f64> {
    if data.is_empty() || !(0.0..=1.0).contains(&p) {
        return None;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Reads a CSV file with a header row into typed rows.
pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .context(format!("Open {}", path.display()))?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .context(format!("Parse {}", path.display()))
}

/// Writes rows as CSV with a header row and no index column, replacing `path`.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let file = File::create(path).context(format!("Create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    debug!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

use std::path::Path;

use eyre::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::util::parse_flag;

/// One completed I/O as recorded in a benchmark latency log.
///
/// Logs carry no header, columns are positional:
/// elapsed time (ms), latency (us), write flag, block size.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySample {
    #[serde(rename = "time ms", deserialize_with = "deserialize_or_nan")]
    pub time_ms: f64,
    #[serde(rename = "latency us", deserialize_with = "deserialize_or_nan")]
    pub latency_us: f64,
    #[serde(deserialize_with = "deserialize_flag")]
    pub write: bool,
    #[serde(deserialize_with = "deserialize_bs")]
    pub bs: u64,
}

/// Missing measurements load as NaN
fn deserialize_or_nan<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Block sizes are sometimes written as floats, ie. `4096.0`
fn deserialize_bs<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if raw.fract() != 0.0 || raw < 0.0 || !raw.is_finite() {
        return Err(serde::de::Error::custom(format!("Invalid block size {raw}")));
    }
    Ok(raw as u64)
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_flag(&raw).map_err(serde::de::Error::custom)
}

pub fn load_samples(path: &Path) -> Result<Vec<LatencySample>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)
        .context(format!("Open latency log {}", path.display()))?;

    let samples = reader
        .deserialize()
        .collect::<Result<Vec<LatencySample>, _>>()
        .context(format!("Parse latency log {}", path.display()))?;
    debug!("Loaded {} samples from {}", samples.len(), path.display());
    Ok(samples)
}

use std::{collections::BTreeMap, path::Path};

use common::{
    LATENCY_SCALE,
    sample::load_samples,
    util::{quantile, sample_stddev, write_csv},
};
use eyre::Result;
use itertools::Itertools;
use rand::{SeedableRng, rngs::StdRng, seq::index};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_PERCENTILE: f64 = 0.95;
pub const DEFAULT_SAMPLES: usize = 750;
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Error, PartialEq)]
pub enum PrepareError {
    #[error("Table has no rows")]
    EmptyTable,
    #[error("Percentile {0} is outside [0, 1]")]
    InvalidPercentile(f64),
    #[error("Cannot sample {requested} rows from a table of {available}")]
    NotEnoughRows { requested: usize, available: usize },
}

/// A latency log row as used for plotting, the write flag is dropped.
///
/// `latency` keeps its `latency us` column name but has already been divided
/// by 1000 on load.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSample {
    #[serde(rename = "time ms")]
    pub time_ms: f64,
    #[serde(rename = "latency us")]
    pub latency: f64,
    pub bs: u64,
}

/// Mean latency of every sample recorded at `time_ms`
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeLatency {
    #[serde(rename = "time ms")]
    pub time_ms: f64,
    #[serde(rename = "latency us")]
    pub latency: f64,
}

pub fn read_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Vec<PlotSample>>> {
    paths
        .iter()
        .map(|path| {
            Ok(load_samples(path.as_ref())?
                .into_iter()
                .map(|x| PlotSample {
                    time_ms: x.time_ms,
                    latency: x.latency_us / LATENCY_SCALE,
                    bs: x.bs,
                })
                .collect())
        })
        .collect()
}

fn latencies(table: &[PlotSample]) -> Vec<f64> {
    table.iter().map(|x| x.latency).collect()
}

/// Applies `stat` to every table's latencies, keyed by the block size of the
/// table's first row. Later tables replace earlier ones with the same key.
fn by_bs<F>(tables: &[Vec<PlotSample>], stat: F) -> Result<BTreeMap<u64, f64>, PrepareError>
where
    F: Fn(&[f64]) -> f64,
{
    let mut result = BTreeMap::new();
    for table in tables {
        let first = table.first().ok_or(PrepareError::EmptyTable)?;
        result.insert(first.bs, stat(&latencies(table)));
    }
    Ok(result)
}

pub fn max_by_bs(tables: &[Vec<PlotSample>]) -> Result<BTreeMap<u64, f64>, PrepareError> {
    by_bs(tables, |x| x.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

pub fn min_by_bs(tables: &[Vec<PlotSample>]) -> Result<BTreeMap<u64, f64>, PrepareError> {
    by_bs(tables, |x| x.iter().copied().fold(f64::INFINITY, f64::min))
}

/// Sample standard deviation per block size, NaN for single row tables
pub fn stddev_by_bs(tables: &[Vec<PlotSample>]) -> Result<BTreeMap<u64, f64>, PrepareError> {
    by_bs(tables, |x| sample_stddev(x).unwrap_or(f64::NAN))
}

/// Keeps the rows whose latency is strictly below the table's `p` quantile.
pub fn trim_to_percentile(table: &[PlotSample], p: f64) -> Result<Vec<PlotSample>, PrepareError> {
    if !(0.0..=1.0).contains(&p) {
        return Err(PrepareError::InvalidPercentile(p));
    }
    let Some(cutoff) = quantile(&latencies(table), p) else {
        return Ok(Vec::new());
    };
    let trimmed = table
        .iter()
        .filter(|x| x.latency < cutoff)
        .cloned()
        .collect::<Vec<_>>();
    debug!(
        "p={p} cutoff={cutoff} kept {}/{} rows",
        trimmed.len(),
        table.len()
    );
    Ok(trimmed)
}

/// Uniform sample of `num_samples` rows without replacement, reproducible for
/// a given `seed`.
pub fn downsample(
    table: &[PlotSample],
    num_samples: usize,
    seed: u64,
) -> Result<Vec<PlotSample>, PrepareError> {
    if table.len() < num_samples {
        return Err(PrepareError::NotEnoughRows {
            requested: num_samples,
            available: table.len(),
        });
    }
    let mut rng = StdRng::seed_from_u64(seed);
    Ok(index::sample(&mut rng, table.len(), num_samples)
        .into_iter()
        .map(|i| table[i].clone())
        .collect())
}

pub fn merge_blk_sizes(tables: &[Vec<PlotSample>]) -> Vec<PlotSample> {
    tables.concat()
}

/// Read, trim to `p`, downsample with the defaults and merge into one table.
pub fn plot_quick_prepare<P: AsRef<Path>>(paths: &[P], p: f64) -> Result<Vec<PlotSample>> {
    prepare(paths, p, DEFAULT_SAMPLES, DEFAULT_SEED)
}

pub fn prepare<P: AsRef<Path>>(
    paths: &[P],
    p: f64,
    num_samples: usize,
    seed: u64,
) -> Result<Vec<PlotSample>> {
    let sampled = read_files(paths)?
        .iter()
        .map(|table| downsample(&trim_to_percentile(table, p)?, num_samples, seed))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(merge_blk_sizes(&sampled))
}

/// Mean latency over time for every input, ascending by time.
pub fn lineplot_all<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Vec<TimeLatency>>> {
    Ok(read_files(paths)?.iter().map(|x| mean_by_time(x)).collect())
}

pub fn mean_by_time(table: &[PlotSample]) -> Vec<TimeLatency> {
    let mut sorted = table
        .iter()
        .filter(|x| !x.time_ms.is_nan())
        .collect::<Vec<_>>();
    sorted.sort_by(|a, b| a.time_ms.total_cmp(&b.time_ms));

    let chunks = sorted.into_iter().chunk_by(|x| x.time_ms);
    let series = chunks
        .into_iter()
        .map(|(time_ms, group)| {
            let (sum, count) = group.fold((0.0, 0usize), |(sum, count), x| {
                (sum + x.latency, count + 1)
            });
            TimeLatency {
                time_ms,
                latency: sum / count as f64,
            }
        })
        .collect::<Vec<_>>();
    series
}

pub fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    write_csv(path, rows)?;
    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};

use common::{
    BYTES_PER_MB, LATENCY_SCALE, TOTAL_TIME_SECS,
    sample::{LatencySample, load_samples},
    util::{mean, read_csv, write_csv},
};
use eyre::{Context, ContextCompat, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A latency log together with the parameters of the run that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFile {
    pub dev: String,
    pub qs: u32,
    pub bs: u64,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedRun {
    pub file: RunFile,
    pub samples: Vec<LatencySample>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunAverages {
    pub file: RunFile,
    pub avg_latency: f64,
    pub avg_bandwidth: f64,
}

/// One row of the aggregated summary table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    #[serde(rename = "queue depth")]
    pub queue_depth: u32,
    #[serde(rename = "average latency (us)")]
    pub avg_latency: f64,
    #[serde(rename = "average bandwidth (MB/s)")]
    pub avg_bandwidth: f64,
    pub device: String,
    pub bs: u64,
}

/// Reads a YAML list of [`RunFile`]s. Relative log paths are taken relative
/// to the manifest itself.
pub fn load_manifest(path: &Path) -> Result<Vec<RunFile>> {
    let mut files: Vec<RunFile> = serde_yml::from_str(
        &read_to_string(path).context(format!("Read manifest {}", path.display()))?,
    )
    .context(format!("Parse manifest {}", path.display()))?;

    let base = path.parent().unwrap_or(Path::new(""));
    for file in &mut files {
        if file.path.is_relative() {
            file.path = base.join(&file.path);
        }
    }
    Ok(files)
}

pub fn load_files(files: &[RunFile]) -> Result<Vec<LoadedRun>> {
    files
        .iter()
        .map(|file| {
            Ok(LoadedRun {
                file: file.clone(),
                samples: load_samples(&file.path)?,
            })
        })
        .collect()
}

/// Mean latency of each run (recorded value / 1000) and its bandwidth over
/// the fixed run window.
pub fn avg_lat_and_bw(runs: Vec<LoadedRun>) -> Result<Vec<RunAverages>> {
    runs.into_iter()
        .map(|run| {
            let latencies = run
                .samples
                .iter()
                .map(|x| x.latency_us / LATENCY_SCALE)
                .collect::<Vec<_>>();
            let avg_latency = mean(&latencies)
                .context(format!("No samples in {}", run.file.path.display()))?;
            let total_bytes = run.samples.iter().map(|x| x.bs).sum::<u64>() as f64;
            let avg_bandwidth = total_bytes / BYTES_PER_MB / TOTAL_TIME_SECS;
            debug!(
                "dev={} qs={} bs={} lat={avg_latency} bw={avg_bandwidth}",
                run.file.dev, run.file.qs, run.file.bs
            );
            Ok(RunAverages {
                file: run.file,
                avg_latency,
                avg_bandwidth,
            })
        })
        .collect()
}

pub fn avgs_to_table(averages: &[RunAverages]) -> Vec<SummaryRow> {
    averages
        .iter()
        .map(|x| SummaryRow {
            queue_depth: x.file.qs,
            avg_latency: x.avg_latency,
            avg_bandwidth: x.avg_bandwidth,
            device: x.file.dev.clone(),
            bs: x.file.bs,
        })
        .collect()
}

pub fn dump_tables_to_csv<P: AsRef<Path>, T: Serialize>(tables: &[(P, Vec<T>)]) -> Result<()> {
    for (path, table) in tables {
        write_csv(path.as_ref(), table)?;
    }
    Ok(())
}

pub fn load_tables_from_csv<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Vec<SummaryRow>>> {
    paths.iter().map(|path| read_csv(path.as_ref())).collect()
}

/// Loads every run, aggregates them into one summary table and writes it to `out_file`.
pub fn agg_and_save(files: &[RunFile], out_file: &Path) -> Result<Vec<SummaryRow>> {
    let table = avgs_to_table(&avg_lat_and_bw(load_files(files)?)?);
    dump_tables_to_csv(&[(out_file, table.clone())])?;
    info!("Summarised {} runs into {}", table.len(), out_file.display());
    Ok(table)
}

use std::{collections::BTreeMap, fs::create_dir_all, path::PathBuf};

use clap::{Parser, Subcommand};
use common::logging::init_logging;
use eyre::{ContextCompat, Result};
use iobench::{IoDriver, Targets};
use latency::{
    DEFAULT_PERCENTILE, DEFAULT_SAMPLES, DEFAULT_SEED, lineplot_all, max_by_bs, min_by_bs,
    prepare, read_files, stddev_by_bs, write_table,
};
use serde::Serialize;
use summary::{agg_and_save, load_manifest};
use tracing::{error, info};

const LOG_MODULES: &[&str] = &["iobench_tools", "common", "iobench", "summary", "latency"];

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Extra tracing directives, ie. `latency=debug`
    #[arg(short, long)]
    log: Vec<String>,
    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List benchmark targets
    Targets {
        /// Also load targets from this YAML file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Summarise runs listed in a manifest into one CSV
    Aggregate {
        /// YAML list of runs (dev, qs, bs, path)
        #[arg(short, long)]
        manifest: PathBuf,
        #[arg(short, long, default_value = "summary.csv")]
        output: PathBuf,
    },
    /// Print max/min/stddev latency per block size as JSON
    Stats {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Trim, downsample and merge latency logs into one plot table
    Prepare {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long, default_value = "plot_data.csv")]
        output: PathBuf,
        #[arg(short, long, default_value_t = DEFAULT_PERCENTILE)]
        percentile: f64,
        #[arg(short, long, default_value_t = DEFAULT_SAMPLES)]
        samples: usize,
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
    },
    /// Write the mean latency over time of every log
    Lineplot {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long, default_value = "lineplots")]
        output_dir: PathBuf,
    },
}

#[derive(Serialize)]
struct LatencyStats {
    max: BTreeMap<u64, f64>,
    min: BTreeMap<u64, f64>,
    stddev: BTreeMap<u64, f64>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let _guard = init_logging(LOG_MODULES, &args.log, args.log_file.as_deref())?;

    if let Err(err) = run(args.command) {
        error!("{err:#?}");
        return Err(err);
    }
    Ok(())
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Targets { file } => list_targets(file)?,
        Commands::Aggregate { manifest, output } => {
            let files = load_manifest(&manifest)?;
            agg_and_save(&files, &output)?;
        }
        Commands::Stats { files } => {
            let tables = read_files(&files)?;
            let stats = LatencyStats {
                max: max_by_bs(&tables)?,
                min: min_by_bs(&tables)?,
                stddev: stddev_by_bs(&tables)?,
            };
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Prepare {
            files,
            output,
            percentile,
            samples,
            seed,
        } => {
            let merged = prepare(&files, percentile, samples, seed)?;
            write_table(&output, &merged)?;
        }
        Commands::Lineplot { files, output_dir } => {
            create_dir_all(&output_dir)?;
            for (file, series) in files.iter().zip(lineplot_all(&files)?) {
                let stem = file
                    .file_stem()
                    .and_then(|x| x.to_str())
                    .context(format!("Invalid log path {}", file.display()))?;
                write_table(&output_dir.join(format!("{stem}_avg.csv")), &series)?;
            }
            info!("Wrote {} series to {}", files.len(), output_dir.display());
        }
    }
    Ok(())
}

fn list_targets(file: Option<PathBuf>) -> Result<()> {
    let mut targets = Targets::builtin();
    if let Some(file) = file {
        targets.load_overrides(&file)?;
    }

    for (name, config) in targets.iter() {
        let driver_opts = match &config.io_driver {
            IoDriver::Spdk(spdk) => spdk.args().join(" "),
            IoDriver::Sync => String::new(),
        };
        let line = format!(
            "{} -> {} core-mask={} {}",
            name,
            config.io_driver.name(),
            config.core_mask,
            driver_opts
        );
        println!("{}", line.trim_end());
    }
    Ok(())
}

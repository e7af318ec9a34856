use std::{convert::Infallible, path::Path};

use clap::{ArgAction, Parser};
use common::logging::init_logging;
use eyre::Result;
use iobench::{IoBench, RunOptions, Targets};
use tracing::debug;

const LOG_MODULES: &[&str] = &["gen_cmdline", "iobench"];
/// YAML file of targets merged over the built-in table
const TARGETS_ENV: &str = "IOBENCH_TARGETS";

/// Print the benchmark command line for a target.
///
/// Switches are enabled only by the literal value `true`. Arguments past the
/// last one are ignored.
#[derive(Parser)]
#[command(allow_hyphen_values = true)]
struct Cli {
    /// Output file prefix
    output_path: String,
    /// Record total I/O latency
    #[arg(required = true, action = ArgAction::Set, value_parser = switch)]
    io_latency: bool,
    /// Record poll latency
    #[arg(required = true, action = ArgAction::Set, value_parser = switch)]
    poll_latency: bool,
    /// Record submission latency
    #[arg(required = true, action = ArgAction::Set, value_parser = switch)]
    submit_latency: bool,
    /// Record buffer latency
    #[arg(required = true, action = ArgAction::Set, value_parser = switch)]
    buffer_latency: bool,
    /// Monitor the device's PCIe bus
    #[arg(required = true, action = ArgAction::Set, value_parser = switch)]
    pci_profiling: bool,
    num_requests: String,
    target: String,
    /// Operation type/pattern
    io_type: String,
    queue_depth: String,
    /// Block size
    io_size: String,
    max_file_size: String,
    #[arg(required = true, action = ArgAction::Set, value_parser = switch)]
    force_sync: bool,
    /// Bytes to limit the run at
    io_bytes: String,
    /// Limit on the number of requests instead of bytes
    #[arg(action = ArgAction::Set, value_parser = switch)]
    limit_requests: Option<bool>,
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    extra: Vec<String>,
}

fn switch(raw: &str) -> Result<bool, Infallible> {
    Ok(raw == "true")
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            output_prefix: self.output_path.clone(),
            latency_results: self.io_latency,
            poll_results: self.poll_latency,
            submission_results: self.submit_latency,
            buffer_results: self.buffer_latency,
            pci_profiling: self.pci_profiling,
            num_requests: self.num_requests.clone(),
            io_type: self.io_type.clone(),
            queue_depth: self.queue_depth.clone(),
            io_size: self.io_size.clone(),
            max_file_size: self.max_file_size.clone(),
            force_sync: self.force_sync,
            io_bytes: self.io_bytes.clone(),
            limit_requests: self.limit_requests.unwrap_or(false),
        }
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let _guard = init_logging(LOG_MODULES, &[], None)?;

    if !args.extra.is_empty() {
        debug!("Ignoring extra arguments {:?}", args.extra);
    }

    let mut targets = Targets::builtin();
    if let Ok(path) = std::env::var(TARGETS_ENV) {
        debug!("Loading targets from {path}");
        targets.load_overrides(Path::new(&path))?;
    }

    let cmd = IoBench::new(targets).cmdline(&args.target, &args.run_options())?;
    println!("{cmd}");
    Ok(())
}

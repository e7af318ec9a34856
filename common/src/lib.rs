pub mod logging;
pub mod sample;
pub mod util;

pub const BYTES_PER_MB: f64 = 1_048_576.0;
/// Wall clock window a benchmark run is assumed to cover, in seconds
pub const TOTAL_TIME_SECS: f64 = 120.0;
/// Latency is recorded in microseconds, plots and summaries divide by this
pub const LATENCY_SCALE: f64 = 1000.0;

use std::path::Path;

use eyre::{Context, ContextCompat, Result, eyre};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    filter::LevelFilter,
    fmt::{layer, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Builds the filter for `modules`.
///
/// A bare level in `RUST_LOG` applies to every module in `modules` on top of a
/// `warn` default. Anything else is read as a full directive list, with
/// invalid directives skipped. `directives` are added last and win over both.
pub fn env_filter(
    modules: &[&str],
    directives: &[String],
    rust_log: Option<&str>,
) -> Result<EnvFilter> {
    let module_level = match rust_log {
        None => Some(LevelFilter::WARN),
        Some(raw) => raw.trim().parse::<LevelFilter>().ok(),
    };
    let mut env_filter = match (rust_log, module_level) {
        (Some(raw), None) => EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .parse_lossy(raw),
        _ => EnvFilter::new("warn"),
    };

    if let Some(level) = module_level {
        for module in modules {
            if !directives.iter().any(|x| x.starts_with(module)) {
                env_filter = env_filter.add_directive(format!("{module}={level}").parse()?);
            }
        }
    }

    for directive in directives {
        env_filter = env_filter.add_directive(
            directive
                .parse()
                .context(format!("Invalid log directive {directive}"))?,
        );
    }
    Ok(env_filter)
}

/// Installs the global subscriber.
///
/// Filtering follows [`env_filter`] with `RUST_LOG`. Human readable output
/// goes to stderr so stdout stays free for results. When `log_file` is set a
/// second, uncoloured layer is written through a non-blocking appender; the
/// returned guard must be held until exit for it to flush.
pub fn init_logging(
    modules: &[&str],
    directives: &[String],
    log_file: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let env_filter = env_filter(modules, directives, rust_log.as_deref())?;

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or(Path::new("."));
            let name = path.file_name().context("Log file path has no file name")?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (
                Some(layer().with_ansi(false).with_writer(non_blocking)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            layer()
                .with_timer(ChronoLocal::new("%v %k:%M:%S %z".to_owned()))
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(file_layer)
        .try_init()
        .map_err(|err| eyre!("Install tracing subscriber: {err}"))?;

    Ok(guard)
}

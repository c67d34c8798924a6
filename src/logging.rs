use eyre::{Context, Result, eyre};
use std::fs::OpenOptions;
use std::path::Path;
use tracing_appender::non_blocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::prelude::*;

const DEFAULT_FILTER: &str = "info";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber: every event goes to `log_file` (appended),
/// and to stderr as well when `verbose` is set.
///
/// The returned guard flushes the file writer when dropped; keep it alive for
/// the whole run.
pub fn init(log_file: &Path, verbose: bool) -> Result<WorkerGuard> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .wrap_err_with(|| format!("Failed to open log file: {}", log_file.display()))?;

    let (writer, guard) = non_blocking(file);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_filter(env_filter());

    let stderr_layer = verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .with_filter(env_filter())
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| eyre!("Failed to install logger: {}", e))?;

    Ok(guard)
}

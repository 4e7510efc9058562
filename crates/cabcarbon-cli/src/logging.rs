//! Process logging: colored stderr plus an append-only plain-text log file.

use std::ffi::OsStr;
use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::CliError;

/// Install the global subscriber. Keep the returned guard alive until exit
/// so buffered file lines are flushed.
pub fn init(log_file: &Path) -> Result<WorkerGuard, CliError> {
    let log_dir = match log_file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(log_dir)?;
    let file_name = log_file
        .file_name()
        .unwrap_or_else(|| OsStr::new("cabcarbon.log"));

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(env_filter("RUST_LOG", "info")?);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(non_blocking_file)
        .with_filter(env_filter("CABCARBON_LOG", "debug")?);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|error| CliError::Logging(error.to_string()))?;

    Ok(guard)
}

fn env_filter(variable: &str, default_level: &str) -> Result<EnvFilter, CliError> {
    let directive = default_level
        .parse::<Directive>()
        .map_err(|error| CliError::Logging(error.to_string()))?;
    Ok(EnvFilter::from_env(variable).add_directive(directive))
}

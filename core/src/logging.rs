//! Logging setup built on `tracing`, with optional daily-rolling file output.

use std::io::IsTerminal;
use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::error::CoreError;

/// Minimal stderr-only logger for early startup, before configuration has
/// been loaded, or as a fallback when full initialization fails.
pub fn init_minimal_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    let _ = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
}

/// Installs the global tracing subscriber per `config`. `verbose` forces
/// debug-level console output regardless of `config.level`, matching the
/// externalized `--verbose` startup flag.
///
/// Returns a [`WorkerGuard`] that must be kept alive for the process
/// lifetime when file logging is enabled — dropping it stops the
/// non-blocking writer's flush thread.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<Option<WorkerGuard>, CoreError> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console_layer = fmt::layer()
        .with_ansi(std::io::stdout().is_terminal())
        .with_writer(std::io::stdout);

    let (file_layer, guard) = match &config.file_path {
        Some(path) => {
            let (layer, guard) = build_file_layer(path, &config.format)?;
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(console_layer)
        .with(file_layer);

    subscriber
        .try_init()
        .map_err(|e| CoreError::Logging(format!("failed to install global subscriber: {e}")))?;

    Ok(guard)
}

fn build_file_layer(
    log_path: &Path,
    format: &str,
) -> Result<(Box<dyn Layer<Registry> + Send + Sync + 'static>, WorkerGuard), CoreError> {
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file_appender = tracing_appender::rolling::daily(
        log_path.parent().unwrap_or_else(|| Path::new(".")),
        log_path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("compman.log")),
    );
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let layer: Box<dyn Layer<Registry> + Send + Sync + 'static> = if format.eq_ignore_ascii_case("json") {
        Box::new(fmt::layer().json().with_writer(non_blocking_writer).with_ansi(false))
    } else {
        Box::new(fmt::layer().with_writer(non_blocking_writer).with_ansi(false))
    };

    Ok((layer, guard))
}

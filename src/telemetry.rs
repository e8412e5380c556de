//! Telemetry and Observability
//!
//! Sets up `tracing-subscriber` for structured logging, plus a rolling
//! daily log file under the configured log directory. Supports format
//! switching between pretty (debug) and JSON (release) console output.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber with the given log level and log directory.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter > default "info".
///
/// Returns a `WorkerGuard` that must be held for the lifetime of the process;
/// dropping it flushes and stops the non-blocking file writer.
pub fn init_telemetry_with_level(log_level: &str, log_dir: &Path) -> WorkerGuard {
    let default_filter = format!("{log_level},cradle={log_level}");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let file_appender = tracing_appender::rolling::never(log_dir, "cradle.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking);

    #[cfg(debug_assertions)]
    let console_layer = fmt::layer().pretty().with_target(false);
    #[cfg(not(debug_assertions))]
    let console_layer = fmt::layer().json().with_current_span(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .ok();

    guard
}

/// Initialize the tracing subscriber with default settings ("info" level).
pub fn init_telemetry(log_dir: &Path) -> WorkerGuard {
    init_telemetry_with_level("info", log_dir)
}

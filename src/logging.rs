//! Subscriber setup for the watcher binary
//!
//! Bridge modules log at the configured level. HTTP client internals
//! (`reqwest`, `hyper`) only surface warnings, so a poll loop at `debug`
//! does not drown in connection-pool chatter. `RUST_LOG` replaces the whole
//! filter when set.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");
const FALLBACK_LEVEL: &str = "info";

/// Filter directives for a configured level: everything at `warn`, this
/// crate at `level`
pub fn default_directives(level: &str) -> String {
    let level = level.trim();
    let level = if level.is_empty() { FALLBACK_LEVEL } else { level };
    format!("warn,{}={}", CRATE_TARGET, level)
}

/// Map the config's rotation name onto an appender rotation. Unknown
/// names mean a single file.
pub fn rotation_for(name: &str) -> Rotation {
    match name.to_ascii_lowercase().as_str() {
        "minutely" => Rotation::MINUTELY,
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        _ => Rotation::NEVER,
    }
}

fn build_filter(config: &AppConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::try_new(default_directives(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new(default_directives(FALLBACK_LEVEL)))
}

/// Install the global subscriber. Keep the guard alive for the whole run;
/// dropping it flushes and stops the file writer.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = RollingFileAppender::new(
        rotation_for(&config.rotation),
        &config.log_dir,
        &config.log_file,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let registry = tracing_subscriber::registry().with(build_filter(config));

    if config.use_json {
        // One JSON object per line, hash and status fields flattened
        let file_layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        // Target shows which orchestrator logged the line
        let file_layer = fmt::layer()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().compact().with_target(true).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    guard
}

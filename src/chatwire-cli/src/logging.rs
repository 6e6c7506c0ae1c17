//! Tracing subscriber setup.
//!
//! Logs always go to stderr so stdout carries only the transcript.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::args::{LogArgs, LogLevel};

/// Environment variable selecting the log level.
pub const CHATWIRE_LOG_LEVEL_ENV: &str = "CHATWIRE_LOG_LEVEL";

/// Keeps the debug log writer alive; flushes on drop.
pub struct LoggingGuard {
    _file: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Resolve the stderr filter directive.
///
/// Precedence: command-line level, `RUST_LOG`, `CHATWIRE_LOG_LEVEL`, default.
pub fn filter_directive(
    args: &LogArgs,
    rust_log: Option<&str>,
    env_level: Option<&str>,
) -> String {
    if let Some(level) = args.explicit_level() {
        return crate_directive(level);
    }
    if let Some(directive) = rust_log.filter(|d| !d.is_empty()) {
        return directive.to_string();
    }
    let level = env_level
        .and_then(LogLevel::from_str_loose)
        .unwrap_or_default();
    crate_directive(level)
}

fn crate_directive(level: LogLevel) -> String {
    let level = level.as_filter_str();
    format!("warn,chatwire_cli={level},chatwire_engine={level}")
}

/// Install the global subscriber.
pub fn init_logging(args: &LogArgs) -> Result<LoggingGuard> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let env_level = std::env::var(CHATWIRE_LOG_LEVEL_ENV).ok();
    let directive = filter_directive(args, rust_log.as_deref(), env_level.as_deref());
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("invalid log filter `{directive}`"))?;

    let stderr_layer: BoxedLayer = if args.log_json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(filter)
            .boxed()
    };

    let mut layers = vec![stderr_layer];
    let mut file_guard = None;
    if let Some(path) = &args.debug_log {
        let (layer, guard) = debug_file_layer(path)?;
        layers.push(layer);
        file_guard = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("failed to install tracing subscriber")?;

    if let Some(path) = &args.debug_log {
        tracing::debug!(path = %path.display(), "Debug logging enabled");
    }
    Ok(LoggingGuard { _file: file_guard })
}

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

fn debug_file_layer(
    path: &Path,
) -> Result<(BoxedLayer, tracing_appender::non_blocking::WorkerGuard)> {
    let file = File::create(path)
        .with_context(|| format!("failed to create debug log {}", path.display()))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(LevelFilter::TRACE)
        .boxed();
    Ok((layer, guard))
}

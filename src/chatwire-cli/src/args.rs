//! CLI argument structures and parsing.

use std::path::PathBuf;

use chatwire_engine::ConfigOverrides;
use clap::Parser;

use crate::output::OutputFormat;

/// Log level for tracing output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Only show errors
    Error,
    /// Show warnings and errors (default)
    #[default]
    Warn,
    /// Show informational messages, warnings, and errors
    Info,
    /// Show debug messages and above
    Debug,
    /// Show all messages including trace-level details
    Trace,
}

impl LogLevel {
    /// Convert to tracing filter string.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<LogLevel> {
        match s.to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

/// Send prompts to a streaming chat agent and print its replies.
#[derive(Debug, Parser)]
#[command(name = "chatwire", version, about)]
pub struct Cli {
    /// Prompt to send. Without one, prompts are read from stdin, one per line.
    pub prompt: Vec<String>,

    /// Chat-streaming endpoint URL
    #[arg(short, long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Configuration file (default: ~/.chatwire/config.toml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// TCP connect timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub connect_timeout_secs: Option<u64>,

    /// Abort a reply that stalls for this many seconds
    #[arg(long, value_name = "SECS")]
    pub idle_timeout_secs: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub logging: LogArgs,
}

/// Logging flags.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct LogArgs {
    /// Log level (overrides RUST_LOG and CHATWIRE_LOG_LEVEL)
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    pub verbose: bool,

    /// Shorthand for --log-level trace
    #[arg(long)]
    pub trace: bool,

    /// Emit stderr logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Also write trace-level logs to FILE
    #[arg(long, value_name = "FILE")]
    pub debug_log: Option<PathBuf>,
}

impl LogArgs {
    /// Level named on the command line, if any.
    pub fn explicit_level(&self) -> Option<LogLevel> {
        if self.trace {
            Some(LogLevel::Trace)
        } else if self.verbose {
            Some(LogLevel::Debug)
        } else {
            self.log_level
        }
    }
}

impl Cli {
    /// Prompt given as arguments, joined with spaces.
    pub fn prompt_text(&self) -> Option<String> {
        if self.prompt.is_empty() {
            None
        } else {
            Some(self.prompt.join(" "))
        }
    }

    pub fn config_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_path: self.config.clone(),
            endpoint: self.endpoint.clone(),
            connect_timeout_secs: self.connect_timeout_secs,
            idle_timeout_secs: self.idle_timeout_secs,
        }
    }
}

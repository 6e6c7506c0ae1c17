//! Chatwire CLI - Headless front end for the chat-streaming client.
//!
//! Sends one prompt from the command line, or one prompt per stdin line, and
//! prints the replies as text, JSON or JSON Lines.

pub mod args;
pub mod logging;
pub mod output;
pub mod runner;

pub use args::{Cli, LogArgs, LogLevel};
pub use logging::{LoggingGuard, init_logging};
pub use output::{LiveTail, OutputFormat, OutputWriter};
pub use runner::{PromptSource, SessionReport, run, run_session};

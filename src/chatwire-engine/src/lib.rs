//! Chatwire Engine - Streaming chat client core.
//!
//! This crate contains the core functionality:
//! - Incremental decoding of the agent's event stream
//! - The transcript and the per-request state machine folding events into it
//! - The controller running one request/response cycle end to end
//! - The HTTP transport and configuration loading
//!
//! NOTE: This crate should NOT contain any terminal rendering code.
//! Output formatting belongs in chatwire-cli.

#![deny(clippy::print_stdout, clippy::print_stderr)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::doc_markdown
)]

pub mod config;
pub mod controller;
pub mod decoder;
pub mod error;
pub mod outcome;
pub mod state_machine;
pub mod transcript;
pub mod transport;
pub mod utf8;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ChatwireConfig, ConfigOverrides, load_config};
pub use controller::{RejectReason, SubmitResult, TranscriptController};
pub use decoder::{DecoderStats, StreamEventDecoder};
pub use error::{ChatError, DecodeWarning, Result};
pub use outcome::{FailureKind, RequestOutcome};
pub use state_machine::{StreamPhase, TranscriptStateMachine};
pub use transcript::{Message, MessageContent, Role, ToolActivity, ToolPhase, Transcript};
pub use transport::{ChatTransport, FragmentStream, HttpTransport, TransportResponse};
pub use utf8::Utf8StreamBuffer;

pub use chatwire_protocol::{ChatRequest, MessageId, StreamEvent};

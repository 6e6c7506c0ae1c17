//! Error types for Chatwire Engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::outcome::FailureKind;

/// Result type alias for Chatwire operations.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Transcript text for a transport-level failure.
pub const TRANSPORT_FAILURE_TEXT: &str = "Error: Could not connect or stream failed.";

/// Transcript text for a success status without a stream body.
pub const EMPTY_BODY_TEXT: &str = "Empty response from server.";

/// Transcript text for a request aborted by the caller.
pub const CANCELLED_TEXT: &str = "Request cancelled.";

/// Main error type for Chatwire Engine.
#[derive(Debug, Error)]
pub enum ChatError {
    // Request errors
    #[error("HTTP {status}: {detail}")]
    Http { status: u16, detail: String },

    #[error("Empty response body")]
    EmptyBody,

    #[error("Stream error: {detail}")]
    Stream { detail: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid configuration: {field} - {message}")]
    InvalidConfig { field: String, message: String },

    // File system errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl ChatError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Map a reqwest failure to a transport error, naming the endpoint.
    pub fn from_reqwest(e: reqwest::Error, endpoint: &str) -> Self {
        let message = if e.is_timeout() {
            format!("request to {endpoint} timed out")
        } else if e.is_connect() {
            format!("failed to connect to {endpoint}: {e}")
        } else {
            format!("{endpoint}: {e}")
        };
        Self::Transport { message }
    }

    /// Failure category recorded in the request outcome.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Http { status, .. } => FailureKind::Http { status: *status },
            Self::EmptyBody => FailureKind::EmptyBody,
            Self::Stream { .. } => FailureKind::Stream,
            Self::Cancelled => FailureKind::Cancelled,
            _ => FailureKind::Transport,
        }
    }

    /// Detail recorded in the request outcome.
    pub fn detail(&self) -> String {
        match self {
            Self::Http { detail, .. } | Self::Stream { detail } => detail.clone(),
            Self::Transport { message } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Text shown in place of the agent reply when this error ends a request.
    pub fn user_message(&self) -> String {
        match self {
            Self::Http { detail, .. } => format!("Error: {detail}"),
            Self::EmptyBody => EMPTY_BODY_TEXT.to_string(),
            Self::Stream { detail } => format!("Stream Error: {detail}"),
            Self::Transport { .. } => TRANSPORT_FAILURE_TEXT.to_string(),
            Self::Cancelled => CANCELLED_TEXT.to_string(),
            other => format!("Error: {other}"),
        }
    }
}

/// A frame that was dropped while decoding. Never fatal and never shown in
/// the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeWarning {
    #[error("payload is not valid JSON: {reason}")]
    InvalidJson { reason: String },

    #[error("payload has no string `type` field")]
    MissingType,

    #[error("unrecognized event type `{kind}`")]
    UnknownType { kind: String },

    #[error("`{kind}` payload has an invalid shape: {reason}")]
    InvalidShape { kind: String, reason: String },
}

impl DecodeWarning {
    /// Unknown types are expected from newer agents; everything else is malformed data.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::UnknownType { .. })
    }
}

//! Result of one submit cycle.

use serde::Serialize;

/// Category of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// Non-success status on the initial request.
    Http { status: u16 },
    /// Success status but no stream body.
    EmptyBody,
    /// The agent signaled a failure mid-stream.
    Stream,
    /// Connection or read failure.
    Transport,
    /// The caller aborted the request.
    Cancelled,
}

/// How a request ended. Produced once, when the agent message is finalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RequestOutcome {
    Success {
        final_text: String,
        response_time_seconds: f64,
    },
    Failure {
        kind: FailureKind,
        detail: String,
        response_time_seconds: f64,
    },
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn response_time_seconds(&self) -> f64 {
        match self {
            Self::Success {
                response_time_seconds,
                ..
            }
            | Self::Failure {
                response_time_seconds,
                ..
            } => *response_time_seconds,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }
}

//! Outbound request body.

use serde::{Deserialize, Serialize};

/// Media type requested from the chat-streaming endpoint.
pub const EVENT_STREAM_MEDIA_TYPE: &str = "text/event-stream";

/// Body of the single POST issued per submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// User text, sent verbatim.
    pub text: String,
}

impl ChatRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

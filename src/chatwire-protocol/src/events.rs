//! Stream events emitted by the agent endpoint.
//!
//! Each event travels as one JSON object whose `type` field selects the
//! variant:
//!
//! | type | fields |
//! |---|---|
//! | `llm_chunk` | `content` |
//! | `tool_start` | `name`, `input` |
//! | `tool_end` | `name`, `output` |
//! | `stream_end` | - |
//! | `error` | `detail` |

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the discriminator field in every payload.
pub const TYPE_FIELD: &str = "type";

/// A typed event decoded from one stream frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental agent text. An empty chunk is valid.
    LlmChunk { content: String },
    /// A tool invocation has begun.
    ToolStart {
        name: String,
        #[serde(default)]
        input: Value,
    },
    /// A tool invocation has completed.
    ToolEnd {
        name: String,
        #[serde(default)]
        output: Value,
    },
    /// Server-signaled graceful end.
    StreamEnd,
    /// Server-signaled mid-stream failure.
    #[serde(rename = "error")]
    StreamError { detail: String },
}

impl StreamEvent {
    /// Every discriminator value this client understands.
    pub const WIRE_TYPES: [&'static str; 5] =
        ["llm_chunk", "tool_start", "tool_end", "stream_end", "error"];

    /// Whether `tag` names one of the known variants.
    pub fn is_known_type(tag: &str) -> bool {
        Self::WIRE_TYPES.contains(&tag)
    }

    /// Discriminator value of this event on the wire.
    pub fn wire_type(&self) -> &'static str {
        match self {
            Self::LlmChunk { .. } => "llm_chunk",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolEnd { .. } => "tool_end",
            Self::StreamEnd => "stream_end",
            Self::StreamError { .. } => "error",
        }
    }

    pub fn llm_chunk(content: impl Into<String>) -> Self {
        Self::LlmChunk {
            content: content.into(),
        }
    }

    pub fn tool_start(name: impl Into<String>, input: Value) -> Self {
        Self::ToolStart {
            name: name.into(),
            input,
        }
    }

    pub fn tool_end(name: impl Into<String>, output: Value) -> Self {
        Self::ToolEnd {
            name: name.into(),
            output,
        }
    }

    pub fn stream_error(detail: impl Into<String>) -> Self {
        Self::StreamError {
            detail: detail.into(),
        }
    }
}

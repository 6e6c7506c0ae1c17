//! Transcript state machine.
//!
//! Folds decoded stream events and controller-level failures into mutations
//! of the single active agent reply of one request.

use std::time::Duration;

use chatwire_protocol::{MessageId, StreamEvent};
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::ChatError;
use crate::outcome::{FailureKind, RequestOutcome};
use crate::transcript::{Message, MessageContent, ToolActivity, Transcript};

/// Interim agent text while a tool runs before any reply text arrived.
pub const TOOL_STATUS_TEXT: &str = "Processing with tools...";

/// Agent text for a request that completed without producing any.
pub const NO_TEXT_MARKER: &str = "Agent finished processing.";

/// Phase of the active reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPhase {
    /// No text since the request started or since the last tool finished.
    #[default]
    AwaitingFirstEvent,
    /// Reply text is arriving.
    StreamingText,
    /// A tool call is in progress.
    ToolRunning,
    /// The server signaled a graceful end.
    Completed,
    /// The request failed.
    Failed,
}

impl StreamPhase {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Per-request state bound to one agent message.
#[derive(Debug)]
pub struct TranscriptStateMachine {
    agent_id: MessageId,
    phase: StreamPhase,
    accumulated: String,
    failure: Option<(FailureKind, String)>,
    finalized: bool,
}

impl TranscriptStateMachine {
    pub fn new(agent_id: MessageId) -> Self {
        Self {
            agent_id,
            phase: StreamPhase::default(),
            accumulated: String::new(),
            failure: None,
            finalized: false,
        }
    }

    pub fn agent_id(&self) -> MessageId {
        self.agent_id
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Text accumulated since the last reset.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Apply one decoded event and return the resulting phase.
    pub fn apply(&mut self, event: StreamEvent, transcript: &mut Transcript) -> StreamPhase {
        if self.phase.is_terminal() {
            trace!(phase = ?self.phase, event_type = event.wire_type(), "ignoring event after terminal phase");
            return self.phase;
        }

        let previous = self.phase;
        self.phase = match event {
            StreamEvent::LlmChunk { content } => {
                self.accumulated.push_str(&content);
                self.set_agent_content(transcript, MessageContent::text(self.accumulated.clone()));
                StreamPhase::StreamingText
            }
            StreamEvent::ToolStart { name, input } => {
                if self.accumulated.is_empty() {
                    self.set_agent_content(transcript, MessageContent::text(TOOL_STATUS_TEXT));
                }
                transcript.push(Message::tool(ToolActivity::started(name, input)));
                StreamPhase::ToolRunning
            }
            StreamEvent::ToolEnd { name, output } => {
                self.accumulated.clear();
                transcript.push(Message::tool(ToolActivity::finished(name, output)));
                StreamPhase::AwaitingFirstEvent
            }
            StreamEvent::StreamEnd => StreamPhase::Completed,
            StreamEvent::StreamError { detail } => {
                let error = ChatError::Stream { detail };
                self.enter_failed(transcript, &error);
                StreamPhase::Failed
            }
        };

        if previous != self.phase {
            debug!(from = ?previous, to = ?self.phase, agent_id = %self.agent_id, "stream phase changed");
        }
        self.phase
    }

    /// Record a failure detected outside the event stream.
    ///
    /// Has no effect once the request is terminal: the first failure wins and
    /// a graceful end stays a success.
    pub fn fail(&mut self, transcript: &mut Transcript, error: &ChatError) -> StreamPhase {
        if self.phase.is_terminal() {
            debug!(phase = ?self.phase, %error, "failure after terminal phase ignored");
            return self.phase;
        }
        self.enter_failed(transcript, error);
        self.phase = StreamPhase::Failed;
        self.phase
    }

    /// Resolve the reply's final content and stamp its response time.
    ///
    /// # Panics
    ///
    /// Panics if called more than once for the same request.
    pub fn finalize(&mut self, transcript: &mut Transcript, elapsed: Duration) -> RequestOutcome {
        assert!(
            !self.finalized,
            "agent message {} finalized twice",
            self.agent_id
        );
        self.finalized = true;

        let Some(message) = transcript.agent_mut(self.agent_id) else {
            panic!("agent message {} missing from transcript", self.agent_id);
        };

        let trimmed = self.accumulated.trim();
        if !trimmed.is_empty() {
            message.set_content(MessageContent::text(trimmed));
        } else if message.content().is_pending() {
            message.set_content(MessageContent::text(NO_TEXT_MARKER));
        }
        message.stamp_response_time(elapsed);

        let response_time_seconds = elapsed.as_secs_f64();
        match self.failure.take() {
            Some((kind, detail)) => RequestOutcome::Failure {
                kind,
                detail,
                response_time_seconds,
            },
            None => RequestOutcome::Success {
                final_text: message.content().to_string(),
                response_time_seconds,
            },
        }
    }

    fn enter_failed(&mut self, transcript: &mut Transcript, error: &ChatError) {
        self.accumulated.clear();
        self.set_agent_content(transcript, MessageContent::text(error.user_message()));
        self.failure = Some((error.failure_kind(), error.detail()));
    }

    fn set_agent_content(&self, transcript: &mut Transcript, content: MessageContent) {
        match transcript.agent_mut(self.agent_id) {
            Some(message) => message.set_content(content),
            None => debug!(agent_id = %self.agent_id, "active agent message not found"),
        }
    }
}

//! Ordered chat transcript.

use std::fmt;
use std::time::Duration;

use chatwire_protocol::MessageId;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
    ToolActivity,
}

/// Whether a tool activity entry marks the start or the end of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPhase {
    Started,
    Finished,
}

/// Structured record of one tool event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolActivity {
    pub phase: ToolPhase,
    pub name: String,
    /// Tool input for `Started`, tool output for `Finished`.
    pub payload: Value,
}

impl ToolActivity {
    pub fn started(name: impl Into<String>, input: Value) -> Self {
        Self {
            phase: ToolPhase::Started,
            name: name.into(),
            payload: input,
        }
    }

    pub fn finished(name: impl Into<String>, output: Value) -> Self {
        Self {
            phase: ToolPhase::Finished,
            name: name.into(),
            payload: output,
        }
    }
}

impl fmt::Display for ToolActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.phase {
            ToolPhase::Started => {
                write!(f, "Tool Starting: {} with input {}", self.name, self.payload)
            }
            ToolPhase::Finished => {
                write!(f, "Tool Finished: {} - Output: {}", self.name, self.payload)
            }
        }
    }
}

/// Body of a transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MessageContent {
    /// Streaming agent reply with no content yet.
    Pending,
    Text(String),
    Tool(ToolActivity),
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for MessageContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("..."),
            Self::Text(text) => f.write_str(text),
            Self::Tool(activity) => activity.fmt(f),
        }
    }
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    id: MessageId,
    role: Role,
    content: MessageContent,
    created_at: DateTime<Utc>,
    #[serde(
        rename = "response_time_seconds",
        serialize_with = "serialize_seconds"
    )]
    response_time: Option<Duration>,
}

fn serialize_seconds<S: Serializer>(
    value: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => serializer.serialize_some(&d.as_secs_f64()),
        None => serializer.serialize_none(),
    }
}

impl Message {
    fn new(role: Role, content: MessageContent) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content,
            created_at: Utc::now(),
            response_time: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, MessageContent::text(text))
    }

    /// Placeholder for a reply that is about to stream in.
    pub fn pending_agent() -> Self {
        Self::new(Role::Agent, MessageContent::Pending)
    }

    pub fn tool(activity: ToolActivity) -> Self {
        Self::new(Role::ToolActivity, MessageContent::Tool(activity))
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &MessageContent {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Set once when an agent reply is finalized.
    pub fn response_time(&self) -> Option<Duration> {
        self.response_time
    }

    pub fn response_time_seconds(&self) -> Option<f64> {
        self.response_time.map(|d| d.as_secs_f64())
    }

    pub(crate) fn set_content(&mut self, content: MessageContent) {
        debug_assert_eq!(self.role, Role::Agent, "only agent replies are mutable");
        self.content = content;
    }

    pub(crate) fn stamp_response_time(&mut self, elapsed: Duration) {
        assert_eq!(self.role, Role::Agent, "response time on a non-agent message");
        assert!(
            self.response_time.is_none(),
            "response time already stamped on {}",
            self.id
        );
        self.response_time = Some(elapsed);
    }
}

/// Append-only sequence of messages in display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub(crate) fn push(&mut self, message: Message) -> MessageId {
        let id = message.id;
        self.messages.push(message);
        id
    }

    /// The active reply is always near the tail, so search from the back.
    pub(crate) fn agent_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .rev()
            .find(|m| m.id == id && m.role == Role::Agent)
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

//! Chatwire Protocol - Wire types shared by the client and the agent endpoint.
//!
//! The agent answers a single [`ChatRequest`] with a stream of frames, each
//! carrying one JSON-encoded [`StreamEvent`].

pub mod error_body;
pub mod events;
pub mod message_id;
pub mod request;

pub use error_body::{ErrorBody, MISSING_DETAIL, UNPARSEABLE_DETAIL};
pub use events::{StreamEvent, TYPE_FIELD};
pub use message_id::MessageId;
pub use request::{ChatRequest, EVENT_STREAM_MEDIA_TYPE};

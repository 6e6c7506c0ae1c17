//! Transport seam between the controller and the agent endpoint.
//!
//! A transport opens one request and hands back the initial status plus a
//! lazy, finite sequence of text fragments. Fragments carry no framing
//! guarantees; the decoder reassembles frames.

mod http;

pub use http::HttpTransport;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use chatwire_protocol::ChatRequest;
use futures::{Stream, StreamExt};
use tracing::trace;

use crate::error::{ChatError, Result};
use crate::utf8::Utf8StreamBuffer;

/// Stream of text fragments. Ends when the body is exhausted; an `Err` item
/// means the connection failed mid-stream.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Initial response of an opened request.
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Non-success responses carry the raw error body as fragments too.
    /// `None` when the server sent no body.
    pub body: Option<FragmentStream>,
}

impl TransportResponse {
    pub fn new(status: u16, body: Option<FragmentStream>) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Collect the whole body into one string; used for error bodies only.
    pub async fn into_text(self) -> Result<String> {
        let Some(mut body) = self.body else {
            return Ok(String::new());
        };
        let mut text = String::new();
        while let Some(fragment) = body.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Opens chat requests against an agent endpoint.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send `request` and return once the response status is known.
    ///
    /// Connection failures are reported as [`ChatError::Transport`].
    async fn open(&self, request: &ChatRequest) -> Result<TransportResponse>;
}

struct FragmentState<S> {
    bytes: Pin<Box<S>>,
    utf8: Utf8StreamBuffer,
    endpoint: String,
    done: bool,
}

/// Adapt a raw byte stream into UTF-8 text fragments.
///
/// Multi-byte characters split across chunks are held back until complete;
/// chunks that decode to nothing are skipped.
pub fn text_fragments<S, E>(bytes: S, endpoint: impl Into<String>) -> FragmentStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = FragmentState {
        bytes: Box::pin(bytes),
        utf8: Utf8StreamBuffer::new(),
        endpoint: endpoint.into(),
        done: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        loop {
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    trace!(bytes = chunk.len(), "body chunk");
                    let text = state.utf8.push(&chunk);
                    if !text.is_empty() {
                        return Some((Ok(text), state));
                    }
                }
                Some(Err(e)) => {
                    state.done = true;
                    let error = ChatError::transport(format!(
                        "stream from {} failed: {e}",
                        state.endpoint
                    ));
                    return Some((Err(error), state));
                }
                None => {
                    state.done = true;
                    let tail = state.utf8.flush();
                    if tail.is_empty() {
                        return None;
                    }
                    return Some((Ok(tail), state));
                }
            }
        }
    }))
}

//! In-memory transport for controller tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chatwire_protocol::{ChatRequest, StreamEvent};
use futures::StreamExt;

use crate::error::{ChatError, Result};
use crate::transport::{ChatTransport, FragmentStream, TransportResponse};

/// Encode `event` as one wire frame.
pub(crate) fn frame(event: &StreamEvent) -> String {
    format!(
        "data: {}\n\n",
        serde_json::to_string(event).expect("serialize event")
    )
}

#[derive(Debug, Clone)]
enum Ending {
    Close,
    Fail(String),
    Stall,
}

#[derive(Debug, Clone)]
enum Script {
    Body {
        status: u16,
        fragments: Vec<String>,
        ending: Ending,
    },
    NoBody {
        status: u16,
    },
    Refuse(String),
}

/// Answers each request with the next scripted response, repeating the last
/// one once the rest are used up, and records what was sent.
#[derive(Debug)]
pub(crate) struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    fn with_script(script: Script) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::from([script])),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue `next`'s responses after this transport's.
    pub(crate) fn then(self, next: ScriptedTransport) -> Self {
        let mut scripts = self.scripts.into_inner().expect("scripts lock");
        scripts.extend(next.scripts.into_inner().expect("scripts lock"));
        Self {
            scripts: Mutex::new(scripts),
            requests: self.requests,
        }
    }

    fn next_script(&self) -> Script {
        let mut scripts = self.scripts.lock().expect("scripts lock");
        if scripts.len() > 1 {
            scripts.pop_front().expect("queued script")
        } else {
            scripts.front().cloned().expect("queued script")
        }
    }

    /// 200 response delivering `fragments`, then closing.
    pub(crate) fn streaming<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_script(Script::Body {
            status: 200,
            fragments: fragments.into_iter().map(Into::into).collect(),
            ending: Ending::Close,
        })
    }

    /// 200 response delivering `events` as one frame each, then closing.
    pub(crate) fn events(events: &[StreamEvent]) -> Self {
        Self::streaming(events.iter().map(frame))
    }

    /// 200 response delivering `fragments`, then failing with `message`.
    pub(crate) fn failing_after<I, S>(fragments: I, message: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_script(Script::Body {
            status: 200,
            fragments: fragments.into_iter().map(Into::into).collect(),
            ending: Ending::Fail(message.to_string()),
        })
    }

    /// 200 response delivering `fragments`, then never producing more.
    pub(crate) fn stalling_after<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_script(Script::Body {
            status: 200,
            fragments: fragments.into_iter().map(Into::into).collect(),
            ending: Ending::Stall,
        })
    }

    /// Response with `status` and a raw body.
    pub(crate) fn status(status: u16, body: &str) -> Self {
        Self::with_script(Script::Body {
            status,
            fragments: vec![body.to_string()],
            ending: Ending::Close,
        })
    }

    /// Response with `status` and no body.
    pub(crate) fn no_body(status: u16) -> Self {
        Self::with_script(Script::NoBody { status })
    }

    /// Connection refused.
    pub(crate) fn refusing(message: &str) -> Self {
        Self::with_script(Script::Refuse(message.to_string()))
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn open(&self, request: &ChatRequest) -> Result<TransportResponse> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());

        match self.next_script() {
            Script::Refuse(message) => Err(ChatError::transport(message)),
            Script::NoBody { status } => Ok(TransportResponse::new(status, None)),
            Script::Body {
                status,
                fragments,
                ending,
            } => {
                let head = futures::stream::iter(fragments.into_iter().map(Ok));
                let body: FragmentStream = match ending {
                    Ending::Close => Box::pin(head),
                    Ending::Fail(message) => Box::pin(head.chain(futures::stream::once(
                        async move { Err(ChatError::transport(message)) },
                    ))),
                    Ending::Stall => Box::pin(head.chain(futures::stream::pending())),
                };
                Ok(TransportResponse::new(status, Some(body)))
            }
        }
    }
}

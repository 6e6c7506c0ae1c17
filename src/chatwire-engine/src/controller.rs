//! Request/response cycle driver.
//!
//! The controller appends the user message and a pending agent reply, opens
//! the transport, pipes fragments through the decoder into the state machine
//! and finalizes the reply exactly once, whichever way the request ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chatwire_protocol::{ChatRequest, ErrorBody, MessageId};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::decoder::StreamEventDecoder;
use crate::error::{ChatError, Result};
use crate::outcome::RequestOutcome;
use crate::state_machine::TranscriptStateMachine;
use crate::transcript::{Message, Transcript};
use crate::transport::{ChatTransport, TransportResponse};

/// Why a submission was not started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Empty or whitespace-only input.
    EmptyInput,
    /// Another request is still streaming.
    InFlight,
}

/// Result of [`TranscriptController::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitResult {
    /// Nothing was sent and the transcript is unchanged.
    Rejected(RejectReason),
    /// The request ran to an end, successful or not.
    Completed(RequestOutcome),
}

impl SubmitResult {
    pub fn outcome(&self) -> Option<&RequestOutcome> {
        match self {
            Self::Completed(outcome) => Some(outcome),
            Self::Rejected(_) => None,
        }
    }
}

struct ActiveRequest {
    agent_id: MessageId,
    cancel: CancellationToken,
}

/// Owns the transcript and runs one request at a time against a transport.
pub struct TranscriptController<T> {
    transport: T,
    /// Holds the transcript itself; receivers borrow it in place.
    transcript: watch::Sender<Transcript>,
    in_flight: AtomicBool,
    active: Mutex<Option<ActiveRequest>>,
    idle_timeout: Option<Duration>,
}

impl<T: ChatTransport> TranscriptController<T> {
    pub fn new(transport: T) -> Self {
        let (transcript, _) = watch::channel(Transcript::new());
        Self {
            transport,
            transcript,
            in_flight: AtomicBool::new(false),
            active: Mutex::new(None),
            idle_timeout: None,
        }
    }

    /// Fail a stream that delivers nothing for `timeout`. Off by default.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Snapshot of the current transcript.
    pub fn transcript(&self) -> Transcript {
        self.transcript.borrow().clone()
    }

    /// Receiver notified after every transcript update.
    ///
    /// Borrow guards block the controller, so hold them only briefly.
    pub fn subscribe(&self) -> watch::Receiver<Transcript> {
        self.transcript.subscribe()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Agent message of the request currently streaming.
    pub fn active_message(&self) -> Option<MessageId> {
        self.lock_active().as_ref().map(|a| a.agent_id)
    }

    /// Abort the request in flight. Returns whether there was one.
    pub fn cancel(&self) -> bool {
        match self.lock_active().as_ref() {
            Some(active) => {
                info!(agent_id = %active.agent_id, "Cancelling request");
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Send `text` and stream the reply into the transcript.
    ///
    /// Never fails: every error ends up as the agent reply's content and in
    /// the returned outcome.
    pub async fn submit(&self, text: &str) -> SubmitResult {
        if text.trim().is_empty() {
            debug!("Ignoring empty submission");
            return SubmitResult::Rejected(RejectReason::EmptyInput);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Ignoring submission while a request is in flight");
            return SubmitResult::Rejected(RejectReason::InFlight);
        }

        let started = Instant::now();
        let agent_id = self.update(|transcript| {
            transcript.push(Message::user(text));
            transcript.push(Message::pending_agent())
        });
        let cancel = CancellationToken::new();
        *self.lock_active() = Some(ActiveRequest {
            agent_id,
            cancel: cancel.clone(),
        });

        let mut request = InFlightRequest {
            controller: self,
            machine: TranscriptStateMachine::new(agent_id),
            started,
        };
        info!(agent_id = %agent_id, text_len = text.len(), "Request started");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ChatError::Cancelled),
            result = self.drive(&mut request.machine, text) => result,
        };

        let outcome = request.complete(result.err());
        match &outcome {
            RequestOutcome::Success {
                response_time_seconds,
                ..
            } => info!(agent_id = %agent_id, response_time_seconds, "Request completed"),
            RequestOutcome::Failure {
                kind,
                detail,
                response_time_seconds,
            } => warn!(agent_id = %agent_id, ?kind, detail = %detail, response_time_seconds, "Request failed"),
        }
        SubmitResult::Completed(outcome)
    }

    async fn drive(&self, machine: &mut TranscriptStateMachine, text: &str) -> Result<()> {
        let response = self.transport.open(&ChatRequest::new(text)).await?;

        if !response.is_success() {
            return Err(http_error(response).await);
        }
        let Some(mut body) = response.body else {
            return Err(ChatError::EmptyBody);
        };

        let mut decoder = StreamEventDecoder::new();
        loop {
            let next = match self.idle_timeout {
                Some(limit) => tokio::time::timeout(limit, body.next())
                    .await
                    .map_err(|_| {
                        ChatError::transport(format!("no data received for {limit:?}"))
                    })?,
                None => body.next().await,
            };
            let Some(fragment) = next else {
                break;
            };
            let fragment = fragment.inspect_err(|e| error!(error = %e, "Stream failed"))?;

            for event in decoder.feed(&fragment) {
                self.update(|transcript| machine.apply(event, transcript));
            }
        }

        for event in decoder.finish() {
            self.update(|transcript| machine.apply(event, transcript));
        }
        debug!(stats = ?decoder.stats(), phase = ?machine.phase(), "Stream closed");
        Ok(())
    }

    /// Apply one mutation in place and notify subscribers.
    fn update<R>(&self, f: impl FnOnce(&mut Transcript) -> R) -> R {
        let mut output = None;
        self.transcript
            .send_modify(|transcript| output = Some(f(transcript)));
        output.unwrap_or_else(|| unreachable!("send_modify runs the closure"))
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveRequest>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn http_error(response: TransportResponse) -> ChatError {
    let status = response.status;
    let body = response.into_text().await.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to read error body");
        String::new()
    });
    let detail = ErrorBody::detail_from_body(&body);
    error!(status, detail = %detail, "Request rejected");
    ChatError::Http { status, detail }
}

/// Marks the request in flight until dropped.
///
/// Dropping it before [`InFlightRequest::complete`] ran finalizes the reply as
/// cancelled, so a submit future dropped mid-stream never leaves a pending
/// reply or a stuck in-flight flag behind.
struct InFlightRequest<'a, T: ChatTransport> {
    controller: &'a TranscriptController<T>,
    machine: TranscriptStateMachine,
    started: Instant,
}

impl<T: ChatTransport> InFlightRequest<'_, T> {
    fn complete(&mut self, error: Option<ChatError>) -> RequestOutcome {
        let elapsed = self.started.elapsed();
        let machine = &mut self.machine;
        self.controller.update(|transcript| {
            if let Some(error) = &error {
                machine.fail(transcript, error);
            }
            machine.finalize(transcript, elapsed)
        })
    }
}

impl<T: ChatTransport> Drop for InFlightRequest<'_, T> {
    fn drop(&mut self) {
        if !self.machine.is_finalized() {
            warn!(agent_id = %self.machine.agent_id(), "Request dropped before completion");
            self.complete(Some(ChatError::Cancelled));
        }
        *self.controller.lock_active() = None;
        self.controller.in_flight.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::error::{CANCELLED_TEXT, EMPTY_BODY_TEXT, TRANSPORT_FAILURE_TEXT};
    use crate::outcome::FailureKind;
    use crate::state_machine::{NO_TEXT_MARKER, TOOL_STATUS_TEXT};
    use crate::testing::{ScriptedTransport, frame};
    use crate::transcript::{MessageContent, Role};
    use crate::transport::HttpTransport;
    use chatwire_protocol::StreamEvent;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rendered(transcript: &Transcript) -> Vec<(Role, String)> {
        transcript
            .iter()
            .map(|m| (m.role(), m.content().to_string()))
            .collect()
    }

    fn completed(result: SubmitResult) -> RequestOutcome {
        match result {
            SubmitResult::Completed(outcome) => outcome,
            other => panic!("expected completion, got {other:?}"),
        }
    }

    async fn wait_for_active(controller: &TranscriptController<impl ChatTransport>) {
        while controller.active_message().is_none() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_end_to_end_over_http() {
        let server = MockServer::start().await;
        let sse = [
            StreamEvent::llm_chunk("4"),
            StreamEvent::StreamEnd,
        ]
        .iter()
        .map(frame)
        .collect::<String>();
        Mock::given(method("POST"))
            .and(path("/chat/stream"))
            .and(body_json(json!({ "text": "2+2?" })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let transport =
            HttpTransport::new(format!("{}/chat/stream", server.uri())).expect("transport");
        let controller = TranscriptController::new(transport);

        let outcome = completed(controller.submit("2+2?").await);

        assert!(outcome.is_success());
        let transcript = controller.transcript();
        assert_eq!(
            rendered(&transcript),
            vec![(Role::User, "2+2?".into()), (Role::Agent, "4".into())]
        );
        let agent = transcript.last().expect("agent");
        assert!(agent.response_time().is_some());
        assert!(!controller.is_in_flight());
        assert_eq!(controller.active_message(), None);
    }

    #[tokio::test]
    async fn test_http_error_detail_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_raw(r#"{"detail": "rate limited"}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let transport =
            HttpTransport::new(format!("{}/chat/stream", server.uri())).expect("transport");
        let controller = TranscriptController::new(transport);

        let outcome = completed(controller.submit("x").await);

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Http { status: 429 }));
        let transcript = controller.transcript();
        let agent = transcript.last().expect("agent");
        assert_eq!(agent.content(), &MessageContent::text("Error: rate limited"));
        assert!(agent.response_time().is_some());
    }

    #[tokio::test]
    async fn test_http_error_body_variants() {
        let cases = [
            ("{}", "Error: Failed to get response"),
            ("Internal Server Error", "Error: Failed to parse error JSON."),
        ];
        for (body, expected) in cases {
            let controller = TranscriptController::new(ScriptedTransport::status(500, body));
            completed(controller.submit("hi").await);
            assert_eq!(
                controller.transcript().last().map(|m| m.content().to_string()),
                Some(expected.to_string())
            );
        }
    }

    #[tokio::test]
    async fn test_tool_round_trip() {
        let controller = TranscriptController::new(ScriptedTransport::events(&[
            StreamEvent::tool_start("add", json!({"x": 2, "y": 2})),
            StreamEvent::tool_end("add", json!(4)),
            StreamEvent::llm_chunk("The answer is 4."),
            StreamEvent::StreamEnd,
        ]));

        let outcome = completed(controller.submit("2+2?").await);

        assert_eq!(
            outcome,
            RequestOutcome::Success {
                final_text: "The answer is 4.".into(),
                response_time_seconds: outcome.response_time_seconds(),
            }
        );
        assert_eq!(
            rendered(&controller.transcript()),
            vec![
                (Role::User, "2+2?".into()),
                (Role::Agent, "The answer is 4.".into()),
                (
                    Role::ToolActivity,
                    r#"Tool Starting: add with input {"x":2,"y":2}"#.into()
                ),
                (Role::ToolActivity, "Tool Finished: add - Output: 4".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_frames_split_across_fragments() {
        let whole = frame(&StreamEvent::llm_chunk("Hello")) + &frame(&StreamEvent::StreamEnd);
        let (a, b) = whole.split_at(9);
        let controller = TranscriptController::new(ScriptedTransport::streaming([a, b]));

        let outcome = completed(controller.submit("hi").await);
        assert_eq!(
            outcome,
            RequestOutcome::Success {
                final_text: "Hello".into(),
                response_time_seconds: outcome.response_time_seconds(),
            }
        );
    }

    #[tokio::test]
    async fn test_request_body_is_sent_verbatim() {
        let controller = TranscriptController::new(ScriptedTransport::events(&[
            StreamEvent::StreamEnd,
        ]));
        completed(controller.submit("  what's up?  ").await);
        assert_eq!(
            controller.transport().requests(),
            vec![ChatRequest::new("  what's up?  ")]
        );
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let controller = TranscriptController::new(ScriptedTransport::events(&[]));
        assert_eq!(
            controller.submit("   \n").await,
            SubmitResult::Rejected(RejectReason::EmptyInput)
        );
        assert!(controller.transcript().is_empty());
        assert!(controller.transport().requests().is_empty());
    }

    #[tokio::test]
    async fn test_second_submit_while_in_flight_is_rejected() {
        let controller = Arc::new(TranscriptController::new(
            ScriptedTransport::stalling_after([frame(&StreamEvent::llm_chunk("thinking"))]),
        ));

        let first = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.submit("one").await }
        });
        wait_for_active(&controller).await;
        assert!(controller.is_in_flight());

        assert_eq!(
            controller.submit("two").await,
            SubmitResult::Rejected(RejectReason::InFlight)
        );
        assert_eq!(controller.transcript().len(), 2);

        assert!(controller.cancel());
        let outcome = completed(first.await.expect("join"));
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Cancelled));
        assert_eq!(
            controller.transcript().last().map(|m| m.content().to_string()),
            Some(CANCELLED_TEXT.to_string())
        );
        assert!(!controller.is_in_flight());
        assert!(!controller.cancel());
    }

    #[tokio::test]
    async fn test_dropped_submit_finalizes_as_cancelled() {
        let controller = TranscriptController::new(
            ScriptedTransport::stalling_after([frame(&StreamEvent::llm_chunk("partial"))])
                .then(ScriptedTransport::events(&[
                    StreamEvent::llm_chunk("fresh"),
                    StreamEvent::StreamEnd,
                ])),
        );

        let timed_out = tokio::time::timeout(Duration::from_millis(50), controller.submit("hi"))
            .await
            .is_err();
        assert!(timed_out);

        let transcript = controller.transcript();
        let agent = transcript.last().expect("agent");
        assert_eq!(agent.content(), &MessageContent::text(CANCELLED_TEXT));
        assert!(agent.response_time().is_some());
        assert!(!controller.is_in_flight());

        // Controller accepts new work afterwards
        let outcome = completed(controller.submit("again").await);
        assert!(outcome.is_success());
        assert_eq!(
            controller.transcript().last().map(|m| m.content().to_string()),
            Some("fresh".to_string())
        );
        assert_eq!(controller.transport().requests().len(), 2);
    }

    #[tokio::test]
    async fn test_transport_failure_mid_stream() {
        let controller = TranscriptController::new(ScriptedTransport::failing_after(
            [frame(&StreamEvent::llm_chunk("half an ans"))],
            "connection reset",
        ));

        let outcome = completed(controller.submit("hi").await);
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Transport));
        assert_eq!(
            controller.transcript().last().map(|m| m.content().to_string()),
            Some(TRANSPORT_FAILURE_TEXT.to_string())
        );
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let controller = TranscriptController::new(ScriptedTransport::refusing("refused"));
        let outcome = completed(controller.submit("hi").await);
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Transport));
        assert_eq!(
            rendered(&controller.transcript()),
            vec![
                (Role::User, "hi".into()),
                (Role::Agent, TRANSPORT_FAILURE_TEXT.into())
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_body() {
        let controller = TranscriptController::new(ScriptedTransport::no_body(200));
        let outcome = completed(controller.submit("hi").await);
        assert_eq!(outcome.failure_kind(), Some(FailureKind::EmptyBody));
        assert_eq!(
            controller.transcript().last().map(|m| m.content().to_string()),
            Some(EMPTY_BODY_TEXT.to_string())
        );
    }

    #[tokio::test]
    async fn test_stream_error_event() {
        let controller = TranscriptController::new(ScriptedTransport::events(&[
            StreamEvent::llm_chunk("partial"),
            StreamEvent::stream_error("tool crashed"),
            StreamEvent::llm_chunk("ignored"),
        ]));
        let outcome = completed(controller.submit("hi").await);
        assert_eq!(
            outcome,
            RequestOutcome::Failure {
                kind: FailureKind::Stream,
                detail: "tool crashed".into(),
                response_time_seconds: outcome.response_time_seconds(),
            }
        );
        assert_eq!(
            controller.transcript().last().map(|m| m.content().to_string()),
            Some("Stream Error: tool crashed".to_string())
        );
    }

    #[tokio::test]
    async fn test_close_without_events_uses_marker() {
        let controller = TranscriptController::new(ScriptedTransport::streaming([
            ": keep-alive\n\n",
            "data: {\"type\": \"future_event\"}\n\n",
        ]));
        let outcome = completed(controller.submit("hi").await);
        assert!(outcome.is_success());
        assert_eq!(
            controller.transcript().last().map(|m| m.content().to_string()),
            Some(NO_TEXT_MARKER.to_string())
        );
    }

    #[tokio::test]
    async fn test_tool_without_text_keeps_status() {
        let controller = TranscriptController::new(ScriptedTransport::events(&[
            StreamEvent::tool_start("noop", json!(null)),
            StreamEvent::tool_end("noop", json!(null)),
            StreamEvent::StreamEnd,
        ]));
        completed(controller.submit("hi").await);
        let transcript = controller.transcript();
        assert_eq!(
            transcript.messages()[1].content().to_string(),
            TOOL_STATUS_TEXT
        );
    }

    #[tokio::test]
    async fn test_idle_timeout_fails_stalled_stream() {
        let controller = TranscriptController::new(ScriptedTransport::stalling_after([frame(
            &StreamEvent::llm_chunk("slow"),
        )]))
        .with_idle_timeout(Some(Duration::from_millis(20)));

        let outcome = completed(controller.submit("hi").await);
        assert_eq!(
            outcome,
            RequestOutcome::Failure {
                kind: FailureKind::Transport,
                detail: "no data received for 20ms".into(),
                response_time_seconds: outcome.response_time_seconds(),
            }
        );
    }

    #[tokio::test]
    async fn test_subscribers_see_streaming_updates() {
        let controller = TranscriptController::new(ScriptedTransport::events(&[
            StreamEvent::llm_chunk("4"),
            StreamEvent::StreamEnd,
        ]));
        let mut rx = controller.subscribe();

        completed(controller.submit("2+2?").await);

        assert!(rx.has_changed().expect("sender alive"));
        let latest = rx.borrow_and_update().clone();
        assert_eq!(latest, controller.transcript());
    }

    #[test]
    fn test_update_mutates_shared_transcript_in_place() {
        let controller = TranscriptController::new(ScriptedTransport::events(&[]));
        let mut rx = controller.subscribe();

        let id = controller.update(|transcript| transcript.push(Message::user("hi")));

        assert!(rx.has_changed().expect("sender alive"));
        assert_eq!(rx.borrow_and_update().get(id).map(Message::role), Some(Role::User));
        assert!(!rx.has_changed().expect("sender alive"));

        controller.update(|transcript| transcript.push(Message::pending_agent()));
        assert!(rx.has_changed().expect("sender alive"));
        assert_eq!(rx.borrow().len(), 2);
        assert_eq!(controller.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_successive_requests_append() {
        let controller = TranscriptController::new(ScriptedTransport::events(&[
            StreamEvent::llm_chunk("ok"),
            StreamEvent::StreamEnd,
        ]));
        completed(controller.submit("first").await);
        completed(controller.submit("second").await);

        let transcript = controller.transcript();
        assert_eq!(transcript.len(), 4);
        assert_eq!(
            transcript
                .iter()
                .filter(|m| m.response_time().is_some())
                .count(),
            2
        );
    }
}

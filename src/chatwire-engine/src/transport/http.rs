//! HTTP transport over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use chatwire_protocol::{ChatRequest, EVENT_STREAM_MEDIA_TYPE};
use reqwest::{Client, StatusCode, Url, header};
use tracing::{debug, error};

use super::{ChatTransport, TransportResponse, text_fragments};
use crate::config::ChatwireConfig;
use crate::error::{ChatError, Result};

/// Idle pooled connections are dropped after this long.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// POSTs each request to a fixed endpoint and streams the response body.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
}

impl HttpTransport {
    /// Build a transport from validated configuration.
    ///
    /// No overall request timeout is set: replies stream for as long as the
    /// agent keeps producing them.
    pub fn from_config(config: &ChatwireConfig) -> Result<Self> {
        let endpoint = config.endpoint_url()?;
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout())
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ChatError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, endpoint })
    }

    /// Transport with default settings for `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::from_config(&ChatwireConfig {
            endpoint: endpoint.into(),
            ..Default::default()
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<TransportResponse> {
        let endpoint = self.endpoint.as_str();
        debug!(endpoint, text_len = request.text.len(), "Opening chat stream");

        let resp = self
            .client
            .post(self.endpoint.clone())
            .header(header::ACCEPT, EVENT_STREAM_MEDIA_TYPE)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, endpoint, "Failed to send request");
                ChatError::from_reqwest(e, endpoint)
            })?;

        let status = resp.status();
        debug!(status = %status, content_length = ?resp.content_length(), "Response received");

        let has_body = !matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT)
            && resp.content_length() != Some(0);
        let body = has_body.then(|| text_fragments(resp.bytes_stream(), endpoint));

        Ok(TransportResponse::new(status.as_u16(), body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use wiremock::matchers::{body_json, header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn transport_for(server: &MockServer) -> HttpTransport {
        HttpTransport::new(format!("{}/chat/stream", server.uri())).expect("transport")
    }

    #[tokio::test]
    async fn test_posts_json_and_streams_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/stream"))
            .and(header_matcher("accept", EVENT_STREAM_MEDIA_TYPE))
            .and(header_matcher("content-type", "application/json"))
            .and(body_json(serde_json::json!({ "text": "2+2?" })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "data: {\"type\": \"stream_end\"}\n\n",
                EVENT_STREAM_MEDIA_TYPE,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport_for(&server).await;
        let response = transport
            .open(&ChatRequest::new("2+2?"))
            .await
            .expect("open");
        assert!(response.is_success());

        let mut body = response.body.expect("body");
        let mut text = String::new();
        while let Some(fragment) = body.next().await {
            text.push_str(&fragment.expect("fragment"));
        }
        assert_eq!(text, "data: {\"type\": \"stream_end\"}\n\n");
    }

    #[tokio::test]
    async fn test_error_status_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_raw("{\"detail\": \"rate limited\"}", "application/json"),
            )
            .mount(&server)
            .await;

        let response = transport_for(&server)
            .await
            .open(&ChatRequest::new("hi"))
            .await
            .expect("open");
        assert_eq!(response.status, 429);
        assert_eq!(
            response.into_text().await.expect("text"),
            "{\"detail\": \"rate limited\"}"
        );
    }

    #[tokio::test]
    async fn test_no_content_has_no_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let response = transport_for(&server)
            .await
            .open(&ChatRequest::new("hi"))
            .await
            .expect("open");
        assert!(response.is_success());
        assert!(response.body.is_none());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Reserve a free port, then release it so nothing is listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let transport =
            HttpTransport::new(format!("http://127.0.0.1:{port}/chat/stream")).expect("transport");
        let err = transport
            .open(&ChatRequest::new("hi"))
            .await
            .expect_err("closed port");
        assert!(matches!(err, ChatError::Transport { .. }));
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        assert!(matches!(
            HttpTransport::new("not a url"),
            Err(ChatError::InvalidConfig { .. })
        ));
    }
}

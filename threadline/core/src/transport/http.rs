//! HTTP Transport
//!
//! Talks to the chat service over HTTP and hands the response body to the
//! frame decoder.
//!
//! # Endpoints
//!
//! - `POST {base}/api/v1/chat/stream` - send a turn, SSE response
//! - `GET {base}/api/v1/threads/{id}/replay` - persisted feed, 404 when empty
//!
//! Every request carries the `X-User-Id` header.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tracing::{debug, info};

use super::traits::{ChatRequest, ChatTransport, TransportError};
use crate::config::ThreadlineConfig;
use crate::sse::{decode_stream, FrameStream, DEFAULT_MAX_FRAME_BYTES};

/// Header carrying the static user identity
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Longest error body kept in [`TransportError::Status`]
const MAX_ERROR_BODY: usize = 512;

/// HTTP chat transport
#[derive(Clone)]
pub struct HttpTransport {
    /// Service root, without trailing slash
    base_url: String,
    /// Value of the `X-User-Id` header
    user_id: String,
    /// Bound for the replay request (live streams are unbounded)
    request_timeout: Duration,
    /// Decoder frame limit
    max_frame_bytes: usize,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with default timeouts
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] if `base_url` does not parse,
    /// or [`TransportError::InvalidRequest`] if the client cannot be built.
    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> Result<Self, TransportError> {
        Self::build(
            base_url.into(),
            user_id.into(),
            Duration::from_secs(30),
            Duration::from_secs(10),
            DEFAULT_MAX_FRAME_BYTES,
        )
    }

    /// Create a transport from loaded configuration
    ///
    /// # Errors
    ///
    /// Same as [`HttpTransport::new`].
    pub fn from_config(config: &ThreadlineConfig) -> Result<Self, TransportError> {
        Self::build(
            config.base_url.clone(),
            config.user_id.clone(),
            config.request_timeout,
            config.connect_timeout,
            config.max_frame_bytes,
        )
    }

    fn build(
        base_url: String,
        user_id: String,
        request_timeout: Duration,
        connect_timeout: Duration,
        max_frame_bytes: usize,
    ) -> Result<Self, TransportError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| TransportError::InvalidUrl(format!("{base_url}: {e}")))?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            base_url,
            user_id,
            request_timeout,
            max_frame_bytes,
            http_client,
        })
    }

    /// Service root
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn stream_url(&self) -> String {
        format!("{}/api/v1/chat/stream", self.base_url)
    }

    /// Replay endpoint, with the thread id as one encoded path segment
    fn replay_url(&self, thread_id: &str) -> Result<Url, TransportError> {
        let invalid = || TransportError::InvalidUrl(self.base_url.clone());
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .extend(["api", "v1", "threads", thread_id, "replay"]);
        Ok(url)
    }

    fn frames(&self, response: reqwest::Response) -> FrameStream {
        decode_stream(Box::pin(response.bytes_stream()), self.max_frame_bytes)
    }
}

async fn status_error(response: reqwest::Response) -> TransportError {
    let status = response.status().as_u16();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    TransportError::Status { status, body }
}

fn connection_error(error: &reqwest::Error) -> TransportError {
    if error.is_builder() {
        TransportError::InvalidRequest(error.to_string())
    } else {
        TransportError::ConnectionFailed(error.to_string())
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<FrameStream, TransportError> {
        debug!(
            thread_id = %request.thread_id,
            messages = request.messages.len(),
            "sending chat request"
        );

        let response = self
            .http_client
            .post(self.stream_url())
            .header(USER_ID_HEADER, &self.user_id)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| connection_error(&e))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        Ok(self.frames(response))
    }

    async fn replay(&self, thread_id: &str) -> Result<Option<FrameStream>, TransportError> {
        let url = self.replay_url(thread_id)?;
        let response = self
            .http_client
            .get(url)
            .header(USER_ID_HEADER, &self.user_id)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| connection_error(&e))?;

        if response.status() == StatusCode::NOT_FOUND {
            info!(thread_id, "thread has no history");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        Ok(Some(self.frames(response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_strip_trailing_slash() {
        let transport = HttpTransport::new("http://localhost:8000/", "u1").unwrap();
        assert_eq!(transport.base_url(), "http://localhost:8000");
        assert_eq!(
            transport.stream_url(),
            "http://localhost:8000/api/v1/chat/stream"
        );
        assert_eq!(
            transport.replay_url("t-1").unwrap().as_str(),
            "http://localhost:8000/api/v1/threads/t-1/replay"
        );
    }

    #[test]
    fn test_replay_url_encodes_thread_id() {
        let transport = HttpTransport::new("http://localhost:8000/svc/", "u1").unwrap();
        assert_eq!(
            transport.replay_url("a/b c?d").unwrap().as_str(),
            "http://localhost:8000/svc/api/v1/threads/a%2Fb%20c%3Fd/replay"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let err = HttpTransport::new("not a url", "u1").err().unwrap();
        assert!(matches!(err, TransportError::InvalidUrl(_)));
    }
}

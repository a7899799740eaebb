//! The pluggable HTTP request executor.
//!
//! The protocol client does not talk HTTP directly; it hands a framed JSON
//! batch to an [`HttpTransport`] and gets back a status and body. That seam
//! is what makes the whole client testable without a live server: the
//! integration tests drive it with a scripted fake, and callers can inject
//! anything that satisfies the trait (an instrumented client, a proxy-aware
//! one, a recorder).
//!
//! [`ReqwestTransport`] is the default implementation, POSTing every batch
//! to a single server endpoint with JSON content-type and accept headers.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use thiserror::Error;
use url::Url;

/// A response from the transport: the HTTP status and the raw body.
///
/// Body parsing happens above the transport so that non-200 responses can
/// be reported with their body intact.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The raw response body.
    pub body: Bytes,
}

/// Problem while executing a request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP request itself failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The request did not complete within its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The request was cancelled before it completed.
    #[error("request cancelled")]
    Cancelled,
}

/// Executes one framed request batch against the server.
///
/// Implementations take the already-encoded JSON body of a `POST` and
/// return the response status and body, or a [`TransportError`]. The
/// optional `timeout` is a deadline for the whole call; the protocol client
/// sets it from server advice on `/meta/connect` polls.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST `body` to the server and return the raw response.
    async fn post(
        &self,
        body: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Result<TransportResponse, TransportError>;
}

/// The default transport: a [`reqwest::Client`] POSTing to one endpoint.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    endpoint: Url,
}

impl ReqwestTransport {
    /// A transport targeting `endpoint` with a default `reqwest` client.
    pub fn new(endpoint: Url) -> Self {
        Self::with_client(endpoint, reqwest::Client::new())
    }

    /// A transport targeting `endpoint` with a caller-supplied client, for
    /// connection pools, proxies, or TLS configuration the default lacks.
    pub fn with_client(endpoint: Url, http: reqwest::Client) -> Self {
        Self { http, endpoint }
    }

    /// The endpoint every batch is POSTed to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(
        &self,
        body: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Result<TransportResponse, TransportError> {
        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(http::header::ACCEPT, "application/json")
            .body(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(timeout.unwrap_or_default())
            } else {
                TransportError::Http(e)
            }
        })?;

        let status = response.status();
        let body = response.bytes().await?;
        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reqwest_transport_remembers_its_endpoint() {
        let endpoint = Url::parse("https://example.com/cometd").unwrap();
        let transport = ReqwestTransport::new(endpoint.clone());
        assert_eq!(transport.endpoint(), &endpoint);
    }

    #[test]
    fn transport_errors_render_their_kind() {
        let timeout = TransportError::Timeout(Duration::from_secs(30));
        assert!(timeout.to_string().contains("timed out"));
        assert_eq!(TransportError::Cancelled.to_string(), "request cancelled");
    }
}

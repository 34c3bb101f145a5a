//! HTTP transport for the messages endpoint.
//!
//! [`Transport`] is the seam between request building and the network. The
//! default [`HttpTransport`] posts JSON to `{base_url}/v1/messages`; tests and
//! alternative backends supply their own implementation through
//! [`Client::with_transport`](crate::Client::with_transport).
//!
//! Status mapping:
//!
//! | Response                    | Error                          |
//! |-----------------------------|--------------------------------|
//! | 401, 403                    | [`Error::InvalidCredentials`]  |
//! | other non-2xx               | [`Error::Api`]                 |
//! | 2xx with undecodable body   | [`Error::MalformedResponse`]   |
//! | connect / read failure      | [`Error::Http`]                |
//! | request timeout             | [`Error::Timeout`]             |

use crate::sse::{ByteStream, body_stream};
use crate::types::{AgentOptions, MessageResponse, MessagesRequest};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Protocol version header sent with every request
pub const API_VERSION: &str = "2023-06-01";

/// Sends requests to the messages endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a non-streaming request and decode the full response.
    async fn send(&self, request: &MessagesRequest) -> Result<MessageResponse>;

    /// Send a streaming request and return the raw response body.
    async fn open_stream(&self, request: &MessagesRequest) -> Result<ByteStream>;
}

/// [`Transport`] over HTTPS using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpTransport {
    /// Build a transport from client options.
    ///
    /// The HTTP client is created once and reused, so connections are pooled
    /// across requests.
    pub fn new(options: &AgentOptions) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout()))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/v1/messages", options.base_url()),
            api_key: options.api_key().to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, request: &MessagesRequest) -> Result<reqwest::Response> {
        log::debug!(
            "POST {} (model={}, messages={}, stream={})",
            self.endpoint,
            request.model,
            request.messages.len(),
            request.stream.unwrap_or(false)
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_else(|e| {
            log::warn!("Failed to read error response body: {}", e);
            String::new()
        });
        Err(status_error(status.as_u16(), &body))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &MessagesRequest) -> Result<MessageResponse> {
        let response = self.post(request).await?;
        let body = response.bytes().await.map_err(from_reqwest)?;

        serde_json::from_slice(&body).map_err(|e| {
            Error::malformed(format!(
                "{} (body: {})",
                e,
                String::from_utf8_lossy(&body[..body.len().min(200)])
            ))
        })
    }

    async fn open_stream(&self, request: &MessagesRequest) -> Result<ByteStream> {
        let response = self.post(request).await?;
        Ok(body_stream(response))
    }
}

fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else {
        Error::Http(e)
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Map a non-success status and its body to an error.
pub(crate) fn status_error(status: u16, body: &str) -> Error {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                "no response body".to_string()
            } else {
                body.trim().to_string()
            }
        });

    match status {
        401 | 403 => Error::invalid_credentials(message),
        _ => Error::api(status, message),
    }
}

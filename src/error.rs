//! Error types for the Messages SDK

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the SDK
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request error (connectivity, TLS, body read)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The remote service rejected the API key
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// A response body that could not be decoded
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The remote service rejected the request
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Streaming error, including a connection closed before the terminal event
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Tool execution error
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// The tool loop did not produce a plain-text answer in time
    #[error(
        "Tool use did not converge after {iterations} iterations (possible infinite tool-use loop)"
    )]
    IterationLimitExceeded { iterations: u32 },

    /// The operation was cancelled through the interrupt handle
    #[error("Operation interrupted")]
    Interrupted,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout error
    #[error("Request timeout")]
    Timeout,

    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new API error
    pub fn api(status: u16, msg: impl Into<String>) -> Self {
        Error::Api {
            status,
            message: msg.into(),
        }
    }

    /// Create a new stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Create a new tool error
    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    /// Create a new malformed response error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedResponse(msg.into())
    }

    /// Create a new invalid credentials error
    pub fn invalid_credentials(msg: impl Into<String>) -> Self {
        Error::InvalidCredentials(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a timeout error
    pub fn timeout() -> Self {
        Error::Timeout
    }

    /// Whether a retry of the same request could plausibly succeed.
    ///
    /// Transport failures, timeouts, broken streams, rate limiting (429) and
    /// server errors (5xx) are retryable. Everything else is a caller or
    /// configuration problem and retrying would only repeat it.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::Timeout | Error::Stream(_) => true,
            Error::Api { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// Text used for a tool result produced from a failed execution.
    pub(crate) fn as_tool_result_text(&self) -> String {
        match self {
            Error::Tool(msg) => format!("Error: {}", msg),
            other => format!("Error: {}", other),
        }
    }
}

//! Error types for the HTTP transport layer.
//!
//! [`HttpTransportError`] keeps the full failure context. The core crate only
//! sees the collaborator errors it is converted into.

use http::StatusCode;
use mcp_audit::error::{ConnectError, SessionError, ToolCallError};
use serde_json::Value;

/// Errors that can occur while talking to an MCP server over HTTP.
#[derive(Debug, thiserror::Error)]
pub enum HttpTransportError {
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The reply was not a decodable JSON-RPC response.
    #[error("Malformed JSON-RPC response: {context}: {reason}")]
    Malformed {
        /// Human-readable context.
        context: &'static str,
        /// What was wrong with it.
        reason: String,
    },
    /// The server answered with a JSON-RPC error object.
    #[error("JSON-RPC error {code}: {context}: {message}")]
    Rpc {
        /// Human-readable context.
        context: &'static str,
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
        /// Optional structured error data.
        data: Option<Value>,
    },
    /// The request could not be encoded.
    #[error("Failed to encode request: {context}: {source}")]
    Encode {
        /// Human-readable context.
        context: &'static str,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

impl HttpTransportError {
    /// Returns `true` if the request ran out of time.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Http { source, .. } | Self::ResponseBodyRead { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

impl From<HttpTransportError> for ConnectError {
    fn from(err: HttpTransportError) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        match err {
            HttpTransportError::Http { source, .. } => Self::Transport(source.to_string()),
            other => Self::Handshake(other.to_string()),
        }
    }
}

impl From<HttpTransportError> for SessionError {
    fn from(err: HttpTransportError) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        match err {
            HttpTransportError::Rpc { code, message, .. } => Self::Rpc { code, message },
            HttpTransportError::Malformed { reason, .. } => Self::Malformed(reason),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<HttpTransportError> for ToolCallError {
    fn from(err: HttpTransportError) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        match err {
            HttpTransportError::Rpc {
                code,
                message,
                data,
                ..
            } => Self::Rpc {
                code,
                message,
                data,
            },
            HttpTransportError::HttpStatus { status, body, .. } => Self::Http {
                status: status.as_u16(),
                body: serde_json::from_str(&body).ok(),
            },
            HttpTransportError::Encode { source, .. } => Self::Internal(source.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

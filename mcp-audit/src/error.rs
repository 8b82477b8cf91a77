//! Error types for the audit engines and their collaborators.
//!
//! Only [`AuditError`] ever reaches the caller of
//! [`Auditor`](crate::auditor::Auditor). The collaborator errors
//! ([`FetchError`], [`ConnectError`], [`SessionError`], [`ToolCallError`]) are
//! produced by [`NetworkFetcher`](crate::fetch::NetworkFetcher) and
//! [`McpSession`](crate::session::McpSession) implementations and are folded
//! into diagnostics by the engines.

use std::fmt;

use serde_json::Value;

use crate::diagnostic::Diagnostic;

/// Fatal error returned at the auditor boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AuditError {
    /// The request or snapshot input was malformed (`VAL-*` diagnostics).
    #[error("{}", JoinedDiagnostics(.0))]
    InvalidInput(Vec<Diagnostic>),
}

impl AuditError {
    /// Returns the diagnostics carried by this error.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::InvalidInput(messages) => messages,
        }
    }
}

struct JoinedDiagnostics<'a>(&'a [Diagnostic]);

impl fmt::Display for JoinedDiagnostics<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diag) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{diag}")?;
        }
        Ok(())
    }
}

/// Failure of a single HTTP attempt made by a [`NetworkFetcher`](crate::fetch::NetworkFetcher).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The attempt exceeded its time budget.
    #[error("request timed out")]
    Timeout,
    /// The URL could not be requested at all.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// Connection, TLS or body read failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure to establish an MCP session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConnectError {
    /// The handshake did not complete within the time budget.
    #[error("handshake timed out")]
    Timeout,
    /// The server rejected or garbled the `initialize` exchange.
    #[error("{0}")]
    Handshake(String),
    /// The endpoint could not be reached.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure of a non-tool request on an established session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The request exceeded its time budget.
    #[error("request timed out")]
    Timeout,
    /// The server answered with a JSON-RPC error.
    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },
    /// The server answered with something that is not the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// Connection or HTTP level failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure of a `tools/call` invocation.
///
/// The probe engine classifies these: a 402-class [`ToolCallError::Rpc`] or
/// [`ToolCallError::Http`] marks the tool as payment-gated, every other remote
/// failure leaves it open, and [`ToolCallError::Internal`] is reported as a
/// probe fault.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ToolCallError {
    /// The server answered with a JSON-RPC error object.
    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code (`-32402` or `402` for payment required).
        code: i64,
        /// Error message.
        message: String,
        /// Optional structured error data.
        data: Option<Value>,
    },
    /// The server answered with a non-success HTTP status.
    #[error("HTTP status {status}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, if it parsed as JSON.
        body: Option<Value>,
    },
    /// The call exceeded its time budget.
    #[error("tool call timed out")]
    Timeout,
    /// Connection level failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The session itself failed while handling the call.
    #[error("internal session failure: {0}")]
    Internal(String),
}

impl ToolCallError {
    /// Returns the numeric code or HTTP status carried by the error, if any.
    #[must_use]
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            Self::Http { status, .. } => Some(i64::from(*status)),
            _ => None,
        }
    }

    /// Returns the structured payload carried by the error, if any.
    #[must_use]
    pub const fn data(&self) -> Option<&Value> {
        match self {
            Self::Rpc { data, .. } => data.as_ref(),
            Self::Http { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}

//! JSON-RPC 2.0 envelopes and reply decoding.
//!
//! A Streamable HTTP server answers a POSTed request either with a single
//! `application/json` body or with a `text/event-stream` whose `data:` lines
//! carry JSON-RPC messages. Both are reduced to the response matching the
//! request id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HttpTransportError;

/// A JSON-RPC request or, without `id`, a notification.
#[derive(Debug, Clone, Serialize)]
pub struct Request<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl<'a> Request<'a> {
    /// Creates a request expecting a response.
    #[must_use]
    pub const fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        }
    }

    /// Creates a notification.
    #[must_use]
    pub const fn notification(method: &'a str) -> Self {
        Self {
            jsonrpc: "2.0",
            id: None,
            method,
            params: None,
        }
    }
}

/// The error member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcError {
    /// Error code.
    pub code: i64,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Optional structured data.
    #[serde(default)]
    pub data: Option<Value>,
}

/// A decoded JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Response {
    /// Request id; `null` for some parse errors.
    #[serde(default)]
    pub id: Option<Value>,
    /// Present on success.
    #[serde(default)]
    pub result: Option<Value>,
    /// Present on failure.
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl Response {
    /// Returns the result, or the error as [`HttpTransportError::Rpc`].
    ///
    /// # Errors
    ///
    /// Fails if the response carries an error or neither member.
    pub fn into_result(self, context: &'static str) -> Result<Value, HttpTransportError> {
        match (self.result, self.error) {
            (_, Some(err)) => Err(HttpTransportError::Rpc {
                context,
                code: err.code,
                message: err.message,
                data: err.data,
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(HttpTransportError::Malformed {
                context,
                reason: "response has neither result nor error".into(),
            }),
        }
    }

    fn answers(&self, id: u64) -> bool {
        self.id.as_ref().and_then(Value::as_u64) == Some(id)
    }
}

/// Decodes a reply body into the response to request `id`.
///
/// # Errors
///
/// Returns [`HttpTransportError::Malformed`] if no matching response is found.
pub fn decode_reply(
    body: &str,
    event_stream: bool,
    id: u64,
    context: &'static str,
) -> Result<Response, HttpTransportError> {
    let malformed = |reason: String| HttpTransportError::Malformed { context, reason };

    if !event_stream {
        return serde_json::from_str::<Response>(body).map_err(|e| malformed(e.to_string()));
    }

    sse_events(body)
        .into_iter()
        .filter_map(|data| serde_json::from_str::<Response>(&data).ok())
        .find(|response| response.answers(id))
        .ok_or_else(|| malformed(format!("no response with id {id} in event stream")))
}

/// Returns the `data` payload of each event in an SSE body.
///
/// Multi-line data is joined with `\n`; events without data are skipped.
#[must_use]
pub fn sse_events(body: &str) -> Vec<String> {
    let mut events = Vec::new();
    let mut data: Vec<&str> = Vec::new();
    for line in body.lines().chain(std::iter::once("")) {
        if line.is_empty() {
            if !data.is_empty() {
                events.push(data.join("\n"));
                data.clear();
            }
        } else if let Some(rest) = line.strip_prefix("data:") {
            data.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    events
}

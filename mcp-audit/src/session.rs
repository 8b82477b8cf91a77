//! The MCP session abstraction used by discovery and tool probing.
//!
//! Implement [`McpConnector`] and [`McpSession`] to plug any MCP client into
//! the auditor. The engines only ever hold a `&dyn McpSession`.
//!
//! # Examples
//!
//! ```rust,ignore
//! struct MySession { /* ... */ }
//!
//! impl McpSession for MySession {
//!     fn call_tool(
//!         &self,
//!         params: CallToolParams,
//!         timeout: Duration,
//!     ) -> BoxFuture<'_, Result<CallToolResult, ToolCallError>> {
//!         Box::pin(async move {
//!             // Forward to the actual MCP client
//!         })
//!     }
//!     // ...
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use url::Url;

use crate::BoxFuture;
use crate::error::{ConnectError, SessionError, ToolCallError};
use crate::types::{CallToolParams, CallToolResult, Implementation};

/// Establishes MCP sessions.
pub trait McpConnector: Send + Sync {
    /// Performs the `initialize` handshake against `endpoint`.
    fn connect<'a>(
        &'a self,
        endpoint: &'a Url,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Box<dyn McpSession>, ConnectError>>;
}

/// An initialized MCP session.
///
/// List methods return the raw JSON-RPC `result` object so callers can tell
/// a failed request from a malformed answer.
pub trait McpSession: Send + Sync {
    /// Sends `tools/list`.
    fn list_tools(&self) -> BoxFuture<'_, Result<Value, SessionError>>;

    /// Sends `resources/list`.
    fn list_resources(&self) -> BoxFuture<'_, Result<Value, SessionError>>;

    /// Sends `prompts/list`.
    fn list_prompts(&self) -> BoxFuture<'_, Result<Value, SessionError>>;

    /// Sends `ping`.
    fn ping(&self) -> BoxFuture<'_, Result<(), SessionError>>;

    /// Sends `tools/call` bounded by `timeout`.
    fn call_tool(
        &self,
        params: CallToolParams,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<CallToolResult, ToolCallError>>;

    /// Capabilities announced in the handshake.
    fn server_capabilities(&self) -> &Map<String, Value>;

    /// Instructions announced in the handshake.
    fn instructions(&self) -> Option<&str>;

    /// Server implementation info announced in the handshake.
    fn server_version(&self) -> Option<&Implementation>;

    /// Negotiated protocol version.
    fn protocol_version(&self) -> Option<&str>;

    /// Terminates the session. Failures are swallowed.
    fn close(&self) -> BoxFuture<'_, ()>;
}

impl<T: McpSession + ?Sized> McpSession for Arc<T> {
    fn list_tools(&self) -> BoxFuture<'_, Result<Value, SessionError>> {
        (**self).list_tools()
    }
    fn list_resources(&self) -> BoxFuture<'_, Result<Value, SessionError>> {
        (**self).list_resources()
    }
    fn list_prompts(&self) -> BoxFuture<'_, Result<Value, SessionError>> {
        (**self).list_prompts()
    }
    fn ping(&self) -> BoxFuture<'_, Result<(), SessionError>> {
        (**self).ping()
    }
    fn call_tool(
        &self,
        params: CallToolParams,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<CallToolResult, ToolCallError>> {
        (**self).call_tool(params, timeout)
    }
    fn server_capabilities(&self) -> &Map<String, Value> {
        (**self).server_capabilities()
    }
    fn instructions(&self) -> Option<&str> {
        (**self).instructions()
    }
    fn server_version(&self) -> Option<&Implementation> {
        (**self).server_version()
    }
    fn protocol_version(&self) -> Option<&str> {
        (**self).protocol_version()
    }
    fn close(&self) -> BoxFuture<'_, ()> {
        (**self).close()
    }
}

//! HTTP-specific constants for MCP Streamable HTTP.

/// Header carrying the session id assigned by the server.
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

/// Header carrying the negotiated protocol version after initialization.
pub const MCP_PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// Protocol version requested in the `initialize` handshake.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// `Accept` value for JSON-RPC requests; servers may reply with either.
pub const ACCEPT_JSON_OR_SSE: &str = "application/json, text/event-stream";

/// `Accept` value for metadata documents.
pub const ACCEPT_JSON: &str = "application/json";

/// Content type of an SSE-framed reply.
pub const EVENT_STREAM: &str = "text/event-stream";

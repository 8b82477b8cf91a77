//! MCP sessions over Streamable HTTP.
//!
//! [`StreamableHttpConnector`] performs the `initialize` handshake and hands
//! back a [`StreamableHttpSession`]. Every JSON-RPC request is a single
//! `POST` to the endpoint; the reply is either a JSON body or an SSE stream.
//! The session id assigned by the server is echoed on every later request
//! and the session is terminated with `DELETE` on close.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use http::HeaderMap;
use http::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use mcp_audit::BoxFuture;
use mcp_audit::config::AuditConfig;
use mcp_audit::error::{ConnectError, SessionError, ToolCallError};
use mcp_audit::session::{McpConnector, McpSession};
use mcp_audit::types::{CallToolParams, CallToolResult, Implementation, InitializeResult};
use reqwest::Client;
use serde_json::{Map, Value, json};
use url::Url;

use crate::constants::{
    ACCEPT_JSON_OR_SSE, EVENT_STREAM, LATEST_PROTOCOL_VERSION, MCP_PROTOCOL_VERSION_HEADER,
    MCP_SESSION_ID_HEADER,
};
use crate::error::HttpTransportError;
use crate::jsonrpc::{Request, Response, decode_reply};

/// Request id used for the `initialize` handshake.
const INITIALIZE_ID: u64 = 0;

/// Opens [`StreamableHttpSession`]s.
///
/// Only the Streamable HTTP transport is spoken; servers that offer nothing
/// but the legacy HTTP+SSE transport fail the handshake.
#[derive(Clone, Debug)]
pub struct StreamableHttpConnector {
    client: Client,
    client_info: Implementation,
}

impl StreamableHttpConnector {
    /// Creates a connector announcing the client name and version from `config`.
    #[must_use]
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            client: Client::new(),
            client_info: Implementation {
                name: Some(config.client_name.clone()),
                version: Some(config.client_version.clone()),
                description: None,
            },
        }
    }

    /// Replaces the underlying HTTP client.
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    async fn handshake(
        &self,
        endpoint: &Url,
        timeout: Duration,
    ) -> Result<StreamableHttpSession, HttpTransportError> {
        let mut channel = Channel {
            client: self.client.clone(),
            endpoint: endpoint.clone(),
            session_id: None,
            protocol_version: None,
        };

        let params = json!({
            "protocolVersion": LATEST_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": self.client_info,
        });
        let reply = channel
            .request(INITIALIZE_ID, "initialize", Some(params), timeout)
            .await?;
        let init: InitializeResult =
            serde_json::from_value(reply.result).map_err(|e| HttpTransportError::Malformed {
                context: "initialize",
                reason: e.to_string(),
            })?;

        channel.session_id = reply.session_id;
        channel.protocol_version.clone_from(&init.protocol_version);
        channel.notify("notifications/initialized", timeout).await;

        #[cfg(feature = "telemetry")]
        tracing::debug!(
            endpoint = %endpoint,
            session_id = ?channel.session_id,
            protocol_version = ?channel.protocol_version,
            "MCP session initialized"
        );

        Ok(StreamableHttpSession {
            channel,
            timeout,
            next_id: AtomicU64::new(INITIALIZE_ID + 1),
            init,
        })
    }
}

impl McpConnector for StreamableHttpConnector {
    fn connect<'a>(
        &'a self,
        endpoint: &'a Url,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Box<dyn McpSession>, ConnectError>> {
        Box::pin(async move {
            match self.handshake(endpoint, timeout).await {
                Ok(session) => Ok(Box::new(session) as Box<dyn McpSession>),
                Err(err) => Err(ConnectError::from(err)),
            }
        })
    }
}

/// An initialized MCP session over Streamable HTTP.
#[derive(Debug)]
pub struct StreamableHttpSession {
    channel: Channel,
    /// Budget for list requests, `ping` and `DELETE`.
    timeout: Duration,
    next_id: AtomicU64,
    init: InitializeResult,
}

impl StreamableHttpSession {
    /// Session id assigned by the server, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.channel.session_id.as_deref()
    }

    async fn call(
        &self,
        method: &'static str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, HttpTransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let reply = self.channel.request(id, method, params, timeout).await;

        #[cfg(feature = "telemetry")]
        if let Err(err) = &reply {
            tracing::debug!(method, id, error = %err, "MCP request failed");
        }

        reply.map(|reply| reply.result)
    }

    async fn call_tool_inner(
        &self,
        params: &CallToolParams,
        timeout: Duration,
    ) -> Result<CallToolResult, HttpTransportError> {
        let context = "tools/call";
        let params = serde_json::to_value(params)
            .map_err(|source| HttpTransportError::Encode { context, source })?;
        let result = self.call(context, Some(params), timeout).await?;
        serde_json::from_value(result).map_err(|e| HttpTransportError::Malformed {
            context,
            reason: e.to_string(),
        })
    }
}

impl McpSession for StreamableHttpSession {
    fn list_tools(&self) -> BoxFuture<'_, Result<Value, SessionError>> {
        Box::pin(async move {
            self.call("tools/list", None, self.timeout)
                .await
                .map_err(SessionError::from)
        })
    }

    fn list_resources(&self) -> BoxFuture<'_, Result<Value, SessionError>> {
        Box::pin(async move {
            self.call("resources/list", None, self.timeout)
                .await
                .map_err(SessionError::from)
        })
    }

    fn list_prompts(&self) -> BoxFuture<'_, Result<Value, SessionError>> {
        Box::pin(async move {
            self.call("prompts/list", None, self.timeout)
                .await
                .map_err(SessionError::from)
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), SessionError>> {
        Box::pin(async move {
            self.call("ping", None, self.timeout)
                .await
                .map(|_| ())
                .map_err(SessionError::from)
        })
    }

    fn call_tool(
        &self,
        params: CallToolParams,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<CallToolResult, ToolCallError>> {
        Box::pin(async move {
            self.call_tool_inner(&params, timeout)
                .await
                .map_err(ToolCallError::from)
        })
    }

    fn server_capabilities(&self) -> &Map<String, Value> {
        &self.init.capabilities
    }

    fn instructions(&self) -> Option<&str> {
        self.init.instructions.as_deref()
    }

    fn server_version(&self) -> Option<&Implementation> {
        self.init.server_info.as_ref()
    }

    fn protocol_version(&self) -> Option<&str> {
        self.init.protocol_version.as_deref()
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move { self.channel.terminate(self.timeout).await })
    }
}

/// A successful JSON-RPC exchange.
struct Reply {
    session_id: Option<String>,
    result: Value,
}

/// The HTTP side of a session: where to post and which headers to echo.
#[derive(Clone, Debug)]
struct Channel {
    client: Client,
    endpoint: Url,
    session_id: Option<String>,
    protocol_version: Option<String>,
}

impl Channel {
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON_OR_SSE));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(value) = self.session_id.as_deref().and_then(|id| HeaderValue::from_str(id).ok()) {
            headers.insert(MCP_SESSION_ID_HEADER, value);
        }
        if let Some(value) = self
            .protocol_version
            .as_deref()
            .and_then(|version| HeaderValue::from_str(version).ok())
        {
            headers.insert(MCP_PROTOCOL_VERSION_HEADER, value);
        }
        headers
    }

    async fn request(
        &self,
        id: u64,
        method: &'static str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Reply, HttpTransportError> {
        let context = method;
        let body = serde_json::to_vec(&Request::new(id, method, params))
            .map_err(|source| HttpTransportError::Encode { context, source })?;

        let http_response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers())
            .body(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| HttpTransportError::Http { context, source })?;

        let status = http_response.status();
        let headers = http_response.headers();
        let session_id = headers
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let event_stream = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|ct| ct.starts_with(EVENT_STREAM));
        let text = http_response
            .text()
            .await
            .map_err(|source| HttpTransportError::ResponseBodyRead { context, source })?;

        if !status.is_success() {
            // Some servers carry a JSON-RPC error object on a 4xx/5xx reply.
            if let Ok(Response {
                error: Some(error), ..
            }) = serde_json::from_str::<Response>(&text)
            {
                return Err(HttpTransportError::Rpc {
                    context,
                    code: error.code,
                    message: error.message,
                    data: error.data,
                });
            }
            return Err(HttpTransportError::HttpStatus {
                context,
                status,
                body: text,
            });
        }

        let result = decode_reply(&text, event_stream, id, context)?.into_result(context)?;
        Ok(Reply { session_id, result })
    }

    /// Posts a notification. The server's answer is not inspected.
    async fn notify(&self, method: &'static str, timeout: Duration) {
        let Ok(body) = serde_json::to_vec(&Request::notification(method)) else {
            return;
        };
        let sent = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers())
            .body(body)
            .timeout(timeout)
            .send()
            .await;

        #[cfg(feature = "telemetry")]
        if let Err(err) = &sent {
            tracing::debug!(method, error = %err, "Notification failed");
        }
        drop(sent);
    }

    /// Ends the server-side session, if one was assigned.
    async fn terminate(&self, timeout: Duration) {
        if self.session_id.is_none() {
            return;
        }
        let sent = self
            .client
            .delete(self.endpoint.clone())
            .headers(self.headers())
            .timeout(timeout)
            .send()
            .await;

        #[cfg(feature = "telemetry")]
        if let Err(err) = &sent {
            tracing::debug!(error = %err, "Session termination failed");
        }
        drop(sent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_audit::Auditor;
    use mcp_audit::probe::probe;
    use mcp_audit::types::ToolDescriptor;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::HttpFetcher;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn rpc_result(id: u64, result: Value) -> Value {
        json!({"jsonrpc": "2.0", "id": id, "result": result})
    }

    async fn mount_handshake(mock_server: &MockServer) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "initialize"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(MCP_SESSION_ID_HEADER, "session-1")
                    .set_body_json(rpc_result(
                        0,
                        json!({
                            "protocolVersion": "2025-06-18",
                            "capabilities": {"tools": {"listChanged": true}},
                            "serverInfo": {"name": "weather", "version": "1.2.0"},
                            "instructions": "Ask for the forecast"
                        }),
                    )),
            )
            .expect(1)
            .mount(mock_server)
            .await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "notifications/initialized"})))
            .respond_with(ResponseTemplate::new(202))
            .mount(mock_server)
            .await;
    }

    async fn open(mock_server: &MockServer) -> Box<dyn McpSession> {
        let endpoint: Url = format!("{}/mcp", mock_server.uri()).parse().unwrap();
        StreamableHttpConnector::new(&AuditConfig::default())
            .connect(&endpoint, TIMEOUT)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_handshake_reads_server_info_and_session_id() {
        let mock_server = MockServer::start().await;
        mount_handshake(&mock_server).await;

        Mock::given(method("POST"))
            .and(header("mcp-session-id", "session-1"))
            .and(header("mcp-protocol-version", "2025-06-18"))
            .and(body_partial_json(json!({"method": "tools/list"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result(1, json!({"tools": []}))))
            .expect(1)
            .mount(&mock_server)
            .await;

        let session = open(&mock_server).await;
        assert_eq!(session.protocol_version(), Some("2025-06-18"));
        assert_eq!(session.instructions(), Some("Ask for the forecast"));
        assert_eq!(
            session.server_version().and_then(|info| info.name.as_deref()),
            Some("weather")
        );
        assert!(session.server_capabilities().contains_key("tools"));
        assert_eq!(session.list_tools().await.unwrap(), json!({"tools": []}));
    }

    #[tokio::test]
    async fn test_handshake_rejects_html() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
            .mount(&mock_server)
            .await;

        let endpoint: Url = mock_server.uri().parse().unwrap();
        let err = StreamableHttpConnector::new(&AuditConfig::default())
            .connect(&endpoint, TIMEOUT)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConnectError::Handshake(_)));
    }

    #[tokio::test]
    async fn test_event_stream_reply() {
        let mock_server = MockServer::start().await;
        mount_handshake(&mock_server).await;

        let stream = concat!(
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"resources\":[{\"uri\":\"file:///a\"}]}}\n",
            "\n"
        );
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "resources/list"})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(stream, "text/event-stream"))
            .mount(&mock_server)
            .await;

        let session = open(&mock_server).await;
        let result = session.list_resources().await.unwrap();
        assert_eq!(result["resources"][0]["uri"], "file:///a");
    }

    #[tokio::test]
    async fn test_rpc_error_on_list_request() {
        let mock_server = MockServer::start().await;
        mount_handshake(&mock_server).await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "prompts/list"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32601, "message": "Method not found"}
            })))
            .mount(&mock_server)
            .await;

        let session = open(&mock_server).await;
        assert_eq!(
            session.list_prompts().await.unwrap_err(),
            SessionError::Rpc {
                code: -32601,
                message: "Method not found".into()
            }
        );
    }

    #[tokio::test]
    async fn test_payment_required_tool_error() {
        let mock_server = MockServer::start().await;
        mount_handshake(&mock_server).await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "tools/call",
                "params": {"name": "forecast", "arguments": {"city": "test"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {
                    "code": -32402,
                    "message": "Payment required",
                    "data": {"x402Version": 2, "accepts": [{"scheme": "exact"}]}
                }
            })))
            .mount(&mock_server)
            .await;

        let session = open(&mock_server).await;
        let tool = ToolDescriptor::new(
            "forecast",
            json!({"type": "object", "properties": {"city": {"type": "string"}}, "required": ["city"]}),
        );
        let outcome = probe(session.as_ref(), &[tool], TIMEOUT).await;
        assert_eq!(outcome.restricted_calls.len(), 1);
        assert_eq!(outcome.restricted_calls[0].tool_name, "forecast");
        assert_eq!(outcome.payment_options, vec![json!({"scheme": "exact"})]);
    }

    #[tokio::test]
    async fn test_http_402_body_is_kept() {
        let mock_server = MockServer::start().await;
        mount_handshake(&mock_server).await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "tools/call"})))
            .respond_with(
                ResponseTemplate::new(402).set_body_json(json!({"x402Version": 2, "accepts": []})),
            )
            .mount(&mock_server)
            .await;

        let session = open(&mock_server).await;
        let err = session
            .call_tool(
                CallToolParams {
                    name: "forecast".into(),
                    arguments: Map::new(),
                },
                TIMEOUT,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(402));
        assert_eq!(err.data(), Some(&json!({"x402Version": 2, "accepts": []})));
    }

    #[tokio::test]
    async fn test_close_sends_delete_with_session_id() {
        let mock_server = MockServer::start().await;
        mount_handshake(&mock_server).await;

        Mock::given(method("DELETE"))
            .and(header("mcp-session-id", "session-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let session = open(&mock_server).await;
        session.close().await;
    }

    #[tokio::test]
    async fn test_audit_against_mock_server() {
        let mock_server = MockServer::start().await;
        mount_handshake(&mock_server).await;

        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "tools/list"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result(
                1,
                json!({"tools": [{"name": "forecast", "inputSchema": {"type": "object"}}]}),
            )))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "tools/call"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result(
                1,
                json!({"content": [{"type": "text", "text": "sunny"}]}),
            )))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "ping"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result(1, json!({}))))
            .mount(&mock_server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let config = AuditConfig::default();
        let auditor = Auditor::new(HttpFetcher::new(), StreamableHttpConnector::new(&config));
        let endpoint = format!("{}/mcp", mock_server.uri());
        let report = auditor.start(&endpoint, TIMEOUT).await.unwrap();

        let entries = &report.snapshot.entries;
        assert_eq!(entries.tools.len(), 1);
        assert_eq!(entries.tools[0].name, "forecast");
        assert_eq!(entries.server.server_name.as_deref(), Some("weather"));
        assert!(entries.x402.restricted_calls.is_empty());
        assert!(report.snapshot.categories.is_reachable);
        assert!(!report.snapshot.categories.supports_oauth);
    }
}

//! Connection, enumeration and latency sampling.
//!
//! These steps talk to the server through the collaborator traits only and
//! turn every failure into a `CON-*` diagnostic instead of an error.

use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use url::Url;

use crate::diagnostic::{Category, Code, Diagnostic};
use crate::fetch::NetworkFetcher;
use crate::session::{McpConnector, McpSession};
use crate::snapshot::Latency;
use crate::types::{ToolDescriptor, ToolList};

const fn con(number: u16) -> Code {
    Code::new(Category::Connection, number)
}

/// What a session lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    /// `CON-008` to `CON-011` findings.
    pub messages: Vec<Diagnostic>,
    /// Declared tools.
    pub tools: Vec<ToolDescriptor>,
    /// Declared resources.
    pub resources: Vec<Value>,
    /// Declared prompts.
    pub prompts: Vec<Value>,
    /// Capabilities from the handshake.
    pub capabilities: Map<String, Value>,
}

/// Sends a `HEAD` to the endpoint. Any HTTP status counts as reachable.
///
/// # Errors
///
/// Returns `CON-001` if no response arrived within `timeout`.
pub async fn check_reachable<F>(
    fetcher: &F,
    endpoint: &Url,
    timeout: Duration,
) -> Result<u16, Diagnostic>
where
    F: NetworkFetcher + ?Sized,
{
    match fetcher.head(endpoint.as_str(), timeout).await {
        Ok(status) => Ok(status),
        #[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
        Err(err) => {
            #[cfg(feature = "telemetry")]
            tracing::debug!(endpoint = %endpoint, error = %err, "Endpoint not reachable");
            Err(Diagnostic::new(con(1), "endpoint", "Server is not reachable"))
        }
    }
}

/// Performs the MCP handshake.
///
/// # Errors
///
/// Returns `CON-004` carrying the handshake failure reason.
pub async fn connect<C>(
    connector: &C,
    endpoint: &Url,
    timeout: Duration,
) -> Result<Box<dyn McpSession>, Diagnostic>
where
    C: McpConnector + ?Sized,
{
    connector.connect(endpoint, timeout).await.map_err(|err| {
        Diagnostic::new(
            con(4),
            "mcp",
            format!("Initialize handshake failed — {err}"),
        )
    })
}

/// Lists tools, resources and prompts. A failed list is reported and
/// treated as empty.
pub async fn discover(session: &dyn McpSession) -> Inventory {
    let mut inventory = Inventory {
        capabilities: session.server_capabilities().clone(),
        ..Inventory::default()
    };

    match session.list_tools().await {
        Ok(result) => match tools_from(result) {
            Some(tools) => inventory.tools = tools,
            None => inventory.messages.push(Diagnostic::new(
                con(9),
                "tools/list",
                "Invalid response format",
            )),
        },
        Err(_) => inventory
            .messages
            .push(Diagnostic::new(con(8), "tools/list", "Request failed")),
    }

    match session.list_resources().await {
        Ok(result) => inventory.resources = items(&result, "resources"),
        Err(_) => inventory
            .messages
            .push(Diagnostic::new(con(10), "resources/list", "Request failed")),
    }

    match session.list_prompts().await {
        Ok(result) => inventory.prompts = items(&result, "prompts"),
        Err(_) => inventory
            .messages
            .push(Diagnostic::new(con(11), "prompts/list", "Request failed")),
    }

    #[cfg(feature = "telemetry")]
    tracing::debug!(
        tools = inventory.tools.len(),
        resources = inventory.resources.len(),
        prompts = inventory.prompts.len(),
        "Discovered server inventory"
    );

    inventory
}

/// Decodes a `tools/list` result. A missing `tools` key means no tools;
/// a non-array `tools` is malformed.
fn tools_from(result: Value) -> Option<Vec<ToolDescriptor>> {
    match result.get("tools") {
        None | Some(Value::Null) => Some(Vec::new()),
        Some(Value::Array(_)) => serde_json::from_value::<ToolList>(result)
            .ok()
            .map(|list| list.tools),
        Some(_) => None,
    }
}

fn items(result: &Value, key: &str) -> Vec<Value> {
    result
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Times one `ping` and one `tools/list`.
pub async fn measure_latency(session: &dyn McpSession) -> Latency {
    let started = Instant::now();
    let ping = session.ping().await.ok().and_then(|()| millis(started));

    let started = Instant::now();
    let list_tools = session.list_tools().await.ok().and_then(|_| millis(started));

    Latency { ping, list_tools }
}

fn millis(started: Instant) -> Option<u64> {
    u64::try_from(started.elapsed().as_millis()).ok()
}

//! Sequential tool probing for x402 payment requirements.
//!
//! Each declared tool is called once with minimal synthesized arguments. A
//! payment-gated tool answers with a 402-class failure whose data is the
//! `PaymentRequired` payload; anything else means the tool is open. Tools are
//! probed strictly one after another, never concurrently.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::diagnostic::{Category, Code, Diagnostic};
use crate::error::ToolCallError;
use crate::extract::payment_required_from_result;
use crate::session::McpSession;
use crate::types::{CallToolParams, CallToolResult, ToolDescriptor};
use crate::{PAYMENT_REQUIRED_RPC_CODE, PAYMENT_REQUIRED_STATUS};

/// A tool invocation that failed with a decodable payment requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestrictedCall {
    /// Name of the probed tool.
    pub tool_name: String,
    /// The raw `PaymentRequired` object returned by the server.
    pub payment_required: Value,
}

/// Outcome of probing a tool list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeOutcome {
    /// `false` only when there was nothing to probe.
    pub status: bool,
    /// `PRB-*` findings.
    pub messages: Vec<Diagnostic>,
    /// One entry per payment-gated tool that returned a requirement.
    pub restricted_calls: Vec<RestrictedCall>,
    /// Every `accepts` entry of every restricted call, unvalidated.
    pub payment_options: Vec<Value>,
}

/// How a single tool responded to the probe.
#[derive(Debug, Clone, PartialEq)]
enum Verdict {
    Open,
    Restricted(Option<Value>),
    Fault,
}

/// Probes every tool in order under the shared `timeout`.
///
/// Never fails: an empty tool list yields `PRB-005`, and an internal session
/// failure on one tool yields `PRB-004` for that tool while probing goes on.
pub async fn probe(
    session: &dyn McpSession,
    tools: &[ToolDescriptor],
    timeout: Duration,
) -> ProbeOutcome {
    let mut outcome = ProbeOutcome::default();

    if tools.is_empty() {
        outcome.messages.push(Diagnostic::new(
            Code::new(Category::Probe, 5),
            "probe",
            "No tools available to probe",
        ));
        return outcome;
    }

    for tool in tools {
        let params = CallToolParams {
            name: tool.name.clone(),
            arguments: minimal_arguments(tool),
        };
        let verdict = classify(session.call_tool(params, timeout).await);

        #[cfg(feature = "telemetry")]
        tracing::debug!(tool = %tool.name, verdict = ?verdict, "Probed tool");

        match verdict {
            Verdict::Open | Verdict::Restricted(None) => {}
            Verdict::Restricted(Some(payment_required)) => {
                if let Some(accepts) = payment_required.get("accepts").and_then(Value::as_array) {
                    outcome.payment_options.extend(accepts.iter().cloned());
                }
                outcome.restricted_calls.push(RestrictedCall {
                    tool_name: tool.name.clone(),
                    payment_required,
                });
            }
            Verdict::Fault => outcome.messages.push(Diagnostic::new(
                Code::new(Category::Probe, 4),
                format!("probe({})", tool.name),
                "Unexpected exception",
            )),
        }
    }

    #[cfg(feature = "telemetry")]
    tracing::info!(
        tools = tools.len(),
        restricted = outcome.restricted_calls.len(),
        options = outcome.payment_options.len(),
        "Tool probing finished"
    );

    outcome.status = true;
    outcome
}

fn classify(result: Result<CallToolResult, ToolCallError>) -> Verdict {
    match result {
        Ok(result) => {
            payment_required_from_result(&result).map_or(Verdict::Open, |pr| Verdict::Restricted(Some(pr)))
        }
        Err(ToolCallError::Internal(_)) => Verdict::Fault,
        Err(err) => match err.code() {
            Some(PAYMENT_REQUIRED_STATUS | PAYMENT_REQUIRED_RPC_CODE) => {
                let data = err.data().filter(|d| d.is_object()).cloned();
                Verdict::Restricted(data)
            }
            _ => Verdict::Open,
        },
    }
}

/// Synthesizes placeholder values for every `required` argument.
///
/// `string` becomes `"test"`, `number`/`integer` `0`, `boolean` `false`,
/// `array` `[]`, `object` `{}`, and anything else or undeclared `""`.
#[must_use]
pub fn minimal_arguments(tool: &ToolDescriptor) -> Map<String, Value> {
    let mut args = Map::new();
    let Some(schema) = tool.input_schema.as_ref().filter(|s| s.is_object()) else {
        return args;
    };

    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for key in required.iter().filter_map(Value::as_str) {
        let declared_type = schema
            .get("properties")
            .and_then(|p| p.get(key))
            .and_then(|p| p.get("type"))
            .and_then(Value::as_str);
        let placeholder = match declared_type {
            Some("string") => Value::from("test"),
            Some("number" | "integer") => Value::from(0),
            Some("boolean") => Value::Bool(false),
            Some("array") => Value::Array(Vec::new()),
            Some("object") => Value::Object(Map::new()),
            _ => Value::from(""),
        };
        args.insert(key.to_owned(), placeholder);
    }

    args
}

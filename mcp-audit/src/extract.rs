//! Recovery of x402 payment requirements from MCP tool results.
//!
//! Servers following the x402 MCP transport binding do not fail the JSON-RPC
//! request. They answer `tools/call` with an `isError` result whose payload
//! carries the `PaymentRequired` object, either as `structuredContent` or as
//! JSON inside a text content item.

use serde_json::Value;

use crate::types::CallToolResult;

/// Extracts a payment-required payload from an error tool result.
///
/// 1. Checks `structuredContent` first
/// 2. Falls back to parsing each text content item as JSON
///
/// Returns `None` if the result is not an error or carries no payload with a
/// numeric `x402Version` and a non-empty `accepts` array. The payload is
/// returned raw; field-level validation happens later.
#[must_use]
pub fn payment_required_from_result(result: &CallToolResult) -> Option<Value> {
    if !result.is_error {
        return None;
    }

    if let Some(sc) = &result.structured_content
        && looks_like_payment_required(sc)
    {
        return Some(sc.clone());
    }

    result
        .content
        .iter()
        .filter_map(|item| item.as_text())
        .filter_map(|text| serde_json::from_str::<Value>(text).ok())
        .find(looks_like_payment_required)
}

fn looks_like_payment_required(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    let has_version = obj.get("x402Version").is_some_and(Value::is_number);
    let has_accepts = obj
        .get("accepts")
        .and_then(Value::as_array)
        .is_some_and(|a| !a.is_empty());
    has_version && has_accepts
}

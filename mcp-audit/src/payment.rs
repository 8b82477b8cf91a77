//! Field-level validation of x402 payment requirements.
//!
//! Payment requirements are elicited from arbitrary servers, so they are
//! validated as raw JSON rather than deserialized into typed structs. Each
//! rule violation becomes a `PAY-*` [`Diagnostic`] whose context is the JSON
//! path of the offending field, e.g. `restrictedCalls[0].accepts[1].payTo`.
//!
//! Within a restricted call the version, resource and accepts groups are
//! checked independently, and every accepted option is checked field by field
//! without short-circuiting, so one payload can yield many findings.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use url::Url;

use crate::diagnostic::{Category, Code, Diagnostic};
use crate::probe::RestrictedCall;
use crate::value::is_truthy;

/// The only x402 protocol version accepted.
pub const SUPPORTED_X402_VERSION: f64 = 2.0;

/// Payment schemes accepted in `accepts[].scheme`.
pub const ALLOWED_SCHEMES: &[&str] = &["exact"];

/// CAIP-2 namespace prefixes accepted in `accepts[].network`.
pub const KNOWN_NETWORK_PREFIXES: &[&str] = &["eip155:", "solana:"];

static EVM_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^0x[0-9a-fA-F]{40}$").expect("static regex is valid"));

/// Outcome of validating a batch of restricted calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentValidation {
    /// Every rule violation, in call then field order.
    pub messages: Vec<Diagnostic>,
    /// Options that produced no diagnostic at all, in source order.
    pub valid_payment_options: Vec<Value>,
}

const fn pay(number: u16) -> Code {
    Code::new(Category::Payment, number)
}

/// Validates the payment requirement of every restricted call.
///
/// An option lands in [`PaymentValidation::valid_payment_options`] only if
/// its own checks produced zero diagnostics, advisory `PAY-101`/`PAY-102`
/// included, and its call declares `x402Version` 2.
#[must_use]
pub fn validate(restricted_calls: &[RestrictedCall]) -> PaymentValidation {
    let mut out = PaymentValidation::default();

    for (i, call) in restricted_calls.iter().enumerate() {
        let prefix = format!("restrictedCalls[{i}]");
        let requirement = match &call.payment_required {
            Value::Null => {
                out.messages.push(Diagnostic::new(
                    pay(1),
                    prefix,
                    "PaymentRequired data is missing",
                ));
                continue;
            }
            Value::Object(obj) => obj,
            _ => {
                out.messages.push(Diagnostic::new(
                    pay(2),
                    prefix,
                    "PaymentRequired is not an object",
                ));
                continue;
            }
        };

        let version_ok = validate_version(requirement, &prefix, &mut out.messages);
        validate_resource(requirement, &prefix, &mut out.messages);
        validate_accepts(requirement, &prefix, version_ok, &mut out);
    }

    #[cfg(feature = "telemetry")]
    tracing::debug!(
        calls = restricted_calls.len(),
        findings = out.messages.len(),
        valid = out.valid_payment_options.len(),
        "Validated payment requirements"
    );

    out
}

/// Returns `true` if the version is exactly 2.
fn validate_version(
    requirement: &Map<String, Value>,
    prefix: &str,
    messages: &mut Vec<Diagnostic>,
) -> bool {
    let ctx = format!("{prefix}.x402Version");
    match requirement.get("x402Version") {
        None => messages.push(Diagnostic::new(pay(10), ctx, "Missing required field")),
        Some(Value::Number(n)) if n.as_f64() == Some(SUPPORTED_X402_VERSION) => return true,
        Some(Value::Number(n)) => {
            messages.push(Diagnostic::new(pay(12), ctx, format!("Expected 2, got {n}")));
        }
        Some(_) => messages.push(Diagnostic::new(pay(11), ctx, "Must be a number")),
    }
    false
}

fn validate_resource(requirement: &Map<String, Value>, prefix: &str, messages: &mut Vec<Diagnostic>) {
    let ctx = format!("{prefix}.resource");
    match requirement.get("resource") {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) => {
            if s.trim().is_empty() {
                messages.push(Diagnostic::new(pay(21), ctx, "Must not be empty"));
            }
        }
        Some(Value::Object(resource)) => {
            let url_ctx = format!("{ctx}.url");
            match resource.get("url") {
                None => messages.push(Diagnostic::new(pay(21), url_ctx, "Missing value")),
                Some(Value::String(url)) => {
                    if Url::parse(url).is_err() {
                        messages.push(Diagnostic::new(pay(23), url_ctx, "Invalid URL format"));
                    }
                }
                Some(_) => messages.push(Diagnostic::new(pay(22), url_ctx, "Must be a string")),
            }
            for key in resource.keys().filter(|k| k.as_str() != "url") {
                messages.push(Diagnostic::new(pay(24), field_context(&ctx, key), "Unknown field"));
            }
        }
        Some(_) => messages.push(Diagnostic::new(pay(20), ctx, "Must be a string or object")),
    }
}

/// Path of a remote field. Keys that would read as the context separator are
/// quoted.
fn field_context(ctx: &str, key: &str) -> String {
    if key.contains(": ") {
        format!("{ctx}[{}]", Value::from(key))
    } else {
        format!("{ctx}.{key}")
    }
}

/// Options of a call whose version is unusable are checked but never kept.
fn validate_accepts(
    requirement: &Map<String, Value>,
    prefix: &str,
    version_ok: bool,
    out: &mut PaymentValidation,
) {
    let ctx = format!("{prefix}.accepts");
    let accepts = match requirement.get("accepts") {
        None => {
            out.messages.push(Diagnostic::new(pay(30), ctx, "Missing required field"));
            return;
        }
        Some(Value::Array(accepts)) => accepts,
        Some(_) => {
            out.messages.push(Diagnostic::new(pay(31), ctx, "Must be an array"));
            return;
        }
    };
    if accepts.is_empty() {
        out.messages.push(Diagnostic::new(pay(32), ctx, "Is empty array"));
        return;
    }

    for (j, option) in accepts.iter().enumerate() {
        let before = out.messages.len();
        validate_option(option, &format!("{ctx}[{j}]"), &mut out.messages);
        if version_ok && out.messages.len() == before {
            out.valid_payment_options.push(option.clone());
        }
    }
}

/// Validates one entry of `accepts`.
///
/// A non-object entry has no fields, so every required field reports missing.
fn validate_option(option: &Value, prefix: &str, messages: &mut Vec<Diagnostic>) {
    let field = |key: &str| option.as_object().and_then(|o| o.get(key));

    validate_scheme(field("scheme"), prefix, messages);
    validate_network(field("network"), prefix, messages);
    validate_amount(field("amount"), prefix, messages);
    validate_asset(field("asset"), prefix, messages);
    validate_pay_to(field("payTo"), prefix, messages);
    validate_max_timeout(field("maxTimeoutSeconds"), prefix, messages);
    validate_extra(field("extra"), field("network"), prefix, messages);
}

fn validate_scheme(scheme: Option<&Value>, prefix: &str, messages: &mut Vec<Diagnostic>) {
    let ctx = format!("{prefix}.scheme");
    match scheme {
        None => messages.push(Diagnostic::new(pay(40), ctx, "Missing value")),
        Some(Value::String(s)) => {
            if !ALLOWED_SCHEMES.contains(&s.as_str()) {
                messages.push(Diagnostic::new(
                    pay(42),
                    ctx,
                    format!("Invalid value \"{s}\". Allowed are {}", ALLOWED_SCHEMES.join(", ")),
                ));
            }
        }
        Some(_) => messages.push(Diagnostic::new(pay(41), ctx, "Must be a string")),
    }
}

fn validate_network(network: Option<&Value>, prefix: &str, messages: &mut Vec<Diagnostic>) {
    let ctx = format!("{prefix}.network");
    let network = match network {
        None => {
            messages.push(Diagnostic::new(pay(50), ctx, "Missing value"));
            return;
        }
        Some(Value::String(s)) => s,
        Some(_) => {
            messages.push(Diagnostic::new(pay(51), ctx, "Must be a string"));
            return;
        }
    };

    let Some(matched) = KNOWN_NETWORK_PREFIXES
        .iter()
        .find(|p| network.starts_with(*p))
    else {
        messages.push(Diagnostic::new(
            pay(52),
            ctx,
            format!("Unknown prefix \"{network}\". Expected \"eip155:*\" or \"solana:*\""),
        ));
        return;
    };

    if network.len() == matched.len() {
        messages.push(Diagnostic::new(pay(53), ctx, "Missing chain ID after prefix"));
    }
}

fn validate_amount(amount: Option<&Value>, prefix: &str, messages: &mut Vec<Diagnostic>) {
    let ctx = format!("{prefix}.amount");
    let amount = match amount {
        None => {
            messages.push(Diagnostic::new(pay(60), ctx, "Missing value"));
            return;
        }
        Some(Value::String(s)) => s,
        Some(_) => {
            messages.push(Diagnostic::new(pay(61), ctx, "Must be a string"));
            return;
        }
    };

    match parse_numeric(amount) {
        None => messages.push(Diagnostic::new(pay(62), ctx, "Must be a numeric string")),
        Some(n) if n <= 0.0 => messages.push(Diagnostic::new(pay(63), ctx, "Must be positive")),
        Some(_) => {}
    }
}

/// Parses a numeric string the way loosely-typed x402 servers produce them.
///
/// Surrounding whitespace is ignored and a blank string reads as zero.
/// `0x`/`0o`/`0b` integer literals and `Infinity` are accepted; `NaN`
/// and anything else is rejected.
fn parse_numeric(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return Some(0.0);
    }

    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = s.strip_prefix(prefix) {
            return parse_radix_digits(digits, radix);
        }
    }

    match s {
        "Infinity" | "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }

    let plain = s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !plain {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| !n.is_nan())
}

/// Folds unsigned digits in `radix` into an `f64`, so literals wider than
/// any integer type still parse. Empty or signed digit runs are rejected.
fn parse_radix_digits(digits: &str, radix: u32) -> Option<f64> {
    if digits.is_empty() {
        return None;
    }
    digits.chars().try_fold(0.0_f64, |acc, c| {
        c.to_digit(radix)
            .map(|d| acc.mul_add(f64::from(radix), f64::from(d)))
    })
}

fn validate_asset(asset: Option<&Value>, prefix: &str, messages: &mut Vec<Diagnostic>) {
    let ctx = format!("{prefix}.asset");
    match asset {
        None => messages.push(Diagnostic::new(pay(70), ctx, "Missing value")),
        Some(Value::String(s)) => {
            if !EVM_ADDRESS.is_match(s) {
                messages.push(Diagnostic::new(pay(72), ctx, "Invalid EVM address format"));
            }
        }
        Some(_) => messages.push(Diagnostic::new(pay(71), ctx, "Must be a string")),
    }
}

fn validate_pay_to(pay_to: Option<&Value>, prefix: &str, messages: &mut Vec<Diagnostic>) {
    let ctx = format!("{prefix}.payTo");
    match pay_to {
        None => messages.push(Diagnostic::new(pay(80), ctx, "Missing value")),
        Some(Value::String(s)) => {
            if !EVM_ADDRESS.is_match(s) {
                messages.push(Diagnostic::new(pay(82), ctx, "Invalid EVM address format"));
            } else if !looks_checksummed(s) {
                messages.push(Diagnostic::new(pay(83), ctx, "Not checksummed"));
            }
        }
        Some(_) => messages.push(Diagnostic::new(pay(81), ctx, "Must be a string")),
    }
}

/// Case-mixing heuristic for EIP-55 checksummed addresses.
///
/// The hex body after `0x` must contain both upper- and lowercase letters.
/// This does not verify the Keccak checksum itself.
fn looks_checksummed(address: &str) -> bool {
    let body = address.get(2..).unwrap_or_default();
    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    has_upper && has_lower
}

fn validate_max_timeout(timeout: Option<&Value>, prefix: &str, messages: &mut Vec<Diagnostic>) {
    let ctx = format!("{prefix}.maxTimeoutSeconds");
    match timeout {
        None => messages.push(Diagnostic::new(pay(90), ctx, "Missing value")),
        Some(Value::Number(n)) => {
            if n.as_f64().is_none_or(|f| f <= 0.0) {
                messages.push(Diagnostic::new(pay(92), ctx, "Must be greater than 0"));
            }
        }
        Some(_) => messages.push(Diagnostic::new(pay(91), ctx, "Must be a number")),
    }
}

fn validate_extra(
    extra: Option<&Value>,
    network: Option<&Value>,
    prefix: &str,
    messages: &mut Vec<Diagnostic>,
) {
    let ctx = format!("{prefix}.extra");
    let extra = match extra {
        None => return,
        Some(Value::Object(extra)) => extra,
        Some(_) => {
            messages.push(Diagnostic::new(pay(100), ctx, "Must be an object"));
            return;
        }
    };

    let is_evm = network
        .and_then(Value::as_str)
        .is_some_and(|n| n.starts_with("eip155:"));
    if !is_evm {
        return;
    }

    if !extra.get("name").is_some_and(is_truthy) {
        messages.push(Diagnostic::new(
            pay(101),
            format!("{ctx}.name"),
            "Missing (recommended for EVM)",
        ));
    }
    if !extra.get("version").is_some_and(is_truthy) {
        messages.push(Diagnostic::new(
            pay(102),
            format!("{ctx}.version"),
            "Missing (recommended for EIP-3009)",
        ));
    }
}

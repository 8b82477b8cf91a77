//! The point-in-time audit snapshot.
//!
//! A snapshot always has the same shape: unreachable servers produce empty
//! lists, `null` scalars and all-`false` categories rather than missing keys,
//! so two snapshots can always be compared field by field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::classify::{DerivedCategories, x402_version};
use crate::oauth::OAuthProfile;
use crate::probe::RestrictedCall;
use crate::session::McpSession;
use crate::timestamp::SnapshotTimestamp;
use crate::types::ToolDescriptor;
use crate::value::truthy;

/// An audit snapshot: derived categories plus the raw entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSnapshot {
    /// Flat capability and payment flags.
    pub categories: DerivedCategories,
    /// Everything recorded about the server.
    pub entries: SnapshotEntries,
}

/// Raw facts recorded during an audit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotEntries {
    /// The audited endpoint as given.
    pub endpoint: String,
    /// Server identity from the handshake.
    pub server: ServerSummary,
    /// Raw capabilities map from the handshake.
    pub capabilities: Map<String, Value>,
    /// Listed tools.
    pub tools: Vec<ToolDescriptor>,
    /// Listed resources.
    pub resources: Vec<Value>,
    /// Listed prompts.
    pub prompts: Vec<Value>,
    /// Payment findings.
    pub x402: PaymentEntries,
    /// OAuth findings.
    pub oauth: OAuthProfile,
    /// Round-trip timings.
    pub latency: Latency,
    /// When the snapshot was taken.
    pub timestamp: Option<SnapshotTimestamp>,
}

/// Server identity. Empty strings are stored as `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSummary {
    /// `serverInfo.name`.
    pub server_name: Option<String>,
    /// `serverInfo.version`.
    pub server_version: Option<String>,
    /// `serverInfo.description`.
    pub server_description: Option<String>,
    /// Negotiated protocol version.
    pub protocol_version: Option<String>,
    /// Usage instructions.
    pub instructions: Option<String>,
}

impl ServerSummary {
    /// Reads the identity announced during the handshake.
    #[must_use]
    pub fn from_session(session: &dyn McpSession) -> Self {
        let info = session.server_version();
        Self {
            server_name: non_empty(info.and_then(|i| i.name.as_deref())),
            server_version: non_empty(info.and_then(|i| i.version.as_deref())),
            server_description: non_empty(info.and_then(|i| i.description.as_deref())),
            protocol_version: non_empty(session.protocol_version()),
            instructions: non_empty(session.instructions()),
        }
    }

    /// Field name / value pairs in a fixed order.
    pub(crate) fn fields(&self) -> [(&'static str, Option<&str>); 5] {
        [
            ("serverName", self.server_name.as_deref()),
            ("serverVersion", self.server_version.as_deref()),
            ("serverDescription", self.server_description.as_deref()),
            ("protocolVersion", self.protocol_version.as_deref()),
            ("instructions", self.instructions.as_deref()),
        ]
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.filter(|s| !s.is_empty()).map(str::to_owned)
}

/// x402 findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentEntries {
    /// x402 version of the first restricted call.
    pub version: Option<u64>,
    /// Every restricted call, in probe order.
    pub restricted_calls: Vec<RestrictedCall>,
    /// Every offered option, valid or not.
    pub payment_options: Vec<Value>,
    /// Distinct networks of the valid options, first seen first.
    pub networks: Vec<String>,
    /// Distinct schemes of the valid options, first seen first.
    pub schemes: Vec<String>,
    /// Payment terms keyed by tool name.
    pub per_tool: BTreeMap<String, ToolPaymentProfile>,
}

/// Payment terms of a single tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolPaymentProfile {
    /// Declared `x402Version`, if truthy.
    pub x402_version: Option<Value>,
    /// Declared `resource`, if truthy.
    pub resource: Option<Value>,
    /// Networks in `accepts` order.
    pub networks: Vec<String>,
    /// Terms per network; a later option for the same network wins.
    pub by_network: BTreeMap<String, NetworkTerms>,
}

/// Terms of one payment option. Falsy fields are stored as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(missing_docs)]
pub struct NetworkTerms {
    pub scheme: Option<Value>,
    pub amount: Option<Value>,
    pub asset: Option<Value>,
    pub pay_to: Option<Value>,
    pub max_timeout_seconds: Option<Value>,
    pub extra: Option<Value>,
}

impl NetworkTerms {
    fn from_option(option: &Value) -> Self {
        let field = |key: &str| truthy(option.get(key)).cloned();
        Self {
            scheme: field("scheme"),
            amount: field("amount"),
            asset: field("asset"),
            pay_to: field("payTo"),
            max_timeout_seconds: field("maxTimeoutSeconds"),
            extra: field("extra"),
        }
    }

    /// Field name / value pairs in a fixed order.
    pub(crate) fn fields(&self) -> [(&'static str, Option<&Value>); 6] {
        [
            ("scheme", self.scheme.as_ref()),
            ("amount", self.amount.as_ref()),
            ("asset", self.asset.as_ref()),
            ("payTo", self.pay_to.as_ref()),
            ("maxTimeoutSeconds", self.max_timeout_seconds.as_ref()),
            ("extra", self.extra.as_ref()),
        ]
    }
}

/// Round-trip timings in milliseconds; `null` when the request failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Latency {
    /// One `ping` round trip.
    pub ping: Option<u64>,
    /// One `tools/list` round trip.
    pub list_tools: Option<u64>,
}

/// Everything an audit collected, ready to be folded into a snapshot.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default)]
pub struct SnapshotParts {
    pub endpoint: String,
    pub server: ServerSummary,
    pub capabilities: Map<String, Value>,
    pub tools: Vec<ToolDescriptor>,
    pub resources: Vec<Value>,
    pub prompts: Vec<Value>,
    pub restricted_calls: Vec<RestrictedCall>,
    pub payment_options: Vec<Value>,
    pub valid_payment_options: Vec<Value>,
    pub oauth: OAuthProfile,
    pub latency: Latency,
    pub categories: DerivedCategories,
}

impl AuditSnapshot {
    /// Assembles a snapshot of a reachable server, stamped now.
    #[must_use]
    pub fn build(parts: SnapshotParts) -> Self {
        let networks = distinct(&parts.valid_payment_options, "network");
        let schemes = distinct(&parts.valid_payment_options, "scheme");
        let per_tool = per_tool(&parts.restricted_calls);
        let version = x402_version(&parts.restricted_calls);

        Self {
            categories: parts.categories,
            entries: SnapshotEntries {
                endpoint: parts.endpoint,
                server: parts.server,
                capabilities: parts.capabilities,
                tools: parts.tools,
                resources: parts.resources,
                prompts: parts.prompts,
                x402: PaymentEntries {
                    version,
                    restricted_calls: parts.restricted_calls,
                    payment_options: parts.payment_options,
                    networks,
                    schemes,
                    per_tool,
                },
                oauth: parts.oauth,
                latency: parts.latency,
                timestamp: Some(SnapshotTimestamp::now()),
            },
        }
    }

    /// A snapshot of a server that could not be audited, stamped now.
    #[must_use]
    pub fn empty(
        endpoint: impl Into<String>,
        oauth: OAuthProfile,
        categories: DerivedCategories,
    ) -> Self {
        Self {
            categories,
            entries: SnapshotEntries {
                endpoint: endpoint.into(),
                oauth,
                timestamp: Some(SnapshotTimestamp::now()),
                ..SnapshotEntries::default()
            },
        }
    }
}

fn distinct(options: &[Value], key: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in options.iter().filter_map(|o| o.get(key).and_then(Value::as_str)) {
        if !out.iter().any(|v| v == value) {
            out.push(value.to_owned());
        }
    }
    out
}

fn per_tool(restricted_calls: &[RestrictedCall]) -> BTreeMap<String, ToolPaymentProfile> {
    let mut map = BTreeMap::new();
    for call in restricted_calls {
        let pr = &call.payment_required;
        if truthy(Some(pr)).is_none() {
            continue;
        }

        let mut profile = ToolPaymentProfile {
            x402_version: truthy(pr.get("x402Version")).cloned(),
            resource: truthy(pr.get("resource")).cloned(),
            ..ToolPaymentProfile::default()
        };
        for option in pr.get("accepts").and_then(Value::as_array).into_iter().flatten() {
            let Some(network) = option.get("network").and_then(Value::as_str).filter(|n| !n.is_empty()) else {
                continue;
            };
            if !profile.networks.iter().any(|n| n == network) {
                profile.networks.push(network.to_owned());
            }
            profile
                .by_network
                .insert(network.to_owned(), NetworkTerms::from_option(option));
        }
        map.insert(call.tool_name.clone(), profile);
    }
    map
}

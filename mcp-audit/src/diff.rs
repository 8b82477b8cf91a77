//! Structural comparison of two audit snapshots.
//!
//! [`compare`] reports what changed between an earlier and a later snapshot
//! of the same server. Six areas are diffed independently: server identity,
//! capabilities, tools, x402 terms, latency and categories. Integrity
//! problems (different endpoints, missing or inverted timestamps) are
//! reported as `CMP-*` diagnostics but never stop the comparison.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::diagnostic::{Category, Code, Diagnostic};
use crate::snapshot::{AuditSnapshot, Latency, PaymentEntries, ToolPaymentProfile};
use crate::types::ToolDescriptor;
use crate::value::truthy;

/// Result of [`compare`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonReport {
    /// Always `true`; integrity findings are carried in `messages`.
    pub status: bool,
    /// `CMP-*` findings.
    pub messages: Vec<Diagnostic>,
    /// `true` if any area reports a change.
    pub has_changes: bool,
    /// Per-area changes.
    pub diff: SnapshotDiff,
}

/// Per-area changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SnapshotDiff {
    /// Server identity fields.
    pub server: ChangedFields,
    /// Capabilities map.
    pub capabilities: CapabilitiesDiff,
    /// Declared tools.
    pub tools: ToolsDiff,
    /// Payment terms.
    pub x402: PaymentDiff,
    /// Round-trip timings.
    pub latency: LatencyDiff,
    /// Derived categories.
    pub categories: ChangedFields,
}

impl SnapshotDiff {
    /// Returns `true` if any area reports a change.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.server.changed.is_empty()
            || !self.capabilities.is_empty()
            || !self.tools.is_empty()
            || !self.x402.is_empty()
            || !self.latency.changed.is_empty()
            || !self.categories.changed.is_empty()
    }
}

/// A value before and after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueChange {
    /// Earlier value.
    pub before: Value,
    /// Later value.
    pub after: Value,
}

impl ValueChange {
    fn new(before: impl Into<Value>, after: impl Into<Value>) -> Self {
        Self {
            before: before.into(),
            after: after.into(),
        }
    }
}

/// Keyed scalar changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangedFields {
    /// Changed fields by name.
    pub changed: BTreeMap<String, ValueChange>,
}

/// Changes to the capabilities map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilitiesDiff {
    /// Capabilities only in the later snapshot.
    pub added: Map<String, Value>,
    /// Capabilities only in the earlier snapshot.
    pub removed: Map<String, Value>,
    /// Capabilities whose value changed.
    pub modified: BTreeMap<String, ValueChange>,
}

impl CapabilitiesDiff {
    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Changes to the declared tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolsDiff {
    /// Tool names only in the later snapshot.
    pub added: Vec<String>,
    /// Tool names only in the earlier snapshot.
    pub removed: Vec<String>,
    /// Tools present in both whose declaration changed.
    pub modified: Vec<ToolChanges>,
}

impl ToolsDiff {
    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Changes to one tool declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolChanges {
    /// Tool name.
    pub name: String,
    /// Individual changes, never empty.
    pub changes: Vec<FieldChange>,
}

/// Whether keys appeared or disappeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Present only after.
    Added,
    /// Present only before.
    Removed,
}

/// One field-level change inside a tool or per-tool payment profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldChange {
    /// A scalar or structured value changed.
    Value {
        /// Dotted field path.
        field: String,
        /// Earlier value.
        before: Value,
        /// Later value.
        after: Value,
    },
    /// Schema properties appeared or disappeared.
    Keys {
        /// Dotted field path.
        field: String,
        /// Direction of the change.
        #[serde(rename = "type")]
        kind: ChangeKind,
        /// Affected property names.
        keys: Vec<String>,
    },
    /// Payment networks appeared or disappeared.
    Networks {
        /// Always `networks`.
        field: String,
        /// Direction of the change.
        #[serde(rename = "type")]
        kind: ChangeKind,
        /// Affected networks.
        networks: Vec<String>,
    },
    /// The `required` list of an input schema changed.
    Required {
        /// Always `inputSchema.required`.
        field: String,
        /// Earlier list.
        before: Vec<Value>,
        /// Later list.
        after: Vec<Value>,
        /// Members only in the later list.
        added: Vec<Value>,
        /// Members only in the earlier list.
        removed: Vec<Value>,
    },
}

impl FieldChange {
    fn value(field: impl Into<String>, before: Option<&Value>, after: Option<&Value>) -> Self {
        Self::Value {
            field: field.into(),
            before: before.cloned().unwrap_or(Value::Null),
            after: after.cloned().unwrap_or(Value::Null),
        }
    }
}

/// Changes to the payment terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDiff {
    /// Tools that became payment-gated.
    pub tools_added: Vec<String>,
    /// Tools that stopped being payment-gated.
    pub tools_removed: Vec<String>,
    /// Gated tools whose terms changed.
    pub tools_modified: Vec<ToolPaymentChanges>,
    /// Changes to the top-level `networks` and `schemes` lists.
    pub changed: BTreeMap<String, ValueChange>,
}

impl PaymentDiff {
    fn is_empty(&self) -> bool {
        self.tools_added.is_empty()
            && self.tools_removed.is_empty()
            && self.tools_modified.is_empty()
            && self.changed.is_empty()
    }
}

/// Changes to one tool's payment terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPaymentChanges {
    /// Tool name.
    pub tool_name: String,
    /// Individual changes, never empty.
    pub changes: Vec<FieldChange>,
}

/// A timing change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencyChange {
    /// Earlier timing in ms.
    pub before: u64,
    /// Later timing in ms.
    pub after: u64,
    /// `after - before`, negative when faster.
    pub delta: i64,
}

/// Changes to the timings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LatencyDiff {
    /// Changed timings by name.
    pub changed: BTreeMap<String, LatencyChange>,
}

const fn cmp(number: u16) -> Code {
    Code::new(Category::Compare, number)
}

/// Compares two snapshots of the same server.
#[must_use]
pub fn compare(before: &AuditSnapshot, after: &AuditSnapshot) -> ComparisonReport {
    let messages = check_integrity(before, after);

    let (b, a) = (&before.entries, &after.entries);
    let diff = SnapshotDiff {
        server: diff_fields(
            b.server.fields().map(|(k, v)| (k, non_empty(v))),
            a.server.fields().map(|(k, v)| (k, non_empty(v))),
        ),
        capabilities: diff_capabilities(&b.capabilities, &a.capabilities),
        tools: diff_tools(&b.tools, &a.tools),
        x402: diff_payments(&b.x402, &a.x402),
        latency: diff_latency(b.latency, a.latency),
        categories: diff_categories(before, after),
    };
    let has_changes = diff.has_changes();

    #[cfg(feature = "telemetry")]
    tracing::debug!(has_changes, findings = messages.len(), "Compared snapshots");

    ComparisonReport {
        status: true,
        messages,
        has_changes,
        diff,
    }
}

fn check_integrity(before: &AuditSnapshot, after: &AuditSnapshot) -> Vec<Diagnostic> {
    let mut messages = Vec::new();
    if before.entries.endpoint != after.entries.endpoint {
        messages.push(Diagnostic::new(
            cmp(1),
            "compare",
            "Snapshots are from different servers",
        ));
    }

    let stamp = |s: &AuditSnapshot| s.entries.timestamp.clone().filter(|t| !t.is_empty());
    let (before_ts, after_ts) = (stamp(before), stamp(after));
    if before_ts.is_none() {
        messages.push(Diagnostic::new(
            cmp(2),
            "compare",
            "Before snapshot has no timestamp",
        ));
    }
    if let (Some(b), Some(a)) = (before_ts, after_ts)
        && a < b
    {
        messages.push(Diagnostic::new(
            cmp(3),
            "compare",
            "After snapshot is older than before",
        ));
    }
    messages
}

fn non_empty(s: Option<&str>) -> Value {
    s.filter(|s| !s.is_empty()).map_or(Value::Null, Value::from)
}

fn diff_fields<const N: usize>(
    before: [(&'static str, Value); N],
    after: [(&'static str, Value); N],
) -> ChangedFields {
    let changed = before
        .into_iter()
        .zip(after)
        .filter(|((_, b), (_, a))| b != a)
        .map(|((key, b), (_, a))| (key.to_owned(), ValueChange::new(b, a)))
        .collect();
    ChangedFields { changed }
}

fn diff_capabilities(before: &Map<String, Value>, after: &Map<String, Value>) -> CapabilitiesDiff {
    let mut diff = CapabilitiesDiff::default();
    for (key, value) in after {
        match before.get(key) {
            None => {
                diff.added.insert(key.clone(), value.clone());
            }
            Some(old) if old != value => {
                diff.modified
                    .insert(key.clone(), ValueChange::new(old.clone(), value.clone()));
            }
            Some(_) => {}
        }
    }
    for (key, value) in before {
        if !after.contains_key(key) {
            diff.removed.insert(key.clone(), value.clone());
        }
    }
    diff
}

fn diff_tools(before: &[ToolDescriptor], after: &[ToolDescriptor]) -> ToolsDiff {
    let find = |tools: &[ToolDescriptor], name: &str| tools.iter().position(|t| t.name == name);

    let added = after
        .iter()
        .filter(|t| find(before, &t.name).is_none())
        .map(|t| t.name.clone())
        .collect();
    let removed = before
        .iter()
        .filter(|t| find(after, &t.name).is_none())
        .map(|t| t.name.clone())
        .collect();
    let modified = after
        .iter()
        .filter_map(|new| {
            let old = &before[find(before, &new.name)?];
            let changes = diff_tool(old, new);
            (!changes.is_empty()).then(|| ToolChanges {
                name: new.name.clone(),
                changes,
            })
        })
        .collect();

    ToolsDiff {
        added,
        removed,
        modified,
    }
}

fn diff_tool(before: &ToolDescriptor, after: &ToolDescriptor) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    let description = |t: &ToolDescriptor| non_empty(t.description.as_deref());
    let (b, a) = (description(before), description(after));
    if b != a {
        changes.push(FieldChange::value("description", Some(&b), Some(&a)));
    }

    let empty = Value::Object(Map::new());
    let schema = |t: &ToolDescriptor| -> Value {
        truthy(t.input_schema.as_ref()).cloned().unwrap_or_else(|| empty.clone())
    };
    diff_input_schema(&schema(before), &schema(after), &mut changes);
    changes
}

const PROPERTY_FIELDS: [&str; 6] = ["type", "enum", "default", "minimum", "maximum", "description"];

fn diff_input_schema(before: &Value, after: &Value, changes: &mut Vec<FieldChange>) {
    let empty = Map::new();
    let props = |schema: &Value| -> Map<String, Value> {
        truthy(schema.get("properties"))
            .and_then(Value::as_object)
            .unwrap_or(&empty)
            .clone()
    };
    let (before_props, after_props) = (props(before), props(after));

    let added: Vec<String> = after_props
        .keys()
        .filter(|k| !before_props.contains_key(*k))
        .cloned()
        .collect();
    let removed: Vec<String> = before_props
        .keys()
        .filter(|k| !after_props.contains_key(*k))
        .cloned()
        .collect();
    if !added.is_empty() {
        changes.push(FieldChange::Keys {
            field: "inputSchema.properties".into(),
            kind: ChangeKind::Added,
            keys: added,
        });
    }
    if !removed.is_empty() {
        changes.push(FieldChange::Keys {
            field: "inputSchema.properties".into(),
            kind: ChangeKind::Removed,
            keys: removed,
        });
    }

    for (key, new) in &after_props {
        let Some(old) = before_props.get(key) else {
            continue;
        };
        for field in PROPERTY_FIELDS {
            let coalesce = matches!(field, "enum" | "description");
            let pick = |prop: &Value| {
                let v = prop.get(field);
                if coalesce { truthy(v).cloned() } else { v.cloned() }
            };
            let (b, a) = (pick(old), pick(new));
            if b != a {
                changes.push(FieldChange::value(
                    format!("inputSchema.properties.{key}.{field}"),
                    b.as_ref(),
                    a.as_ref(),
                ));
            }
        }
    }

    let required = |schema: &Value| -> Vec<Value> {
        truthy(schema.get("required"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    };
    let (before_req, after_req) = (required(before), required(after));
    if before_req != after_req {
        let added = after_req
            .iter()
            .filter(|v| !before_req.contains(v))
            .cloned()
            .collect();
        let removed = before_req
            .iter()
            .filter(|v| !after_req.contains(v))
            .cloned()
            .collect();
        changes.push(FieldChange::Required {
            field: "inputSchema.required".into(),
            before: before_req,
            after: after_req,
            added,
            removed,
        });
    }
}

fn diff_payments(before: &PaymentEntries, after: &PaymentEntries) -> PaymentDiff {
    let tools_added = after
        .per_tool
        .keys()
        .filter(|k| !before.per_tool.contains_key(*k))
        .cloned()
        .collect();
    let tools_removed = before
        .per_tool
        .keys()
        .filter(|k| !after.per_tool.contains_key(*k))
        .cloned()
        .collect();
    let tools_modified = after
        .per_tool
        .iter()
        .filter_map(|(name, new)| {
            let changes = diff_tool_payment(before.per_tool.get(name)?, new);
            (!changes.is_empty()).then(|| ToolPaymentChanges {
                tool_name: name.clone(),
                changes,
            })
        })
        .collect();

    let mut changed = BTreeMap::new();
    if before.networks != after.networks {
        changed.insert(
            "networks".to_owned(),
            ValueChange::new(before.networks.clone(), after.networks.clone()),
        );
    }
    if before.schemes != after.schemes {
        changed.insert(
            "schemes".to_owned(),
            ValueChange::new(before.schemes.clone(), after.schemes.clone()),
        );
    }

    PaymentDiff {
        tools_added,
        tools_removed,
        tools_modified,
        changed,
    }
}

fn diff_tool_payment(before: &ToolPaymentProfile, after: &ToolPaymentProfile) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    if before.resource != after.resource {
        changes.push(FieldChange::value(
            "resource",
            before.resource.as_ref(),
            after.resource.as_ref(),
        ));
    }
    if before.x402_version != after.x402_version {
        changes.push(FieldChange::value(
            "x402Version",
            before.x402_version.as_ref(),
            after.x402_version.as_ref(),
        ));
    }

    let only_in = |a: &[String], b: &[String]| -> Vec<String> {
        a.iter().filter(|n| !b.contains(n)).cloned().collect()
    };
    let added = only_in(&after.networks, &before.networks);
    let removed = only_in(&before.networks, &after.networks);
    if !added.is_empty() {
        changes.push(FieldChange::Networks {
            field: "networks".into(),
            kind: ChangeKind::Added,
            networks: added,
        });
    }
    if !removed.is_empty() {
        changes.push(FieldChange::Networks {
            field: "networks".into(),
            kind: ChangeKind::Removed,
            networks: removed,
        });
    }

    for network in after.networks.iter().filter(|n| before.networks.contains(n)) {
        let old = before.by_network.get(network).cloned().unwrap_or_default();
        let new = after.by_network.get(network).cloned().unwrap_or_default();
        for ((field, b), (_, a)) in old.fields().into_iter().zip(new.fields()) {
            let (b, a) = (truthy(b), truthy(a));
            if b != a {
                changes.push(FieldChange::value(format!("byNetwork.{network}.{field}"), b, a));
            }
        }
    }

    changes
}

fn diff_latency(before: Latency, after: Latency) -> LatencyDiff {
    let mut changed = BTreeMap::new();
    let pairs = [
        ("ping", before.ping, after.ping),
        ("listTools", before.list_tools, after.list_tools),
    ];
    for (key, b, a) in pairs {
        if let (Some(b), Some(a)) = (b, a)
            && b != a
        {
            let delta = i64::try_from(a)
                .unwrap_or(i64::MAX)
                .saturating_sub(i64::try_from(b).unwrap_or(i64::MAX));
            changed.insert(
                key.to_owned(),
                LatencyChange {
                    before: b,
                    after: a,
                    delta,
                },
            );
        }
    }
    LatencyDiff { changed }
}

fn diff_categories(before: &AuditSnapshot, after: &AuditSnapshot) -> ChangedFields {
    let as_map = |s: &AuditSnapshot| match serde_json::to_value(&s.categories) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    let (b, a) = (as_map(before), as_map(after));
    let changed = b
        .into_iter()
        .filter_map(|(key, old)| {
            let new = a.get(&key).cloned().unwrap_or(Value::Null);
            (old != new).then(|| (key, ValueChange::new(old, new)))
        })
        .collect();
    ChangedFields { changed }
}

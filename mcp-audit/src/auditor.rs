//! Audit orchestration.
//!
//! [`Auditor::start`] runs one audit end to end: OAuth discovery,
//! reachability, handshake, enumeration, tool probing, payment validation
//! and latency sampling, folded into an [`AuditSnapshot`]. Every step after
//! input validation reports problems as diagnostics; only malformed input
//! fails the call.
//!
//! [`compare_json`] is the untyped entry point for diffing two previously
//! stored reports or snapshots.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::classify::DerivedCategories;
use crate::diagnostic::{Category, Code, Diagnostic};
use crate::diff::{ComparisonReport, compare};
use crate::discovery::{check_reachable, connect, discover, measure_latency};
use crate::error::AuditError;
use crate::fetch::NetworkFetcher;
use crate::oauth;
use crate::payment;
use crate::probe;
use crate::session::{McpConnector, McpSession};
use crate::snapshot::{AuditSnapshot, ServerSummary, SnapshotParts};
use crate::value::is_truthy;

/// Outcome of one audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    /// `true` if the audit produced no diagnostic at all.
    pub status: bool,
    /// Connection, OAuth, discovery, probe and payment findings, in that order.
    pub messages: Vec<Diagnostic>,
    /// The snapshot, flattened into `categories` and `entries`.
    #[serde(flatten)]
    pub snapshot: AuditSnapshot,
}

/// Runs audits through a [`NetworkFetcher`] and an [`McpConnector`].
#[derive(Debug, Clone)]
pub struct Auditor<F, C> {
    fetcher: F,
    connector: C,
}

const fn val(number: u16) -> Code {
    Code::new(Category::Validation, number)
}

impl<F, C> Auditor<F, C>
where
    F: NetworkFetcher,
    C: McpConnector,
{
    /// Creates an auditor from its collaborators.
    pub const fn new(fetcher: F, connector: C) -> Self {
        Self { fetcher, connector }
    }

    /// Audits the MCP server at `endpoint`, bounding each network attempt
    /// by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidInput`] if `endpoint` is blank, not a URL
    /// or not `http(s)`, or if `timeout` is zero.
    pub async fn start(&self, endpoint: &str, timeout: Duration) -> Result<AuditReport, AuditError> {
        let url = validate_start(endpoint, timeout)?;

        #[cfg(feature = "telemetry")]
        tracing::info!(endpoint = %url, timeout_ms = timeout.as_millis(), "Starting audit");

        let discovery = oauth::probe(&self.fetcher, &url, timeout).await;
        let mut categories = DerivedCategories::default();
        categories.record_oauth(discovery.supports_oauth, &discovery.profile);

        let session = match check_reachable(&self.fetcher, &url, timeout).await {
            Err(unreachable) => {
                return Ok(failed(endpoint, unreachable, discovery, categories));
            }
            Ok(_) => match connect(&self.connector, &url, timeout).await {
                Err(handshake) => {
                    categories.record_connection(true, false);
                    return Ok(failed(endpoint, handshake, discovery, categories));
                }
                Ok(session) => session,
            },
        };
        categories.record_connection(true, true);

        let mut messages = discovery.messages;
        let parts = run_pipeline(session.as_ref(), timeout, &mut messages, categories).await;
        session.close().await;

        let snapshot = AuditSnapshot::build(SnapshotParts {
            endpoint: endpoint.to_owned(),
            oauth: discovery.profile,
            ..parts
        });

        #[cfg(feature = "telemetry")]
        tracing::info!(endpoint = %url, findings = messages.len(), "Audit finished");

        Ok(AuditReport {
            status: messages.is_empty(),
            messages,
            snapshot,
        })
    }

    /// Compares two snapshots.
    #[must_use]
    pub fn compare(&self, before: &AuditSnapshot, after: &AuditSnapshot) -> ComparisonReport {
        compare(before, after)
    }

    /// Compares two snapshots given as raw JSON. See [`compare_json`].
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidInput`] if either value is not a snapshot.
    pub fn compare_json(&self, before: &Value, after: &Value) -> Result<ComparisonReport, AuditError> {
        compare_json(before, after)
    }
}

async fn run_pipeline(
    session: &dyn McpSession,
    timeout: Duration,
    messages: &mut Vec<Diagnostic>,
    mut categories: DerivedCategories,
) -> SnapshotParts {
    let inventory = discover(session).await;
    messages.extend(inventory.messages);

    let server = ServerSummary::from_session(session);
    categories.record_inventory(&inventory.tools, &inventory.resources, &inventory.prompts);
    categories.record_server(
        &inventory.capabilities,
        server.instructions.as_deref(),
        server.protocol_version.as_deref(),
    );

    let probed = probe::probe(session, &inventory.tools, timeout).await;
    messages.extend(probed.messages);

    let validation = payment::validate(&probed.restricted_calls);
    messages.extend(validation.messages);
    categories.record_payments(&probed.restricted_calls, &validation.valid_payment_options);

    let latency = measure_latency(session).await;

    SnapshotParts {
        server,
        capabilities: inventory.capabilities,
        tools: inventory.tools,
        resources: inventory.resources,
        prompts: inventory.prompts,
        restricted_calls: probed.restricted_calls,
        payment_options: probed.payment_options,
        valid_payment_options: validation.valid_payment_options,
        latency,
        categories,
        ..SnapshotParts::default()
    }
}

fn failed(
    endpoint: &str,
    connection: Diagnostic,
    discovery: oauth::OAuthDiscovery,
    categories: DerivedCategories,
) -> AuditReport {
    #[cfg(feature = "telemetry")]
    tracing::warn!(endpoint, reason = %connection, "Audit stopped before the handshake completed");

    let mut messages = vec![connection];
    messages.extend(discovery.messages);
    AuditReport {
        status: false,
        messages,
        snapshot: AuditSnapshot::empty(endpoint, discovery.profile, categories),
    }
}

fn validate_start(endpoint: &str, timeout: Duration) -> Result<Url, AuditError> {
    let mut messages = Vec::new();
    let mut url = None;

    if endpoint.trim().is_empty() {
        messages.push(Diagnostic::new(val(3), "endpoint", "Must not be empty"));
    } else {
        match Url::parse(endpoint.trim()) {
            Err(_) => messages.push(Diagnostic::new(val(4), "endpoint", "Must be a valid URL")),
            Ok(parsed) if !matches!(parsed.scheme(), "http" | "https") => messages.push(
                Diagnostic::new(val(7), "endpoint", "Must use http or https"),
            ),
            Ok(parsed) => url = Some(parsed),
        }
    }

    if timeout.is_zero() {
        messages.push(Diagnostic::new(val(6), "timeout", "Must be greater than 0"));
    }

    match url {
        Some(url) if messages.is_empty() => Ok(url),
        _ => Err(AuditError::InvalidInput(messages)),
    }
}

/// Compares two snapshots given as raw JSON.
///
/// Accepts bare snapshots as well as full [`AuditReport`]s; extra keys are
/// ignored.
///
/// # Errors
///
/// Returns [`AuditError::InvalidInput`] with `VAL-010` to `VAL-017` if either
/// value is missing (`null`), not an object, lacks `categories` or `entries`,
/// or does not decode as a snapshot.
pub fn compare_json(before: &Value, after: &Value) -> Result<ComparisonReport, AuditError> {
    let mut messages = Vec::new();
    check_shape(before, "before", 10, &mut messages);
    check_shape(after, "after", 13, &mut messages);
    if !messages.is_empty() {
        return Err(AuditError::InvalidInput(messages));
    }

    let before = decode(before, "before", 16, &mut messages);
    let after = decode(after, "after", 17, &mut messages);
    match (before, after) {
        (Some(before), Some(after)) => Ok(compare(&before, &after)),
        _ => Err(AuditError::InvalidInput(messages)),
    }
}

fn check_shape(value: &Value, name: &str, base: u16, messages: &mut Vec<Diagnostic>) {
    match value {
        Value::Null => messages.push(Diagnostic::new(val(base), name, "Missing value")),
        Value::Object(obj) => {
            let present = |key: &str| obj.get(key).is_some_and(is_truthy);
            if !present("categories") || !present("entries") {
                messages.push(Diagnostic::new(
                    val(base + 2),
                    name,
                    "Missing categories or entries",
                ));
            }
        }
        _ => messages.push(Diagnostic::new(val(base + 1), name, "Must be an object")),
    }
}

fn decode(value: &Value, name: &str, number: u16, messages: &mut Vec<Diagnostic>) -> Option<AuditSnapshot> {
    match AuditSnapshot::deserialize(value) {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            messages.push(Diagnostic::new(
                val(number),
                name,
                format!("Invalid snapshot shape — {err}"),
            ));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxFuture;
    use crate::diagnostic::contains_code;
    use crate::error::{ConnectError, FetchError, ToolCallError};
    use crate::oauth::tests::FakeFetcher;
    use crate::probe::tests::{FakeSession, payment_required};
    use crate::types::Implementation;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct FakeConnector {
        session: Option<Arc<FakeSession>>,
        connects: Mutex<u32>,
    }

    impl McpConnector for FakeConnector {
        fn connect<'a>(
            &'a self,
            _endpoint: &'a Url,
            _timeout: Duration,
        ) -> BoxFuture<'a, Result<Box<dyn McpSession>, ConnectError>> {
            Box::pin(async move {
                *self.connects.lock().unwrap() += 1;
                match &self.session {
                    Some(session) => Ok(Box::new(Arc::clone(session)) as Box<dyn McpSession>),
                    None => Err(ConnectError::Handshake("unexpected content type text/html".into())),
                }
            })
        }
    }

    const ENDPOINT: &str = "https://mcp.example.com/mcp";

    fn paid_server() -> Arc<FakeSession> {
        let mut session = FakeSession {
            tools: Some(Ok(json!({"tools": [
                {"name": "forecast", "inputSchema": {
                    "type": "object",
                    "properties": {"city": {"type": "string"}},
                    "required": ["city"]
                }},
                {"name": "echo"}
            ]}))),
            capabilities: json!({"tools": {"listChanged": true}, "logging": {}})
                .as_object()
                .unwrap()
                .clone(),
            server: Some(Implementation {
                name: Some("weather".into()),
                version: Some("1.2.0".into()),
                description: None,
            }),
            protocol: Some("2025-06-18".into()),
            ..FakeSession::default()
        };
        session.calls.insert(
            "forecast".into(),
            Err(ToolCallError::Rpc {
                code: -32402,
                message: "Payment required".into(),
                data: Some(payment_required()),
            }),
        );
        Arc::new(session)
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_input() {
        let auditor = Auditor::new(FakeFetcher::default(), FakeConnector::default());

        let err = auditor.start("  ", Duration::ZERO).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "VAL-003 endpoint: Must not be empty, VAL-006 timeout: Must be greater than 0"
        );

        let err = auditor.start("not a url", Duration::from_secs(1)).await.unwrap_err();
        assert!(contains_code(err.diagnostics(), "VAL-004"));

        let err = auditor
            .start("ftp://mcp.example.com", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(contains_code(err.diagnostics(), "VAL-007"));
    }

    #[tokio::test]
    async fn test_unreachable_server_yields_empty_snapshot() {
        let fetcher = FakeFetcher {
            head_status: Some(Err(FetchError::Timeout)),
            ..FakeFetcher::default()
        };
        let connector = FakeConnector::default();
        let auditor = Auditor::new(fetcher, connector);

        let report = auditor.start(ENDPOINT, Duration::from_secs(1)).await.unwrap();
        assert!(!report.status);
        assert_eq!(
            report.messages[0].to_string(),
            "CON-001 endpoint: Server is not reachable"
        );
        assert_eq!(report.snapshot.categories, DerivedCategories::default());
        assert_eq!(report.snapshot.entries.endpoint, ENDPOINT);
        assert!(report.snapshot.entries.tools.is_empty());
        assert_eq!(*auditor.connector.connects.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_handshake_failure_keeps_oauth_findings() {
        let fetcher = FakeFetcher::default().json(
            "https://mcp.example.com/.well-known/oauth-protected-resource",
            &json!({"authorization_servers": []}),
        );
        let auditor = Auditor::new(fetcher, FakeConnector::default());

        let report = auditor.start(ENDPOINT, Duration::from_secs(1)).await.unwrap();
        let rendered: Vec<String> = report.messages.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "CON-004 mcp: Initialize handshake failed — unexpected content type text/html",
                "AUTH-004 oauth: Missing authorization_servers in Protected Resource Metadata",
                "AUTH-010 oauth: Server requires authentication",
            ]
        );
        let categories = &report.snapshot.categories;
        assert!(categories.is_reachable);
        assert!(!categories.supports_mcp);
        assert!(categories.supports_oauth);
        assert!(categories.has_protected_resource_metadata);
        assert_eq!(
            report.snapshot.entries.oauth.protected_resource_metadata_url.as_deref(),
            Some("https://mcp.example.com/.well-known/oauth-protected-resource")
        );
    }

    #[tokio::test]
    async fn test_full_audit() {
        let session = paid_server();
        let connector = FakeConnector {
            session: Some(Arc::clone(&session)),
            ..FakeConnector::default()
        };
        let auditor = Auditor::new(FakeFetcher::default(), connector);

        let report = auditor.start(ENDPOINT, Duration::from_secs(1)).await.unwrap();
        assert!(report.status, "unexpected findings: {:?}", report.messages);
        assert!(report.messages.is_empty());
        assert!(*session.closed.lock().unwrap());
        assert_eq!(session.seen_names(), vec!["forecast", "echo"]);

        let categories = &report.snapshot.categories;
        assert!(categories.is_reachable);
        assert!(categories.supports_mcp);
        assert!(categories.has_tools);
        assert!(categories.supports_logging);
        assert!(categories.supports_tools_list_changed);
        assert!(categories.supports_x402);
        assert!(categories.has_valid_payment_requirements);
        assert!(categories.supports_evm);
        assert!(!categories.supports_oauth);
        assert_eq!(categories.x402_version, Some(2));
        assert_eq!(categories.protocol_version.as_deref(), Some("2025-06-18"));

        let entries = &report.snapshot.entries;
        assert_eq!(entries.server.server_name.as_deref(), Some("weather"));
        assert_eq!(entries.x402.restricted_calls.len(), 1);
        assert_eq!(entries.x402.restricted_calls[0].tool_name, "forecast");
        assert_eq!(entries.x402.networks, vec!["eip155:8453"]);
        assert!(entries.latency.ping.is_some());
        assert!(entries.timestamp.is_some());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], json!(true));
        assert!(json["categories"].is_object());
        assert_eq!(json["entries"]["endpoint"], json!(ENDPOINT));
    }

    #[tokio::test]
    async fn test_invalid_payment_fails_status() {
        let mut session = FakeSession {
            tools: Some(Ok(json!({"tools": [{"name": "paid"}]}))),
            ..FakeSession::default()
        };
        let mut pr = payment_required();
        pr["accepts"][0]["payTo"] = json!("0x7b4d4c1e3bd0c6e3c8e1e5da1f3a0e7c9b2d4f6a");
        session.calls.insert(
            "paid".into(),
            Err(ToolCallError::Http {
                status: 402,
                body: Some(pr),
            }),
        );
        let connector = FakeConnector {
            session: Some(Arc::new(session)),
            ..FakeConnector::default()
        };
        let auditor = Auditor::new(FakeFetcher::default(), connector);

        let report = auditor.start(ENDPOINT, Duration::from_secs(1)).await.unwrap();
        assert!(!report.status);
        assert!(contains_code(&report.messages, "PAY-083"));
        assert!(report.snapshot.categories.supports_x402);
        assert!(!report.snapshot.categories.has_valid_payment_requirements);
        assert!(report.snapshot.entries.x402.networks.is_empty());
        assert_eq!(report.snapshot.entries.x402.payment_options.len(), 1);
    }

    #[tokio::test]
    async fn test_compare_json_round_trip_of_reports() {
        let connector = FakeConnector {
            session: Some(paid_server()),
            ..FakeConnector::default()
        };
        let auditor = Auditor::new(FakeFetcher::default(), connector);
        let report = auditor.start(ENDPOINT, Duration::from_secs(1)).await.unwrap();
        let value = serde_json::to_value(&report).unwrap();

        let after = value.clone();
        let comparison = auditor.compare_json(&value, &after).unwrap();
        assert!(comparison.status);
        assert!(comparison.messages.is_empty());
        assert!(!comparison.has_changes);
    }

    #[test]
    fn test_compare_json_validation() {
        let err = compare_json(&Value::Null, &json!([1])).unwrap_err();
        let rendered: Vec<String> = err.diagnostics().iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["VAL-010 before: Missing value", "VAL-014 after: Must be an object"]
        );

        let err = compare_json(&json!({"categories": {}}), &json!({"entries": null})).unwrap_err();
        let rendered: Vec<String> = err.diagnostics().iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "VAL-012 before: Missing categories or entries",
                "VAL-015 after: Missing categories or entries",
            ]
        );

        let ok = json!({"categories": {}, "entries": {}});
        let bad = json!({"categories": {}, "entries": {"tools": "many"}});
        let err = compare_json(&ok, &bad).unwrap_err();
        assert_eq!(err.diagnostics().len(), 1);
        assert!(err.diagnostics()[0].has_code("VAL-017"));
    }
}

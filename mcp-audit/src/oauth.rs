//! OAuth discovery for MCP endpoints.
//!
//! Resolves the Protected Resource Metadata (RFC 9728) of the endpoint, follows
//! its first authorization server to the Authorization Server Metadata
//! (RFC 8414, with OpenID Connect discovery as fallback) and checks the
//! properties MCP clients depend on: PKCE `S256` and a client registration
//! mechanism.
//!
//! Every candidate URL gets one attempt bounded by the timeout. Failed
//! attempts are silent; a server that exposes no metadata at all simply does
//! not support OAuth.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::diagnostic::{Category, Code, Diagnostic};
use crate::fetch::NetworkFetcher;
use crate::value::{is_truthy, string_list, truthy, truthy_str};

const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";
const AUTHORIZATION_SERVER_PATH: &str = "/.well-known/oauth-authorization-server";
const OPENID_CONFIGURATION_PATH: &str = "/.well-known/openid-configuration";

/// Fields an authorization server must publish to be usable.
const REQUIRED_AS_FIELDS: [&str; 3] = [
    "authorization_endpoint",
    "token_endpoint",
    "response_types_supported",
];

/// OAuth facts recorded in a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OAuthProfile {
    /// Authorization server issuer.
    pub issuer: Option<String>,
    /// Authorization endpoint.
    pub authorization_endpoint: Option<String>,
    /// Token endpoint.
    pub token_endpoint: Option<String>,
    /// Dynamic client registration endpoint.
    pub registration_endpoint: Option<String>,
    /// Token revocation endpoint.
    pub revocation_endpoint: Option<String>,
    /// Scopes from the resource metadata, else from the authorization server.
    pub scopes_supported: Vec<String>,
    /// Supported grant types.
    pub grant_types_supported: Vec<String>,
    /// Supported response types.
    pub response_types_supported: Vec<String>,
    /// Supported PKCE code challenge methods.
    pub pkce_methods_supported: Vec<String>,
    /// Whether Client ID Metadata Documents are accepted.
    pub client_id_metadata_document_supported: bool,
    /// Whether a registration endpoint is published.
    pub dynamic_registration_supported: bool,
    /// The resource metadata URL that answered.
    pub protected_resource_metadata_url: Option<String>,
    /// The authorization server metadata URL that answered.
    pub authorization_server_metadata_url: Option<String>,
    /// MCP version advertised by the authorization server.
    pub mcp_version: Option<String>,
}

/// Result of [`probe`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuthDiscovery {
    /// `AUTH-*` findings, including the informational `AUTH-010`/`AUTH-011`.
    pub messages: Vec<Diagnostic>,
    /// `true` if either metadata document was found.
    pub supports_oauth: bool,
    /// Normalized profile.
    pub profile: OAuthProfile,
}

const fn auth(number: u16) -> Code {
    Code::new(Category::Auth, number)
}

/// A metadata document and the URL it came from.
struct Found {
    url: String,
    metadata: Value,
}

/// Runs OAuth discovery against `endpoint`.
pub async fn probe<F>(fetcher: &F, endpoint: &Url, timeout: Duration) -> OAuthDiscovery
where
    F: NetworkFetcher + ?Sized,
{
    let mut messages = Vec::new();
    let mut profile = OAuthProfile::default();

    let resource = fetch_first_json(fetcher, &protected_resource_urls(endpoint), timeout).await;

    let mut issuer = None;
    if let Some(prm) = &resource {
        profile.protected_resource_metadata_url = Some(prm.url.clone());
        match prm
            .metadata
            .get("authorization_servers")
            .and_then(Value::as_array)
            .and_then(|servers| servers.first())
        {
            Some(first) => issuer = Some(first),
            None => messages.push(Diagnostic::new(
                auth(4),
                "oauth",
                "Missing authorization_servers in Protected Resource Metadata",
            )),
        }
    }

    let mut server = None;
    if let Some(issuer) = issuer {
        match issuer.as_str().and_then(|s| Url::parse(s).ok()) {
            Some(issuer_url) => {
                server =
                    fetch_first_json(fetcher, &authorization_server_urls(&issuer_url), timeout)
                        .await;
                match &server {
                    None => messages.push(Diagnostic::new(
                        auth(2),
                        "oauth",
                        "Authorization Server Metadata not found (RFC8414)",
                    )),
                    Some(asm) => {
                        let missing: Vec<&str> = REQUIRED_AS_FIELDS
                            .into_iter()
                            .filter(|field| truthy(asm.metadata.get(*field)).is_none())
                            .collect();
                        if !missing.is_empty() {
                            messages.push(Diagnostic::new(
                                auth(2),
                                "oauth",
                                format!(
                                    "Authorization Server Metadata incomplete — missing {}",
                                    missing.join(", ")
                                ),
                            ));
                        }
                    }
                }
            }
            None => messages.push(Diagnostic::new(
                auth(1),
                "oauth",
                "Invalid authorization server issuer URL",
            )),
        }
    }

    if let Some(asm) = &server {
        check_compliance(&asm.metadata, &mut messages);
    }

    let prm_scopes = resource
        .as_ref()
        .map(|r| string_list(&r.metadata, "scopes_supported"))
        .unwrap_or_default();
    let as_scopes = server
        .as_ref()
        .map(|s| string_list(&s.metadata, "scopes_supported"))
        .unwrap_or_default();
    let mut all_scopes: Vec<&str> = Vec::new();
    for scope in prm_scopes.iter().chain(&as_scopes) {
        if !all_scopes.contains(&scope.as_str()) {
            all_scopes.push(scope);
        }
    }
    if !all_scopes.is_empty() {
        messages.push(Diagnostic::new(
            auth(11),
            "oauth",
            format!("Scopes found — {}", all_scopes.join(", ")),
        ));
    }

    let supports_oauth = resource.is_some() || server.is_some();
    if supports_oauth {
        messages.push(Diagnostic::new(
            auth(10),
            "oauth",
            "Server requires authentication",
        ));
    }

    if let Some(asm) = &server {
        populate_from_server(&mut profile, asm);
    }
    let has_prm_scopes = resource
        .as_ref()
        .is_some_and(|r| r.metadata.get("scopes_supported").is_some_and(Value::is_array));
    profile.scopes_supported = if has_prm_scopes { prm_scopes } else { as_scopes };

    #[cfg(feature = "telemetry")]
    tracing::info!(
        endpoint = %endpoint,
        supports_oauth,
        findings = messages.len(),
        "OAuth discovery finished"
    );

    OAuthDiscovery {
        messages,
        supports_oauth,
        profile,
    }
}

fn check_compliance(metadata: &Value, messages: &mut Vec<Diagnostic>) {
    let has_s256 = metadata
        .get("code_challenge_methods_supported")
        .and_then(Value::as_array)
        .is_some_and(|methods| methods.iter().any(|m| m.as_str() == Some("S256")));
    if !has_s256 {
        messages.push(Diagnostic::new(
            auth(3),
            "oauth",
            "PKCE S256 not supported (MCP Spec MUST)",
        ));
    }

    let has_registration = metadata.get("registration_endpoint").is_some_and(is_truthy);
    let has_cimd = metadata.get("client_id_metadata_document_supported") == Some(&Value::Bool(true));
    if !has_registration && !has_cimd {
        messages.push(Diagnostic::new(
            auth(5),
            "oauth",
            "No client registration mechanism available",
        ));
    }
}

fn populate_from_server(profile: &mut OAuthProfile, asm: &Found) {
    let md = &asm.metadata;
    profile.issuer = truthy_str(md, "issuer").map(str::to_owned);
    profile.authorization_endpoint = truthy_str(md, "authorization_endpoint").map(str::to_owned);
    profile.token_endpoint = truthy_str(md, "token_endpoint").map(str::to_owned);
    profile.registration_endpoint = truthy_str(md, "registration_endpoint").map(str::to_owned);
    profile.revocation_endpoint = truthy_str(md, "revocation_endpoint").map(str::to_owned);
    profile.grant_types_supported = string_list(md, "grant_types_supported");
    profile.response_types_supported = string_list(md, "response_types_supported");
    profile.pkce_methods_supported = string_list(md, "code_challenge_methods_supported");
    profile.client_id_metadata_document_supported =
        md.get("client_id_metadata_document_supported") == Some(&Value::Bool(true));
    profile.dynamic_registration_supported = profile.registration_endpoint.is_some();
    profile.mcp_version = truthy_str(md, "mcp_version").map(str::to_owned);
    profile.authorization_server_metadata_url = Some(asm.url.clone());
}

/// Tries `urls` in order and returns the first JSON document served with
/// status `2xx` and an `application/json` content type.
///
/// The first such document ends the search; a falsy one (`null`, `false`,
/// `0`, `""`) counts as no metadata.
async fn fetch_first_json<F>(fetcher: &F, urls: &[String], timeout: Duration) -> Option<Found>
where
    F: NetworkFetcher + ?Sized,
{
    for url in urls {
        match fetcher.get(url, timeout).await {
            Ok(response) if response.is_success() && response.is_json() => {
                if let Ok(metadata) = serde_json::from_str::<Value>(&response.body) {
                    if !is_truthy(&metadata) {
                        #[cfg(feature = "telemetry")]
                        tracing::debug!(url = %url, "OAuth metadata document is empty");
                        return None;
                    }
                    #[cfg(feature = "telemetry")]
                    tracing::debug!(url = %url, "Found OAuth metadata");
                    return Some(Found {
                        url: url.clone(),
                        metadata,
                    });
                }
            }
            #[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
            Ok(response) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(url = %url, status = response.status, "No OAuth metadata");
            }
            #[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(url = %url, error = %err, "OAuth metadata fetch failed");
            }
        }
    }
    None
}

fn origin(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Path-specific then root Protected Resource Metadata URLs, deduplicated.
#[must_use]
pub fn protected_resource_urls(endpoint: &Url) -> Vec<String> {
    let origin = origin(endpoint);
    let path = endpoint.path().trim_end_matches('/');
    dedup(vec![
        format!("{origin}{PROTECTED_RESOURCE_PATH}{path}"),
        format!("{origin}{PROTECTED_RESOURCE_PATH}"),
    ])
}

/// Authorization Server Metadata candidates for `issuer`, deduplicated.
///
/// A root issuer is tried as RFC 8414 then OpenID discovery; an issuer with
/// a path first tries the path-specific RFC 8414 location.
#[must_use]
pub fn authorization_server_urls(issuer: &Url) -> Vec<String> {
    let origin = origin(issuer);
    let path = issuer.path().trim_end_matches('/');
    let mut urls = Vec::with_capacity(3);
    if !path.is_empty() {
        urls.push(format!("{origin}{AUTHORIZATION_SERVER_PATH}{path}"));
    }
    urls.push(format!("{origin}{AUTHORIZATION_SERVER_PATH}"));
    urls.push(format!("{origin}{OPENID_CONFIGURATION_PATH}"));
    dedup(urls)
}

fn dedup(urls: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(urls.len());
    for url in urls {
        if !out.contains(&url) {
            out.push(url);
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::BoxFuture;
    use crate::diagnostic::contains_code;
    use crate::error::FetchError;
    use crate::fetch::FetchResponse;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory fetcher: unknown URLs answer 404.
    #[derive(Debug, Default)]
    pub(crate) struct FakeFetcher {
        pub routes: HashMap<String, Result<FetchResponse, FetchError>>,
        pub head_status: Option<Result<u16, FetchError>>,
        pub requested: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub(crate) fn json(mut self, url: &str, body: &Value) -> Self {
            self.routes.insert(
                url.to_owned(),
                Ok(FetchResponse {
                    status: 200,
                    content_type: Some("application/json".into()),
                    body: body.to_string(),
                }),
            );
            self
        }

        pub(crate) fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    impl NetworkFetcher for FakeFetcher {
        fn get<'a>(
            &'a self,
            url: &'a str,
            _timeout: Duration,
        ) -> BoxFuture<'a, Result<FetchResponse, FetchError>> {
            Box::pin(async move {
                self.requested.lock().unwrap().push(url.to_owned());
                self.routes.get(url).cloned().unwrap_or_else(|| {
                    Ok(FetchResponse {
                        status: 404,
                        content_type: Some("text/html".into()),
                        body: "not found".into(),
                    })
                })
            })
        }

        fn head<'a>(
            &'a self,
            _url: &'a str,
            _timeout: Duration,
        ) -> BoxFuture<'a, Result<u16, FetchError>> {
            Box::pin(async move { self.head_status.clone().unwrap_or(Ok(200)) })
        }
    }

    fn endpoint() -> Url {
        Url::parse("https://mcp.example.com/mcp").unwrap()
    }

    fn full_server_metadata() -> Value {
        json!({
            "issuer": "https://auth.example.com",
            "authorization_endpoint": "https://auth.example.com/authorize",
            "token_endpoint": "https://auth.example.com/token",
            "registration_endpoint": "https://auth.example.com/register",
            "response_types_supported": ["code"],
            "grant_types_supported": ["authorization_code", "refresh_token"],
            "code_challenge_methods_supported": ["S256"],
            "scopes_supported": ["openid", "mcp"]
        })
    }

    #[test]
    fn test_protected_resource_urls() {
        assert_eq!(
            protected_resource_urls(&endpoint()),
            vec![
                "https://mcp.example.com/.well-known/oauth-protected-resource/mcp",
                "https://mcp.example.com/.well-known/oauth-protected-resource",
            ]
        );
        let root = Url::parse("https://mcp.example.com/").unwrap();
        assert_eq!(
            protected_resource_urls(&root),
            vec!["https://mcp.example.com/.well-known/oauth-protected-resource"]
        );
    }

    #[test]
    fn test_authorization_server_urls() {
        let root = Url::parse("https://auth.example.com").unwrap();
        assert_eq!(
            authorization_server_urls(&root),
            vec![
                "https://auth.example.com/.well-known/oauth-authorization-server",
                "https://auth.example.com/.well-known/openid-configuration",
            ]
        );
        let tenant = Url::parse("https://auth.example.com/tenant1").unwrap();
        assert_eq!(
            authorization_server_urls(&tenant),
            vec![
                "https://auth.example.com/.well-known/oauth-authorization-server/tenant1",
                "https://auth.example.com/.well-known/oauth-authorization-server",
                "https://auth.example.com/.well-known/openid-configuration",
            ]
        );
    }

    #[tokio::test]
    async fn test_all_404_means_no_oauth_and_no_messages() {
        let fetcher = FakeFetcher::default();
        let result = probe(&fetcher, &endpoint(), Duration::from_secs(1)).await;
        assert!(!result.supports_oauth);
        assert!(result.messages.is_empty());
        assert_eq!(result.profile, OAuthProfile::default());
        assert_eq!(fetcher.requested().len(), 2);
    }

    #[tokio::test]
    async fn test_transport_errors_are_silent() {
        let mut fetcher = FakeFetcher::default();
        for url in protected_resource_urls(&endpoint()) {
            fetcher.routes.insert(url, Err(FetchError::Timeout));
        }
        let result = probe(&fetcher, &endpoint(), Duration::from_secs(1)).await;
        assert!(!result.supports_oauth);
        assert!(result.messages.is_empty());
    }

    #[tokio::test]
    async fn test_full_discovery_populates_profile() {
        let fetcher = FakeFetcher::default()
            .json(
                "https://mcp.example.com/.well-known/oauth-protected-resource",
                &json!({
                    "resource": "https://mcp.example.com/mcp",
                    "authorization_servers": ["https://auth.example.com"],
                    "scopes_supported": ["mcp", "tools:read"]
                }),
            )
            .json(
                "https://auth.example.com/.well-known/oauth-authorization-server",
                &full_server_metadata(),
            );

        let result = probe(&fetcher, &endpoint(), Duration::from_secs(1)).await;

        assert!(result.supports_oauth);
        let rendered: Vec<String> = result.messages.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "AUTH-011 oauth: Scopes found — mcp, tools:read, openid",
                "AUTH-010 oauth: Server requires authentication",
            ]
        );

        let profile = &result.profile;
        assert_eq!(profile.issuer.as_deref(), Some("https://auth.example.com"));
        assert_eq!(
            profile.token_endpoint.as_deref(),
            Some("https://auth.example.com/token")
        );
        assert_eq!(profile.scopes_supported, vec!["mcp", "tools:read"]);
        assert_eq!(profile.pkce_methods_supported, vec!["S256"]);
        assert!(profile.dynamic_registration_supported);
        assert!(!profile.client_id_metadata_document_supported);
        assert_eq!(
            profile.protected_resource_metadata_url.as_deref(),
            Some("https://mcp.example.com/.well-known/oauth-protected-resource")
        );
        assert_eq!(
            profile.authorization_server_metadata_url.as_deref(),
            Some("https://auth.example.com/.well-known/oauth-authorization-server")
        );
        assert_eq!(
            fetcher.requested(),
            vec![
                "https://mcp.example.com/.well-known/oauth-protected-resource/mcp",
                "https://mcp.example.com/.well-known/oauth-protected-resource",
                "https://auth.example.com/.well-known/oauth-authorization-server",
            ]
        );
    }

    #[tokio::test]
    async fn test_non_json_content_type_is_skipped() {
        let mut fetcher = FakeFetcher::default();
        fetcher.routes.insert(
            "https://mcp.example.com/.well-known/oauth-protected-resource/mcp".into(),
            Ok(FetchResponse {
                status: 200,
                content_type: Some("text/html".into()),
                body: "{\"authorization_servers\": []}".into(),
            }),
        );
        let result = probe(&fetcher, &endpoint(), Duration::from_secs(1)).await;
        assert!(!result.supports_oauth);
    }

    #[tokio::test]
    async fn test_missing_authorization_servers() {
        let fetcher = FakeFetcher::default().json(
            "https://mcp.example.com/.well-known/oauth-protected-resource/mcp",
            &json!({"resource": "https://mcp.example.com/mcp", "authorization_servers": []}),
        );
        let result = probe(&fetcher, &endpoint(), Duration::from_secs(1)).await;
        assert!(result.supports_oauth);
        assert!(contains_code(&result.messages, "AUTH-004"));
        assert!(contains_code(&result.messages, "AUTH-010"));
        assert!(!contains_code(&result.messages, "AUTH-002"));
        assert_eq!(fetcher.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_issuer() {
        let fetcher = FakeFetcher::default().json(
            "https://mcp.example.com/.well-known/oauth-protected-resource",
            &json!({"authorization_servers": ["not a url"]}),
        );
        let result = probe(&fetcher, &endpoint(), Duration::from_secs(1)).await;
        assert!(contains_code(&result.messages, "AUTH-001"));
        assert_eq!(fetcher.requested().len(), 2);
    }

    #[tokio::test]
    async fn test_null_protected_resource_metadata_means_no_oauth() {
        let fetcher = FakeFetcher::default()
            .json(
                "https://mcp.example.com/.well-known/oauth-protected-resource/mcp",
                &Value::Null,
            )
            .json(
                "https://mcp.example.com/.well-known/oauth-protected-resource",
                &json!({"authorization_servers": ["https://auth.example.com"]}),
            );
        let result = probe(&fetcher, &endpoint(), Duration::from_secs(1)).await;
        assert!(!result.supports_oauth);
        assert!(result.messages.is_empty());
        assert_eq!(result.profile, OAuthProfile::default());
        assert_eq!(fetcher.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_null_authorization_server_metadata_is_not_found() {
        let fetcher = FakeFetcher::default()
            .json(
                "https://mcp.example.com/.well-known/oauth-protected-resource",
                &json!({"authorization_servers": ["https://auth.example.com"]}),
            )
            .json(
                "https://auth.example.com/.well-known/oauth-authorization-server",
                &Value::Null,
            );
        let result = probe(&fetcher, &endpoint(), Duration::from_secs(1)).await;
        assert!(result.supports_oauth);
        assert_eq!(
            result.messages[0].to_string(),
            "AUTH-002 oauth: Authorization Server Metadata not found (RFC8414)"
        );
        assert!(result.profile.authorization_server_metadata_url.is_none());
    }

    #[tokio::test]
    async fn test_authorization_server_not_found() {
        let fetcher = FakeFetcher::default().json(
            "https://mcp.example.com/.well-known/oauth-protected-resource",
            &json!({"authorization_servers": ["https://auth.example.com/tenant"]}),
        );
        let result = probe(&fetcher, &endpoint(), Duration::from_secs(1)).await;
        assert!(result.supports_oauth);
        assert_eq!(
            result.messages[0].to_string(),
            "AUTH-002 oauth: Authorization Server Metadata not found (RFC8414)"
        );
        assert!(!contains_code(&result.messages, "AUTH-003"));
        assert!(!contains_code(&result.messages, "AUTH-005"));
        assert_eq!(fetcher.requested().len(), 5);
    }

    #[tokio::test]
    async fn test_incomplete_and_non_compliant_server() {
        let fetcher = FakeFetcher::default()
            .json(
                "https://mcp.example.com/.well-known/oauth-protected-resource",
                &json!({"authorization_servers": ["https://auth.example.com"]}),
            )
            .json(
                "https://auth.example.com/.well-known/openid-configuration",
                &json!({
                    "issuer": "https://auth.example.com",
                    "authorization_endpoint": "https://auth.example.com/authorize",
                    "code_challenge_methods_supported": ["plain"]
                }),
            );
        let result = probe(&fetcher, &endpoint(), Duration::from_secs(1)).await;
        let rendered: Vec<String> = result.messages.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "AUTH-002 oauth: Authorization Server Metadata incomplete — missing token_endpoint, response_types_supported",
                "AUTH-003 oauth: PKCE S256 not supported (MCP Spec MUST)",
                "AUTH-005 oauth: No client registration mechanism available",
                "AUTH-010 oauth: Server requires authentication",
            ]
        );
        assert_eq!(
            result.profile.authorization_server_metadata_url.as_deref(),
            Some("https://auth.example.com/.well-known/openid-configuration")
        );
    }

    #[tokio::test]
    async fn test_client_id_metadata_document_satisfies_registration() {
        let mut metadata = full_server_metadata();
        metadata.as_object_mut().unwrap().remove("registration_endpoint");
        metadata["client_id_metadata_document_supported"] = json!(true);
        let fetcher = FakeFetcher::default()
            .json(
                "https://mcp.example.com/.well-known/oauth-protected-resource",
                &json!({"authorization_servers": ["https://auth.example.com"]}),
            )
            .json(
                "https://auth.example.com/.well-known/oauth-authorization-server",
                &metadata,
            );
        let result = probe(&fetcher, &endpoint(), Duration::from_secs(1)).await;
        assert!(!contains_code(&result.messages, "AUTH-005"));
        assert!(result.profile.client_id_metadata_document_supported);
        assert!(!result.profile.dynamic_registration_supported);
        assert_eq!(result.profile.scopes_supported, vec!["openid", "mcp"]);
    }
}

//! Category flags derived from an audit.
//!
//! [`DerivedCategories`] is the flat, always fully populated summary at the
//! top of every snapshot. It starts all `false`/`null` and each stage of the
//! audit records what it learned.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::oauth::OAuthProfile;
use crate::probe::RestrictedCall;
use crate::types::ToolDescriptor;
use crate::value::is_truthy;

/// Boolean summary of what a server supports.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DerivedCategories {
    /// The endpoint answered an HTTP request.
    pub is_reachable: bool,
    /// The MCP handshake succeeded.
    pub supports_mcp: bool,
    /// At least one tool is listed.
    pub has_tools: bool,
    /// At least one resource is listed.
    pub has_resources: bool,
    /// At least one prompt is listed.
    pub has_prompts: bool,
    /// The handshake carried non-empty instructions.
    pub has_instructions: bool,
    /// `capabilities.logging` is present.
    pub supports_logging: bool,
    /// `capabilities.completions` is present.
    pub supports_completions: bool,
    /// `capabilities.resources.subscribe` is `true`.
    pub supports_resource_subscriptions: bool,
    /// `capabilities.tools.listChanged` is `true`.
    pub supports_tools_list_changed: bool,
    /// `capabilities.resources.listChanged` is `true`.
    pub supports_resources_list_changed: bool,
    /// `capabilities.prompts.listChanged` is `true`.
    pub supports_prompts_list_changed: bool,
    /// `capabilities.tasks` is present.
    pub supports_tasks: bool,
    /// `capabilities.mcpApps` is present.
    pub supports_mcp_apps: bool,
    /// `capabilities.experimental` is a non-empty object.
    pub supports_experimental: bool,
    /// At least one tool returned a payment requirement.
    pub supports_x402: bool,
    /// At least one payment option passed validation.
    pub has_valid_payment_requirements: bool,
    /// A valid option uses the `exact` scheme.
    pub supports_exact_scheme: bool,
    /// A valid option targets an `eip155:` network.
    pub supports_evm: bool,
    /// A valid option targets a `solana:` network.
    pub supports_solana: bool,
    /// OAuth metadata was discovered.
    #[serde(rename = "supportsOAuth")]
    pub supports_oauth: bool,
    /// Protected Resource Metadata was discovered.
    pub has_protected_resource_metadata: bool,
    /// The authorization server supports PKCE `S256`.
    pub supports_pkce_s256: bool,
    /// The authorization server publishes a registration endpoint.
    pub supports_dynamic_registration: bool,
    /// The authorization server accepts Client ID Metadata Documents.
    pub supports_client_id_metadata_document: bool,
    /// Negotiated MCP protocol version.
    pub protocol_version: Option<String>,
    /// x402 version of the first restricted call.
    pub x402_version: Option<u64>,
}

impl DerivedCategories {
    /// Records the reachability and handshake outcome.
    pub const fn record_connection(&mut self, reachable: bool, handshake: bool) {
        self.is_reachable = reachable;
        self.supports_mcp = handshake;
    }

    /// Records the listed tools, resources and prompts.
    pub const fn record_inventory(
        &mut self,
        tools: &[ToolDescriptor],
        resources: &[Value],
        prompts: &[Value],
    ) {
        self.has_tools = !tools.is_empty();
        self.has_resources = !resources.is_empty();
        self.has_prompts = !prompts.is_empty();
    }

    /// Records what the handshake announced.
    pub fn record_server(
        &mut self,
        capabilities: &Map<String, Value>,
        instructions: Option<&str>,
        protocol_version: Option<&str>,
    ) {
        let flag = |key: &str, sub: &str| {
            capabilities
                .get(key)
                .and_then(|c| c.get(sub))
                .is_some_and(|v| *v == Value::Bool(true))
        };
        let present = |key: &str| capabilities.get(key).is_some_and(|v| !v.is_null());

        self.has_instructions = instructions.is_some_and(|s| !s.is_empty());
        self.supports_logging = present("logging");
        self.supports_completions = present("completions");
        self.supports_resource_subscriptions = flag("resources", "subscribe");
        self.supports_tools_list_changed = flag("tools", "listChanged");
        self.supports_resources_list_changed = flag("resources", "listChanged");
        self.supports_prompts_list_changed = flag("prompts", "listChanged");
        self.supports_tasks = present("tasks");
        self.supports_mcp_apps = present("mcpApps");
        self.supports_experimental = capabilities
            .get("experimental")
            .and_then(Value::as_object)
            .is_some_and(|o| !o.is_empty());
        self.protocol_version = protocol_version
            .filter(|s| !s.is_empty())
            .map(str::to_owned);
    }

    /// Records the probe and validation outcome.
    ///
    /// Scheme and network flags consider only options that passed validation.
    pub fn record_payments(&mut self, restricted_calls: &[RestrictedCall], valid_options: &[Value]) {
        let network_has = |prefix: &str| {
            valid_options.iter().any(|o| {
                o.get("network")
                    .and_then(Value::as_str)
                    .is_some_and(|n| n.starts_with(prefix))
            })
        };

        self.supports_x402 = !restricted_calls.is_empty();
        self.has_valid_payment_requirements = !valid_options.is_empty();
        self.supports_exact_scheme = valid_options
            .iter()
            .any(|o| o.get("scheme").and_then(Value::as_str) == Some("exact"));
        self.supports_evm = network_has("eip155:");
        self.supports_solana = network_has("solana:");
        self.x402_version = x402_version(restricted_calls);
    }

    /// Records the OAuth discovery outcome.
    pub fn record_oauth(&mut self, supports_oauth: bool, profile: &OAuthProfile) {
        self.supports_oauth = supports_oauth;
        self.has_protected_resource_metadata = profile.protected_resource_metadata_url.is_some();
        self.supports_pkce_s256 = profile.pkce_methods_supported.iter().any(|m| m == "S256");
        self.supports_dynamic_registration = profile.dynamic_registration_supported;
        self.supports_client_id_metadata_document = profile.client_id_metadata_document_supported;
    }
}

/// The first integral `x402Version` among the restricted calls.
pub(crate) fn x402_version(restricted_calls: &[RestrictedCall]) -> Option<u64> {
    restricted_calls.iter().find_map(|call| {
        call.payment_required
            .get("x402Version")
            .filter(|v| is_truthy(v))
            .and_then(Value::as_u64)
    })
}

//! Audit configuration.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use mcp_audit::config::AuditConfig;
//!
//! let config: AuditConfig = serde_json::from_str(r#"{"timeout_ms": 2500}"#).unwrap();
//! assert_eq!(config.timeout, Duration::from_millis(2500));
//! assert_eq!(config.client_name, "mcp-audit");
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

/// Default per-attempt timeout (10 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings shared by the auditor and its transport.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Time budget for each network attempt (default: 10 000 ms).
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "timeout_ms", default = "default_timeout")]
    pub timeout: Duration,

    /// Client name announced in the MCP `initialize` handshake.
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Client version announced in the MCP `initialize` handshake.
    #[serde(default = "default_client_version")]
    pub client_version: String,
}

const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_client_name() -> String {
    "mcp-audit".to_owned()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_owned()
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            client_name: default_client_name(),
            client_version: default_client_version(),
        }
    }
}

impl AuditConfig {
    /// Overrides the per-attempt timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

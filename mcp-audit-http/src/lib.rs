//! HTTP transport for `mcp-audit`.
//!
//! Provides `reqwest`-backed implementations of the collaborator traits the
//! audit engines depend on.
//!
//! # Modules
//!
//! - [`fetcher`] - [`HttpFetcher`], timeout-bounded `GET`/`HEAD` for OAuth discovery and reachability
//! - [`session`] - [`StreamableHttpConnector`], MCP sessions over Streamable HTTP
//! - [`jsonrpc`] - JSON-RPC 2.0 envelopes and SSE reply decoding
//! - [`error`] - Transport error types
//!
//! # Example
//!
//! ```rust,ignore
//! use mcp_audit::Auditor;
//! use mcp_audit::config::AuditConfig;
//! use mcp_audit_http::{HttpFetcher, StreamableHttpConnector};
//!
//! let config = AuditConfig::default();
//! let auditor = Auditor::new(HttpFetcher::new(), StreamableHttpConnector::new(&config));
//! let report = auditor.start("https://mcp.example.com/mcp", config.timeout).await?;
//! ```
//!
//! # Feature Flags
//!
//! - `telemetry` - Logs request failures with `tracing` and enables the core crate's instrumentation

pub mod constants;
pub mod error;
pub mod fetcher;
pub mod jsonrpc;
pub mod session;

pub use error::HttpTransportError;
pub use fetcher::HttpFetcher;
pub use session::{StreamableHttpConnector, StreamableHttpSession};

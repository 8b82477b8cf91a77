#![cfg_attr(docsrs, feature(doc_cfg))]

//! Core engines for auditing remote MCP (Model Context Protocol) servers.
//!
//! An audit connects to a server, enumerates its tools, resources and prompts,
//! probes each tool for x402 payment requirements, checks OAuth
//! discoverability and folds everything into an [`AuditSnapshot`]. Two
//! snapshots can later be compared to detect drift.
//!
//! # Architecture
//!
//! The crate performs no I/O of its own. Network access goes through two
//! collaborator seams:
//!
//! - [`fetch::NetworkFetcher`] for timeout-bounded HTTP `GET` / `HEAD`
//! - [`session::McpConnector`] / [`session::McpSession`] for the MCP handshake
//!   and JSON-RPC requests
//!
//! `mcp-audit-http` provides `reqwest`-backed implementations of both.
//!
//! # Modules
//!
//! - [`oauth`] - OAuth protected-resource and authorization-server discovery
//! - [`payment`] - x402 payment-requirement validation
//! - [`probe`] - Sequential tool probing for 402 responses
//! - [`discovery`] - Reachability, handshake, list enumeration and latency
//! - [`classify`] - Capability and payment category flags
//! - [`snapshot`] - The stable-shape audit snapshot
//! - [`diff`] - Structural comparison of two snapshots
//! - [`auditor`] - Orchestration of the above
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use mcp_audit::auditor::Auditor;
//!
//! let auditor = Auditor::new(fetcher, connector);
//! let report = auditor.start("https://mcp.example.com/mcp", Duration::from_secs(10)).await?;
//! println!("{}", serde_json::to_string_pretty(&report)?);
//! ```
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

use std::future::Future;
use std::pin::Pin;

pub mod auditor;
pub mod classify;
pub mod config;
pub mod diagnostic;
pub mod diff;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod oauth;
pub mod payment;
pub mod probe;
pub mod session;
pub mod snapshot;
pub mod timestamp;
pub mod types;

mod value;

pub use auditor::{AuditReport, Auditor};
pub use diagnostic::Diagnostic;
pub use diff::ComparisonReport;
pub use error::AuditError;
pub use snapshot::AuditSnapshot;

/// A boxed, `Send` future borrowed for `'a`.
///
/// Used by the collaborator traits so they stay object-safe without
/// `async-trait`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// JSON-RPC error code used by MCP servers to signal payment required.
pub const PAYMENT_REQUIRED_RPC_CODE: i64 = -32402;

/// HTTP status (and legacy JSON-RPC code) for payment required.
pub const PAYMENT_REQUIRED_STATUS: i64 = 402;

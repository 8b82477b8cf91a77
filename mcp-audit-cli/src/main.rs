//! Command-line auditor for remote MCP servers.
//!
//! # Usage
//!
//! ```bash
//! # Audit a server and print the report
//! mcp-audit audit https://mcp.example.com/mcp
//!
//! # Store a report, then diff it against a later one
//! mcp-audit audit https://mcp.example.com/mcp --output before.json
//! mcp-audit compare before.json after.json
//!
//! # Configure logging level
//! RUST_LOG=debug mcp-audit audit https://mcp.example.com/mcp
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to TOML configuration file (default: `mcp-audit.toml`)
//! - `MCP_AUDIT_TIMEOUT_MS` - Override the per-attempt timeout
//! - `RUST_LOG` - Log level filter (default: `info`)
//!
//! Reports are written to stdout as JSON; logs go to stderr. The exit status
//! is `2` for invalid input, `1` for any other failure and `0` otherwise.

mod config;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use mcp_audit::{AuditError, Auditor};
use mcp_audit_http::{HttpFetcher, StreamableHttpConnector};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;

/// Audit MCP servers for OAuth discoverability and x402 payment requirements.
#[derive(Debug, Parser)]
#[command(name = "mcp-audit", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Audit a live MCP server
    Audit(AuditArgs),
    /// Compare two stored reports or snapshots
    Compare(CompareArgs),
}

#[derive(Debug, Args)]
struct AuditArgs {
    /// MCP endpoint URL
    endpoint: String,

    /// Per-attempt timeout in milliseconds
    #[arg(long, env = "MCP_AUDIT_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct CompareArgs {
    /// The earlier report
    before: PathBuf,

    /// The later report
    after: PathBuf,

    /// Write the comparison to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("mcp-audit failed: {e}");
        let code = if e.downcast_ref::<AuditError>().is_some() {
            2
        } else {
            1
        };
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = CliConfig::load()?;

    match cli.command {
        Command::Audit(args) => {
            let config = config.with_timeout_ms(args.timeout_ms);
            tracing::info!(
                endpoint = %args.endpoint,
                timeout_ms = config.audit.timeout.as_millis(),
                "Auditing"
            );

            let auditor = Auditor::new(
                HttpFetcher::new(),
                StreamableHttpConnector::new(&config.audit),
            );
            let report = auditor.start(&args.endpoint, config.audit.timeout).await?;
            tracing::info!(
                status = report.status,
                findings = report.messages.len(),
                tools = report.snapshot.entries.tools.len(),
                "Audit complete"
            );

            emit(&report, config.pretty, args.output.as_deref())
        }
        Command::Compare(args) => {
            let before = read_json(&args.before)?;
            let after = read_json(&args.after)?;
            let comparison = mcp_audit::auditor::compare_json(&before, &after)?;
            tracing::info!(has_changes = comparison.has_changes, "Comparison complete");

            emit(&comparison, config.pretty, args.output.as_deref())
        }
    }
}

fn read_json(path: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let value = serde_json::from_str(&content)
        .map_err(|e| format!("Invalid JSON in {}: {e}", path.display()))?;
    Ok(value)
}

#[allow(clippy::print_stdout)]
fn emit<T: Serialize>(
    value: &T,
    pretty: bool,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };

    match output {
        Some(path) => {
            std::fs::write(path, json + "\n")?;
            tracing::info!(path = %path.display(), "Wrote output");
        }
        None => println!("{json}"),
    }
    Ok(())
}

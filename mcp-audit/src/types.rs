//! MCP protocol types used by the audit engines.
//!
//! These are framework-agnostic renditions of the MCP wire shapes the auditor
//! reads. Unknown fields are preserved where they end up in a snapshot and
//! ignored elsewhere.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::{VecSkipError, serde_as};

/// Parameters for a `tools/call` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallToolParams {
    /// The tool name to invoke.
    pub name: String,
    /// Arguments to pass to the tool.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// A single content item in a tool call result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
#[non_exhaustive]
pub enum ContentItem {
    /// Text content.
    Text {
        /// The text value.
        text: String,
    },
    /// Image, audio, resource or any other non-text content.
    #[serde(other)]
    Other,
}

impl ContentItem {
    /// Creates a new text content item.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Returns the text content if this is a text item.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Other => None,
        }
    }
}

/// Result of a successful `tools/call` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Content items returned by the tool.
    #[serde(default)]
    pub content: Vec<ContentItem>,
    /// Whether the tool reported an error.
    #[serde(default, rename = "isError")]
    pub is_error: bool,
    /// Optional structured content.
    #[serde(
        default,
        rename = "structuredContent",
        skip_serializing_if = "Option::is_none"
    )]
    pub structured_content: Option<Value>,
}

/// Name and version of an MCP implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Implementation name.
    #[serde(default)]
    pub name: Option<String>,
    /// Implementation version.
    #[serde(default)]
    pub version: Option<String>,
    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The server half of the `initialize` handshake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Negotiated protocol version.
    #[serde(default)]
    pub protocol_version: Option<String>,
    /// Raw server capabilities.
    #[serde(default)]
    pub capabilities: Map<String, Value>,
    /// Server implementation info.
    #[serde(default)]
    pub server_info: Option<Implementation>,
    /// Optional usage instructions for clients.
    #[serde(default)]
    pub instructions: Option<String>,
}

/// A tool as declared by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Tool name, unique per server.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the tool arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    /// Any other declared fields (`title`, `annotations`, `outputSchema`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolDescriptor {
    /// Creates a descriptor with only a name and an input schema.
    #[must_use]
    pub fn new(name: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: Some(input_schema),
            extra: Map::new(),
        }
    }
}

/// The `tools` array of a `tools/list` result; entries that do not decode as
/// a [`ToolDescriptor`] are dropped.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ToolList {
    #[serde_as(as = "VecSkipError<_>")]
    pub tools: Vec<ToolDescriptor>,
}

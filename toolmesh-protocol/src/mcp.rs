//! The slice of the MCP protocol this meta-server actually speaks:
//! `initialize`, `tools/list`, `tools/call`, and `ping`. No resources,
//! prompts, sampling, or batch support — this server only fronts tools.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(rename = "clientInfo", default)]
    pub client_info: Option<ClientInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Only `tools` is advertised: this server's entire public surface is
/// the five meta-tools, so resources/prompts/logging capabilities would
/// be a lie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    pub tools: ToolsCapability,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: ToolsCapability { list_changed: false },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsListResult {
    pub tools: Vec<Tool>,
    #[serde(rename = "nextCursor", default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsCallResult {
    pub content: Vec<ToolContent>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
    #[serde(default, flatten)]
    pub metadata: HashMap<String, Value>,
}

impl ToolsCallResult {
    pub fn text(text: impl Into<String>, is_error: bool) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error,
            metadata: HashMap::new(),
        }
    }

    /// Renders `value` as pretty JSON text content — the shape every
    /// meta-tool handler returns for its structured body (§7: "structured
    /// JSON bodies carried as text content").
    pub fn json(value: &Value, is_error: bool) -> Self {
        let text = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
        Self::text(text, is_error)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tools_call_result_json_wraps_text_content() {
        let result = ToolsCallResult::json(&serde_json::json!({"error": "boom"}), true);
        assert!(result.is_error);
        match &result.content[0] {
            ToolContent::Text { text } => assert!(text.contains("boom")),
        }
    }
}

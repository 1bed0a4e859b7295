//! Fixed input schemas for the five meta-tools, per §6. The limit
//! schema's `maximum` is generated from config so a `find_tools` caller
//! who passes `limit > max_limit` is rejected at the JSON-RPC layer
//! rather than silently clamped (§8 "limit clamping").

use serde_json::{json, Value};

use toolmesh_config::FindToolsConfig;
use toolmesh_protocol::mcp::Tool;

pub const FIND_TOOLS: &str = "find_tools";
pub const DESCRIBE_TOOLS: &str = "describe_tools";
pub const EXECUTE: &str = "execute";
pub const LIST_NAMESPACES: &str = "list_namespaces";
pub const CLEAR_SELECTION_CACHE: &str = "clear_selection_cache";

pub fn all(config: &FindToolsConfig) -> Vec<Tool> {
    vec![
        find_tools_tool(config),
        describe_tools_tool(),
        execute_tool(),
        list_namespaces_tool(),
        clear_selection_cache_tool(),
    ]
}

fn find_tools_tool(config: &FindToolsConfig) -> Tool {
    Tool {
        name: FIND_TOOLS.to_string(),
        description: "Search the aggregated catalog of upstream tools by name and description."
            .to_string(),
        input_schema: find_tools_schema(config),
    }
}

pub fn find_tools_schema(config: &FindToolsConfig) -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {"type": "string"},
            "limit": {
                "type": "integer",
                "minimum": 1,
                "maximum": config.max_limit,
                "default": config.default_limit,
            },
            "mode": {
                "type": "string",
                "enum": ["fast", "semantic", "hybrid"],
            },
            "detail_level": {
                "type": "string",
                "enum": ["L0", "L1", "L2"],
            },
        },
        "required": ["query"],
    })
}

fn describe_tools_tool() -> Tool {
    Tool {
        name: DESCRIBE_TOOLS.to_string(),
        description: "Fetch full schemas for specific tools by name.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "tool_names": {
                    "type": "array",
                    "items": {"type": "string"},
                    "minItems": 1,
                    "maxItems": 20,
                },
            },
            "required": ["tool_names"],
        }),
    }
}

fn execute_tool() -> Tool {
    Tool {
        name: EXECUTE.to_string(),
        description: "Invoke a tool on whichever upstream owns it.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "tool_name": {"type": "string"},
                "arguments": {"type": "object", "default": {}},
                "confirmation_token": {"type": "string"},
            },
            "required": ["tool_name"],
        }),
    }
}

fn list_namespaces_tool() -> Tool {
    Tool {
        name: LIST_NAMESPACES.to_string(),
        description: "List every configured upstream server and its connection status."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "include_tools": {"type": "boolean", "default": false},
            },
        }),
    }
}

fn clear_selection_cache_tool() -> Tool {
    Tool {
        name: CLEAR_SELECTION_CACHE.to_string(),
        description: "Clear the recorded tool co-occurrence history used for bundle suggestions."
            .to_string(),
        input_schema: json!({"type": "object", "properties": {}}),
    }
}

//! One `SessionServer` per accepted connection (daemon mode) or per
//! stdio process (single-client mode). Grounded on the teacher's
//! `McpServer::handle_message`/`handle_request`/`process_request` split:
//! parse once, branch notification vs. request, dispatch by method name,
//! and fold every handler error into a JSON-RPC error response rather
//! than ever panicking the read loop.

use std::sync::Arc;

use serde_json::{json, Value};

use toolmesh_config::FindToolsConfig;
use toolmesh_protocol::mcp::{
    InitializeResult, ServerCapabilities, ServerInfo, ToolsCallParams, ToolsListResult,
    MCP_PROTOCOL_VERSION,
};
use toolmesh_protocol::{JsonRpcRequest, JsonRpcResponse};
use toolmesh_selection::SelectionTracker;
use toolmesh_tools::{schema, MetaTools};

use crate::error::{SessionError, SessionResult};

pub struct SessionServer {
    tools: Arc<MetaTools>,
    selection: SelectionTracker,
    find_tools_config: FindToolsConfig,
    initialized: std::sync::atomic::AtomicBool,
}

impl SessionServer {
    pub fn new(tools: Arc<MetaTools>, find_tools_config: FindToolsConfig) -> Self {
        Self {
            tools,
            selection: SelectionTracker::new(),
            find_tools_config,
            initialized: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Parses one line of input, dispatches it, and renders the reply
    /// line (or `None` for a notification, which never gets a response).
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(err) => {
                let response = JsonRpcResponse::failure(
                    None,
                    SessionError::Serde(err).into_jsonrpc_error(),
                );
                return Some(serde_json::to_string(&response).unwrap_or_default());
            }
        };

        let is_notification = request.is_notification();
        let id = request.id.clone();
        let outcome = self.dispatch(request).await;

        if is_notification {
            if let Err(err) = outcome {
                tracing::warn!(error = %err, "error handling notification");
            }
            return None;
        }

        let response = match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => JsonRpcResponse::failure(id, err.into_jsonrpc_error()),
        };
        Some(serde_json::to_string(&response).unwrap_or_default())
    }

    async fn dispatch(&self, request: JsonRpcRequest) -> SessionResult<Value> {
        match request.method.as_str() {
            "initialize" => Ok(self.handle_initialize()),
            "initialized" | "notifications/initialized" => {
                self.initialized.store(true, std::sync::atomic::Ordering::Relaxed);
                Ok(Value::Null)
            }
            "ping" => Ok(json!({})),
            "tools/list" => Ok(serde_json::to_value(ToolsListResult {
                tools: schema::all(&self.find_tools_config),
                next_cursor: None,
            })?),
            "tools/call" => self.handle_tools_call(request.params).await,
            other => Err(SessionError::UnknownMethod(other.to_string())),
        }
    }

    fn handle_initialize(&self) -> Value {
        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo {
                name: "toolmesh".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        serde_json::to_value(result).expect("InitializeResult always serializes")
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> SessionResult<Value> {
        let params: ToolsCallParams = serde_json::from_value(
            params.ok_or_else(|| SessionError::InvalidParams("missing tools/call params".to_string()))?,
        )?;
        let arguments = params.arguments.unwrap_or_else(|| json!({}));

        let result = match params.name.as_str() {
            schema::FIND_TOOLS => {
                let query = arguments
                    .get("query")
                    .and_then(Value::as_str)
                    .ok_or_else(|| SessionError::InvalidParams("\"query\" is required".to_string()))?;
                let limit = arguments.get("limit").and_then(Value::as_u64).map(|v| v as u32);
                let mode = parse_optional(&arguments, "mode")?;
                let detail_level = parse_optional(&arguments, "detail_level")?;
                self.tools.find_tools(query, limit, mode, detail_level).await?
            }
            schema::DESCRIBE_TOOLS => {
                let tool_names: Vec<String> = serde_json::from_value(
                    arguments.get("tool_names").cloned().unwrap_or_else(|| json!([])),
                )?;
                self.tools.describe_tools(&tool_names).await?
            }
            schema::EXECUTE => {
                let tool_name = arguments
                    .get("tool_name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| SessionError::InvalidParams("\"tool_name\" is required".to_string()))?;
                let call_arguments = arguments.get("arguments").cloned().unwrap_or_else(|| json!({}));
                let token = arguments.get("confirmation_token").and_then(Value::as_str);
                self.tools
                    .execute(tool_name, call_arguments, token, &self.selection)
                    .await?
            }
            schema::LIST_NAMESPACES => {
                let include_tools = arguments
                    .get("include_tools")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                self.tools.list_namespaces(include_tools).await?
            }
            schema::CLEAR_SELECTION_CACHE => {
                self.tools.clear_selection_cache(&self.selection).await?
            }
            other => return Err(SessionError::UnknownTool(other.to_string())),
        };

        Ok(serde_json::to_value(result)?)
    }
}

fn parse_optional<T: serde::de::DeserializeOwned>(
    arguments: &Value,
    key: &str,
) -> SessionResult<Option<T>> {
    match arguments.get(key) {
        Some(value) if !value.is_null() => Ok(Some(serde_json::from_value(value.clone())?)),
        _ => Ok(None),
    }
}

//! Drives the MCP handshake and method calls over one `Transport`,
//! correlating JSON-RPC responses to requests by id. Notifications and
//! out-of-order frames from the upstream are tolerated: `call` simply
//! keeps reading until it sees its own id.

use serde_json::Value;
use toolmesh_protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use toolmesh_protocol::mcp::{
    ClientInfo, InitializeParams, InitializeResult, Tool, ToolsCallParams, ToolsCallResult,
    ToolsListResult, MCP_PROTOCOL_VERSION,
};

use crate::error::{CatalogError, CatalogResult};
use crate::transport::Transport;

pub struct McpLink {
    transport: Box<dyn Transport>,
    next_id: u64,
}

impl McpLink {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            next_id: 1,
        }
    }

    async fn call(&mut self, method: &str, params: Option<Value>) -> CatalogResult<Value> {
        let id = Value::from(self.next_id);
        self.next_id += 1;

        let request = JsonRpcRequest::new(method, params, Some(id.clone()));
        let line = serde_json::to_string(&request)?;
        self.transport.send_line(&line).await?;

        loop {
            let Some(line) = self.transport.recv_line().await? else {
                return Err(CatalogError::Protocol(format!(
                    "upstream closed the connection while waiting for a reply to {method}"
                )));
            };
            if line.trim().is_empty() {
                continue;
            }
            let Ok(response) = serde_json::from_str::<JsonRpcResponse>(&line) else {
                continue;
            };
            if response.id.as_ref() != Some(&id) {
                continue;
            }
            if let Some(error) = response.error {
                return Err(CatalogError::Protocol(error.message));
            }
            return Ok(response.result.unwrap_or(Value::Null));
        }
    }

    pub async fn initialize(&mut self) -> CatalogResult<InitializeResult> {
        let params = InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            client_info: Some(ClientInfo {
                name: "toolmesh".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            }),
            capabilities: Value::Object(Default::default()),
        };
        let result = self
            .call("initialize", Some(serde_json::to_value(params)?))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn list_tools(&mut self) -> CatalogResult<Vec<Tool>> {
        let result = self.call("tools/list", None).await?;
        let parsed: ToolsListResult = serde_json::from_value(result)?;
        Ok(parsed.tools)
    }

    pub async fn call_tool(
        &mut self,
        tool_name: &str,
        arguments: Value,
    ) -> CatalogResult<ToolsCallResult> {
        let params = ToolsCallParams {
            name: tool_name.to_string(),
            arguments: Some(arguments),
        };
        let result = self
            .call("tools/call", Some(serde_json::to_value(params)?))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn close(&mut self) -> CatalogResult<()> {
        self.transport.close().await
    }
}

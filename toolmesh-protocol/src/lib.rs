//! Shared wire types: JSON-RPC 2.0 envelopes, the slice of the MCP
//! protocol this meta-server speaks (initialize, tools/list, tools/call,
//! ping), and the daemon's control-frame family.

pub mod jsonrpc;
pub mod mcp;
pub mod control;

pub use control::ControlFrame;
pub use jsonrpc::{JsonRpcError, JsonRpcErrorCode, JsonRpcId, JsonRpcRequest, JsonRpcResponse};
pub use mcp::{
    ClientInfo, InitializeParams, InitializeResult, ServerCapabilities, ServerInfo, Tool,
    ToolContent, ToolsCallParams, ToolsCallResult, ToolsListResult, MCP_PROTOCOL_VERSION,
};

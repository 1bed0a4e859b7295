use toolmesh_core::{CatalogedTool, ConnectionStatus};

use crate::mcp_link::McpLink;

/// Per-upstream state owned exclusively by the Cataloger. The transport
/// and client live inside `link`; once `status` leaves `Connected` the
/// link has already been torn down (§4.4: "owned, closed on transition
/// out of connected").
pub struct ServerConnection {
    pub server_key: String,
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
    pub server_name: Option<String>,
    pub server_version: Option<String>,
    pub tools: Vec<CatalogedTool>,
    pub auth_pending: bool,
    pub(crate) link: Option<McpLink>,
}

impl ServerConnection {
    pub fn placeholder(server_key: String) -> Self {
        Self {
            server_key,
            status: ConnectionStatus::Connecting,
            last_error: None,
            server_name: None,
            server_version: None,
            tools: Vec::new(),
            auth_pending: false,
            link: None,
        }
    }

    pub fn to_info(&self) -> toolmesh_core::ServerConnectionInfo {
        toolmesh_core::ServerConnectionInfo {
            server_key: self.server_key.clone(),
            status: self.status,
            last_error: self.last_error.clone(),
            server_name: self.server_name.clone(),
            server_version: self.server_version.clone(),
            tools: self.tools.clone(),
            auth_pending: self.auth_pending,
        }
    }
}

use thiserror::Error;
use toolmesh_protocol::{JsonRpcError, JsonRpcErrorCode};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("method not found: {0}")]
    UnknownMethod(String),

    #[error("unknown meta-tool \"{0}\"")]
    UnknownTool(String),

    #[error(transparent)]
    Tools(#[from] toolmesh_tools::ToolsError),

    #[error("malformed JSON-RPC payload: {0}")]
    Serde(#[from] serde_json::Error),
}

impl SessionError {
    /// Maps a dispatch failure onto the JSON-RPC error codes the teacher's
    /// `process_request` uses: bad shape is `InvalidParams`, an unknown
    /// method/tool is `MethodNotFound`, anything else is `InternalError`.
    pub fn into_jsonrpc_error(self) -> JsonRpcError {
        match self {
            SessionError::InvalidParams(_) | SessionError::Serde(_) => {
                JsonRpcError::new(JsonRpcErrorCode::InvalidParams, self.to_string())
            }
            SessionError::UnknownMethod(ref method) => {
                JsonRpcError::new(JsonRpcErrorCode::MethodNotFound, format!("method not found: {method}"))
            }
            SessionError::UnknownTool(ref name) => {
                JsonRpcError::new(JsonRpcErrorCode::MethodNotFound, format!("unknown tool: {name}"))
            }
            SessionError::Tools(toolmesh_tools::ToolsError::InvalidParams(ref msg)) => {
                JsonRpcError::new(JsonRpcErrorCode::InvalidParams, msg.clone())
            }
            SessionError::Tools(ref err) => {
                JsonRpcError::new(JsonRpcErrorCode::InternalError, err.to_string())
            }
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

use thiserror::Error;

/// Errors that stop a meta-tool handler before it can even produce an
/// in-band result. Everything else — ambiguous names, policy denial,
/// confirmation required, a failed upstream invocation — is folded into
/// the handler's `ToolsCallResult` instead of raised here (§7
/// "exceptional errors never cross the meta-tool boundary").
#[derive(Debug, Error)]
pub enum ToolsError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("unknown meta-tool \"{0}\"")]
    UnknownTool(String),

    #[error(transparent)]
    Index(#[from] toolmesh_index::IndexError),

    #[error(transparent)]
    Retriever(#[from] toolmesh_retriever::RetrieverError),
}

pub type ToolsResult<T> = Result<T, ToolsError>;

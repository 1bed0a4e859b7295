//! Shared error taxonomy.
//!
//! Each sub-crate defines its own narrow error enum; this one is the
//! umbrella type that glue code (the daemon, the CLI, the meta-tool
//! handlers) converts everything into before deciding how to surface it.
//! The ten variants mirror the error kinds named in the component design:
//! configuration, upstream connect, upstream auth, name resolution,
//! policy denial, confirmation required, upstream invocation, storage,
//! daemon protocol, and background refresh.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolmeshError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to connect to upstream \"{server_key}\": {message}")]
    UpstreamConnect { server_key: String, message: String },

    #[error("upstream \"{server_key}\" requires interactive authorization: {message}")]
    UpstreamAuthRequired { server_key: String, message: String },

    #[error("ambiguous tool name \"{name}\"")]
    AmbiguousTool {
        name: String,
        alternatives: Vec<String>,
    },

    #[error("tool \"{name}\" not found")]
    ToolNotFound { name: String },

    #[error("tool \"{qualified_name}\" is not in the allow list")]
    PolicyDenied { qualified_name: String, reason: String },

    #[error("confirmation required for \"{qualified_name}\"")]
    ConfirmationRequired {
        qualified_name: String,
        confirmation_token: String,
    },

    #[error("upstream invocation of \"{qualified_name}\" failed: {message}")]
    UpstreamInvocation { qualified_name: String, message: String },

    #[error("index store error: {0}")]
    Storage(String),

    #[error("daemon protocol error: {0}")]
    DaemonProtocol(String),

    #[error("background refresh error: {0}")]
    Refresh(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type ToolmeshResult<T> = Result<T, ToolmeshError>;

impl ToolmeshError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn upstream_connect(server_key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::UpstreamConnect {
            server_key: server_key.into(),
            message: msg.into(),
        }
    }

    /// Whether the error kind can legitimately be retried by an automatic
    /// reconnect loop (connect/refresh failures), as opposed to ones that
    /// are definitional (ambiguous name, policy denial) and will never
    /// change on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamConnect { .. } | Self::Refresh(_) | Self::Io(_)
        )
    }
}

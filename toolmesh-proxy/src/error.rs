use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no daemon registry found at {path} and spawning is disabled")]
    NoDaemon { path: String },

    #[error("daemon did not reply with helloAck: {reason}")]
    HandshakeFailed { reason: String },

    #[error(transparent)]
    Endpoint(#[from] toolmesh_daemon::DaemonError),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ProxyResult<T> = Result<T, ProxyError>;

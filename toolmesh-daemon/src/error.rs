use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("daemon already running at {endpoint}")]
    AlreadyRunning { endpoint: String },

    #[error("endpoint \"{0}\" has a non-loopback host; only 127.0.0.0/8, ::1, and localhost are accepted")]
    NonLoopbackHost(String),

    #[error("malformed endpoint \"{0}\"")]
    MalformedEndpoint(String),

    #[error("failed to prepare daemon directory {path}: {source}")]
    DaemonDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Registry(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type DaemonResult<T> = Result<T, DaemonError>;

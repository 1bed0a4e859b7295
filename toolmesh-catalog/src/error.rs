use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("upstream {server_key}: connect timed out")]
    ConnectTimeout { server_key: String },

    #[error("upstream {server_key}: {message}")]
    Connect { server_key: String, message: String },

    #[error("upstream {server_key}: authorization required: {message}")]
    AuthRequired { server_key: String, message: String },

    #[error("upstream {server_key} is not connected")]
    NotConnected { server_key: String },

    #[error("upstream {qualified_name}: {message}")]
    Invocation {
        qualified_name: String,
        message: String,
    },

    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport protocol error: {0}")]
    Protocol(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("index migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("embedding dimension mismatch: store uses {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },
}

pub type IndexResult<T> = Result<T, IndexError>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrieverError {
    #[error("index error: {0}")]
    Index(#[from] toolmesh_index::IndexError),

    #[error("upstream catalog error: {0}")]
    Catalog(#[from] toolmesh_catalog::CatalogError),
}

pub type RetrieverResult<T> = Result<T, RetrieverError>;

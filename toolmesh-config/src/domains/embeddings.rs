//! Optional embedding provider wiring for semantic/hybrid search.
//!
//! The embedding provider itself is a boundary contract
//! (`toolmesh_retriever::EmbeddingProvider`) supplied by the host
//! process; this domain only carries the flag that decides whether the
//! retriever is allowed to use one, plus the model identifier forwarded
//! to whichever provider is wired in.

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, Validatable};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    /// Whether `search(mode: semantic|hybrid)` is allowed to consult an
    /// embedding provider. When false, semantic/hybrid requests fall back
    /// to fast search regardless of whether a provider is wired in.
    pub enabled: bool,
    /// Identifier passed through to the embedding provider, opaque to
    /// this crate.
    pub model: String,
    /// Expected embedding dimensionality; used to reject provider output
    /// that doesn't match what's already stored in the index.
    pub dimensions: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }
}

impl Validatable for EmbeddingsConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.enabled {
            validate_required_string(&self.model, "model", self.domain_name())?;
            if self.dimensions == 0 {
                return Err(self.validation_error("dimensions must be greater than 0 when enabled"));
            }
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "embeddings"
    }
}

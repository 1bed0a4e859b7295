//! Domain-driven configuration management for toolmesh.
//!
//! Configuration is split by functional domain (upstreams, security,
//! find_tools, selection_cache, embeddings, index, daemon, logging),
//! each independently validated and independently overridable from the
//! environment, then assembled into one `ToolmeshConfig` root.

pub mod domains;
pub mod error;
pub mod loader;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

pub use domains::{
    daemon::DaemonConfig, embeddings::EmbeddingsConfig, find_tools::FindToolsConfig,
    index::IndexConfig, logging::LoggingConfig, security::SecurityConfig,
    selection_cache::SelectionCacheConfig, ToolmeshConfig,
};

pub use domains::utils::{serde_duration, serde_duration_option};

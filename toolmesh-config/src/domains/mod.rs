//! Domain-specific configuration modules

pub mod daemon;
pub mod embeddings;
pub mod find_tools;
pub mod index;
pub mod logging;
pub mod security;
pub mod selection_cache;
pub mod utils;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::Validatable;
use toolmesh_core::UpstreamConfig;

/// Root configuration, combining every domain a `toolmesh` daemon or
/// stdio session needs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ToolmeshConfig {
    /// Upstream MCP server connections, keyed by server-key.
    #[serde(default)]
    pub upstreams: HashMap<String, UpstreamConfig>,

    /// Glob-based block/confirm/allow policy.
    #[serde(default)]
    pub security: security::SecurityConfig,

    /// `find_tools` defaults and limits.
    #[serde(default)]
    pub find_tools: find_tools::FindToolsConfig,

    /// Co-occurrence suggestion behavior.
    #[serde(default)]
    pub selection_cache: selection_cache::SelectionCacheConfig,

    /// Optional semantic/hybrid search embedding provider wiring.
    #[serde(default)]
    pub embeddings: embeddings::EmbeddingsConfig,

    /// Index store location and refresh cadence.
    #[serde(default)]
    pub index: index::IndexConfig,

    /// Daemon endpoint and lifecycle timers.
    #[serde(default)]
    pub daemon: daemon::DaemonConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl ToolmeshConfig {
    /// Validate every domain independently, short-circuiting on the
    /// first failure. Each domain reports its own name in the error so
    /// the caller doesn't need to guess which section was wrong.
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.security.validate()?;
        self.find_tools.validate()?;
        self.selection_cache.validate()?;
        self.embeddings.validate()?;
        self.index.validate()?;
        self.daemon.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Renders a commented starting-point config file.
    pub fn generate_sample() -> String {
        let config = ToolmeshConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = ToolmeshConfig::default();
        assert!(config.validate_all().is_ok());
    }

    #[test]
    fn sample_config_round_trips_through_yaml() {
        let sample = ToolmeshConfig::generate_sample();
        let parsed: ToolmeshConfig = serde_yaml::from_str(&sample).unwrap();
        assert!(parsed.validate_all().is_ok());
    }
}

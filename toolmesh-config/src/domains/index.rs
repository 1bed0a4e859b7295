//! Index store location and background refresh cadence.

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Path to the SQLite database file. `None` means in-memory, used by
    /// tests and ephemeral `mcp` stdio sessions.
    pub database_path: Option<String>,
    /// Background refresh tick interval.
    pub refresh_interval_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            refresh_interval_ms: 30_000,
        }
    }
}

impl Validatable for IndexConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.refresh_interval_ms as i64,
            "refresh_interval_ms",
            self.domain_name(),
        )?;
        if let Some(path) = &self.database_path {
            if path.is_empty() {
                return Err(self.validation_error("database_path cannot be an empty string"));
            }
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "index"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_in_memory() {
        let config = IndexConfig::default();
        assert!(config.database_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_refresh_interval_is_rejected() {
        let config = IndexConfig {
            database_path: None,
            refresh_interval_ms: 0,
        };
        assert!(config.validate().is_err());
    }
}

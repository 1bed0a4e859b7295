//! `find_tools` meta-tool defaults: result limits, default search mode,
//! and default detail level.

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use toolmesh_core::{DetailLevel, SearchMode};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FindToolsConfig {
    /// Result count used when the caller omits `limit`.
    pub default_limit: usize,
    /// Upper bound a caller's `limit` is clamped to.
    pub max_limit: usize,
    /// Search mode used when the caller omits `mode`.
    pub default_mode: SearchMode,
    /// Detail level used when the caller omits `detail_level`.
    pub default_detail_level: DetailLevel,
}

impl Default for FindToolsConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 50,
            default_mode: SearchMode::Fast,
            default_detail_level: DetailLevel::L1,
        }
    }
}

impl Validatable for FindToolsConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.default_limit as i64, "default_limit", self.domain_name())?;
        validate_positive(self.max_limit as i64, "max_limit", self.domain_name())?;
        if self.default_limit > self.max_limit {
            return Err(self.validation_error(format!(
                "default_limit ({}) cannot exceed max_limit ({})",
                self.default_limit, self.max_limit
            )));
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "find_tools"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let config = FindToolsConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.default_limit <= config.max_limit);
    }

    #[test]
    fn default_limit_above_max_fails() {
        let config = FindToolsConfig {
            default_limit: 100,
            max_limit: 50,
            default_mode: SearchMode::Fast,
            default_detail_level: DetailLevel::L1,
        };
        assert!(config.validate().is_err());
    }
}

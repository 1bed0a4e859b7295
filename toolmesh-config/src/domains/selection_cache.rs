//! Co-occurrence-based "suggested tools" bundling: how eagerly
//! `find_tools` appends `suggested_tools` to a result set.

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::Validatable;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionCacheConfig {
    /// Whether co-occurrence tracking and suggestion is active at all.
    pub enabled: bool,
    /// Minimum recorded co-occurrence count before a pairing is
    /// considered a suggestion candidate.
    pub min_cooccurrence_threshold: u32,
    /// Maximum number of suggested tools appended to a `find_tools`
    /// response. Zero disables suggestions even when `enabled`.
    pub max_bundle_suggestions: usize,
}

impl Default for SelectionCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_cooccurrence_threshold: 2,
            max_bundle_suggestions: 3,
        }
    }
}

impl Validatable for SelectionCacheConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.min_cooccurrence_threshold == 0 {
            return Err(self.validation_error("min_cooccurrence_threshold must be at least 1"));
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "selection_cache"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_enables_suggestions() {
        let config = SelectionCacheConfig::default();
        assert!(config.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let config = SelectionCacheConfig {
            enabled: true,
            min_cooccurrence_threshold: 0,
            max_bundle_suggestions: 3,
        };
        assert!(config.validate().is_err());
    }
}

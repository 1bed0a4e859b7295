//! Policy domain: the block/confirm/allow glob pattern lists that feed
//! `toolmesh_policy::PolicyConfig::parse`.

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::{validate_pattern_shape, Validatable};

/// Raw, unparsed pattern lists as they come off disk/env. The daemon
/// hands these to `toolmesh_policy::PolicyConfig::parse` at startup,
/// which does the actual glob compilation and drops malformed entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Patterns that are always denied, regardless of `allow`.
    pub block: Vec<String>,
    /// Patterns that require a confirmation token before execution.
    pub confirm: Vec<String>,
    /// Patterns that are permitted outright.
    pub allow: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            block: Vec::new(),
            confirm: Vec::new(),
            allow: vec!["*:*".to_string()],
        }
    }
}

impl Validatable for SecurityConfig {
    fn validate(&self) -> ConfigResult<()> {
        for pattern in self
            .block
            .iter()
            .chain(self.confirm.iter())
            .chain(self.allow.iter())
        {
            validate_pattern_shape(pattern, "pattern", self.domain_name())?;
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "security"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allows_everything() {
        let config = SecurityConfig::default();
        assert_eq!(config.allow, vec!["*:*".to_string()]);
        assert!(config.block.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_pattern_fails_validation() {
        let config = SecurityConfig {
            block: vec!["no-colon-here".to_string()],
            confirm: Vec::new(),
            allow: Vec::new(),
        };
        assert!(config.validate().is_err());
    }
}

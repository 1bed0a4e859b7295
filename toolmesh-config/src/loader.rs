//! Configuration loading and environment variable handling

use std::path::Path;
use std::str::FromStr;

use crate::domains::ToolmeshConfig;
use crate::error::{ConfigError, ConfigResult};

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "TOOLMESH".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<ToolmeshConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: ToolmeshConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from defaults plus environment variables only
    pub fn from_env(&self) -> ConfigResult<ToolmeshConfig> {
        let mut config = ToolmeshConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain: defaults -> file -> env.
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<ToolmeshConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut ToolmeshConfig) -> ConfigResult<()> {
        self.apply_security_overrides(&mut config.security)?;
        self.apply_find_tools_overrides(&mut config.find_tools)?;
        self.apply_selection_cache_overrides(&mut config.selection_cache)?;
        self.apply_embeddings_overrides(&mut config.embeddings)?;
        self.apply_index_overrides(&mut config.index)?;
        self.apply_daemon_overrides(&mut config.daemon)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    fn apply_security_overrides(
        &self,
        config: &mut crate::domains::security::SecurityConfig,
    ) -> ConfigResult<()> {
        if let Ok(raw) = self.get_env_var("SECURITY_BLOCK") {
            config.block = split_comma_list(&raw);
        }
        if let Ok(raw) = self.get_env_var("SECURITY_CONFIRM") {
            config.confirm = split_comma_list(&raw);
        }
        if let Ok(raw) = self.get_env_var("SECURITY_ALLOW") {
            config.allow = split_comma_list(&raw);
        }
        Ok(())
    }

    fn apply_find_tools_overrides(
        &self,
        config: &mut crate::domains::find_tools::FindToolsConfig,
    ) -> ConfigResult<()> {
        if let Ok(raw) = self.get_env_var("FIND_TOOLS_DEFAULT_LIMIT") {
            config.default_limit = raw
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid FIND_TOOLS_DEFAULT_LIMIT: {}", e)))?;
        }
        if let Ok(raw) = self.get_env_var("FIND_TOOLS_MAX_LIMIT") {
            config.max_limit = raw
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid FIND_TOOLS_MAX_LIMIT: {}", e)))?;
        }
        Ok(())
    }

    fn apply_selection_cache_overrides(
        &self,
        config: &mut crate::domains::selection_cache::SelectionCacheConfig,
    ) -> ConfigResult<()> {
        if let Ok(raw) = self.get_env_var("SELECTION_CACHE_ENABLED") {
            config.enabled = raw
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid SELECTION_CACHE_ENABLED: {}", e)))?;
        }
        if let Ok(raw) = self.get_env_var("SELECTION_CACHE_MAX_BUNDLE_SUGGESTIONS") {
            config.max_bundle_suggestions = raw.parse().map_err(|e| {
                ConfigError::EnvError(format!(
                    "Invalid SELECTION_CACHE_MAX_BUNDLE_SUGGESTIONS: {}",
                    e
                ))
            })?;
        }
        Ok(())
    }

    fn apply_embeddings_overrides(
        &self,
        config: &mut crate::domains::embeddings::EmbeddingsConfig,
    ) -> ConfigResult<()> {
        if let Ok(raw) = self.get_env_var("EMBEDDINGS_ENABLED") {
            config.enabled = raw
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid EMBEDDINGS_ENABLED: {}", e)))?;
        }
        if let Ok(raw) = self.get_env_var("EMBEDDINGS_MODEL") {
            config.model = raw;
        }
        Ok(())
    }

    fn apply_index_overrides(
        &self,
        config: &mut crate::domains::index::IndexConfig,
    ) -> ConfigResult<()> {
        if let Ok(raw) = self.get_env_var("INDEX_DATABASE_PATH") {
            config.database_path = Some(raw);
        }
        if let Ok(raw) = self.get_env_var("INDEX_REFRESH_INTERVAL_MS") {
            config.refresh_interval_ms = raw.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid INDEX_REFRESH_INTERVAL_MS: {}", e))
            })?;
        }
        Ok(())
    }

    fn apply_daemon_overrides(
        &self,
        config: &mut crate::domains::daemon::DaemonConfig,
    ) -> ConfigResult<()> {
        if let Ok(raw) = self.get_env_var("DAEMON_ENDPOINT") {
            config.endpoint = raw;
        }
        if let Ok(raw) = self.get_env_var("DAEMON_DIR") {
            config.daemon_dir = raw;
        }
        if let Ok(raw) = self.get_env_var("DAEMON_SHARED_SECRET") {
            config.shared_secret = Some(raw);
        }
        if let Ok(raw) = self.get_env_var("DAEMON_HEARTBEAT_TIMEOUT_MS") {
            config.heartbeat_timeout_ms = raw.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid DAEMON_HEARTBEAT_TIMEOUT_MS: {}", e))
            })?;
        }
        if let Ok(raw) = self.get_env_var("DAEMON_IDLE_TIMEOUT_MS") {
            config.idle_timeout_ms = raw.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid DAEMON_IDLE_TIMEOUT_MS: {}", e))
            })?;
        }
        Ok(())
    }

    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

fn split_comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn from_env_with_no_overrides_yields_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let loader = ConfigLoader::with_prefix("TOOLMESH_TEST_NOOVERRIDE");
        let config = loader.from_env().unwrap();
        assert_eq!(config.find_tools.default_limit, 10);
    }

    #[test]
    fn log_level_override_is_applied() {
        let _guard = ENV_LOCK.lock().unwrap();
        let prefix = "TOOLMESH_TEST_LOGLEVEL";
        std::env::set_var(format!("{}_LOG_LEVEL", prefix), "debug");
        let loader = ConfigLoader::with_prefix(prefix);
        let config = loader.from_env().unwrap();
        assert_eq!(config.logging.level, crate::domains::logging::LogLevel::Debug);
        std::env::remove_var(format!("{}_LOG_LEVEL", prefix));
    }

    #[test]
    fn file_load_merges_with_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toolmesh.yaml");
        std::fs::write(&path, "find_tools:\n  default_limit: 5\n  max_limit: 20\n").unwrap();

        let prefix = "TOOLMESH_TEST_FILELOAD";
        std::env::set_var(format!("{}_FIND_TOOLS_MAX_LIMIT", prefix), "30");
        let loader = ConfigLoader::with_prefix(prefix);
        let config = loader.from_file(&path).unwrap();

        assert_eq!(config.find_tools.default_limit, 5);
        assert_eq!(config.find_tools.max_limit, 30);
        std::env::remove_var(format!("{}_FIND_TOOLS_MAX_LIMIT", prefix));
    }
}

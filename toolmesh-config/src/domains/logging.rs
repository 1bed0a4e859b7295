//! Logging configuration

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use crate::validation::{Validatable, validate_required_string};
use crate::error::ConfigResult;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default)]
    pub level: LogLevel,

    /// Log format
    #[serde(default)]
    pub format: LogFormat,

    /// Log targets configuration
    #[serde(default)]
    pub targets: Vec<LogTarget>,

    /// Whether to include source location in logs
    #[serde(default = "crate::domains::utils::default_false")]
    pub include_location: bool,

    /// Whether to enable structured logging
    #[serde(default = "crate::domains::utils::default_true")]
    pub structured: bool,
}

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Log format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
    Compact,
    Pretty,
}

/// Log target configuration. The daemon always logs to a rolling file
/// (stdout/stderr are reserved for the stdio proxy's framed protocol);
/// the stdio-direct `mcp` subcommand logs to stderr only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogTarget {
    Console {
        #[serde(default)]
        level: Option<LogLevel>,
    },
    File {
        path: String,
        #[serde(default)]
        level: Option<LogLevel>,
        #[serde(default = "default_max_file_size")]
        max_size_bytes: usize,
        #[serde(default = "default_max_files")]
        max_files: usize,
    },
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
            targets: vec![LogTarget::Console { level: None }],
            include_location: false,
            structured: true,
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Text
    }
}

impl LogLevel {
    /// The `tracing_subscriber::EnvFilter` directive this level maps to.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

impl Validatable for LoggingConfig {
    fn validate(&self) -> ConfigResult<()> {
        for target in &self.targets {
            target.validate()?;
        }
        if self.targets.is_empty() {
            return Err(self.validation_error("At least one log target must be configured"));
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "logging"
    }
}

impl Validatable for LogTarget {
    fn validate(&self) -> ConfigResult<()> {
        match self {
            LogTarget::Console { .. } => Ok(()),
            LogTarget::File {
                path,
                max_size_bytes,
                max_files,
                ..
            } => {
                validate_required_string(path, "path", self.domain_name())?;
                if *max_size_bytes == 0 {
                    return Err(self.validation_error("max_size_bytes must be greater than 0"));
                }
                if *max_files == 0 {
                    return Err(self.validation_error("max_files must be greater than 0"));
                }
                Ok(())
            }
        }
    }

    fn domain_name(&self) -> &'static str {
        "logging.target"
    }
}

fn default_max_file_size() -> usize {
    10 * 1024 * 1024
}

fn default_max_files() -> usize {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_from_str() {
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("WARN").unwrap(), LogLevel::Warn);
        assert!(LogLevel::from_str("invalid").is_err());
    }

    #[test]
    fn logging_config_defaults_to_one_console_target() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.targets.len(), 1);
    }

    #[test]
    fn empty_targets_fail_validation() {
        let mut config = LoggingConfig::default();
        config.targets.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_target_requires_nonzero_limits() {
        let invalid = LogTarget::File {
            path: String::new(),
            level: None,
            max_size_bytes: 0,
            max_files: 0,
        };
        assert!(invalid.validate().is_err());
    }
}

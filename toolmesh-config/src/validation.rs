//! Configuration validation traits and utilities

use crate::error::{ConfigError, ConfigResult};

/// Trait for validatable configuration
pub trait Validatable {
    /// Validate the configuration
    fn validate(&self) -> ConfigResult<()>;

    /// Get the domain name for error reporting
    fn domain_name(&self) -> &'static str;

    /// Helper to create a domain-specific validation error
    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::DomainError {
            domain: self.domain_name().to_string(),
            message: message.into(),
        }
    }
}

/// Validate a required string field
pub fn validate_required_string(value: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if value.is_empty() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} cannot be empty", field_name),
        });
    }
    Ok(())
}

/// Validate a positive number
pub fn validate_positive<T>(value: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value <= T::default() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must be greater than 0, got {}", field_name, value),
        });
    }
    Ok(())
}

/// Validate an enum choice
pub fn validate_enum_choice<T>(
    value: &str,
    valid_choices: &[T],
    field_name: &str,
    domain: &str,
) -> ConfigResult<()>
where
    T: AsRef<str>,
{
    let valid: Vec<&str> = valid_choices.iter().map(|c| c.as_ref()).collect();

    if !valid.iter().any(|&v| v.eq_ignore_ascii_case(value)) {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!(
                "{} has invalid value '{}'. Valid choices: {}",
                field_name,
                value,
                valid.join(", ")
            ),
        });
    }

    Ok(())
}

/// Validate a port number
pub fn validate_port_range(port: u16, field_name: &str, domain: &str) -> ConfigResult<()> {
    if port == 0 {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} cannot be 0", field_name),
        });
    }

    if port <= 1023 {
        tracing::warn!(
            "{} port {} is in the reserved range (1-1023)",
            field_name,
            port
        );
    }

    Ok(())
}

/// Validate a glob pattern of the `<server-glob>:<tool-glob>` shape used by
/// the security domain, without compiling it — the actual glob parsing
/// happens downstream in `toolmesh_policy::PolicyConfig::parse`.
pub fn validate_pattern_shape(pattern: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if pattern.is_empty() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} cannot be empty", field_name),
        });
    }
    if pattern.matches(':').count() != 1 {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!(
                "{} '{}' must contain exactly one ':' separating server and tool globs",
                field_name, pattern
            ),
        });
    }
    Ok(())
}

//! Daemon endpoint, lifecycle timers, and the directory its registry
//! file/socket live under.

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, Validatable};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Loopback endpoint the daemon binds: a filesystem socket path, or
    /// `tcp://host:port` with a loopback host.
    pub endpoint: String,
    /// Directory the registry file and (for Unix sockets) the socket
    /// file live in. Created with 0700 permissions if missing.
    pub daemon_dir: String,
    /// Optional shared secret a connecting proxy must present in its
    /// `hello` frame.
    pub shared_secret: Option<String>,
    /// How long a session may go without a heartbeat before the sweep
    /// disconnects it.
    pub heartbeat_timeout_ms: u64,
    /// How long the daemon waits with zero authenticated sessions before
    /// shutting itself down.
    pub idle_timeout_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            daemon_dir: default_daemon_dir(),
            shared_secret: None,
            heartbeat_timeout_ms: 15_000,
            idle_timeout_ms: 5_000,
        }
    }
}

fn default_daemon_dir() -> String {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("toolmesh")
        .to_string_lossy()
        .into_owned()
}

fn default_endpoint() -> String {
    format!("{}/daemon.sock", default_daemon_dir())
}

impl Validatable for DaemonConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.endpoint, "endpoint", self.domain_name())?;
        validate_required_string(&self.daemon_dir, "daemon_dir", self.domain_name())?;
        validate_positive(
            self.heartbeat_timeout_ms as i64,
            "heartbeat_timeout_ms",
            self.domain_name(),
        )?;
        validate_positive(
            self.idle_timeout_ms as i64,
            "idle_timeout_ms",
            self.domain_name(),
        )?;

        if let Some(stripped) = self.endpoint.strip_prefix("tcp://") {
            let host = stripped.rsplit_once(':').map(|(h, _)| h).unwrap_or(stripped);
            if !is_loopback_host(host) {
                return Err(self.validation_error(format!(
                    "endpoint host '{}' is not a loopback address; only 127.0.0.0/8, ::1, and \
                     localhost are accepted",
                    host
                )));
            }
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "daemon"
    }
}

fn is_loopback_host(host: &str) -> bool {
    use std::net::IpAddr;

    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.is_loopback(),
        Ok(IpAddr::V6(v6)) => {
            v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback())
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint_is_a_unix_socket_path() {
        let config = DaemonConfig::default();
        assert!(!config.endpoint.starts_with("tcp://"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn tcp_endpoint_with_loopback_host_is_valid() {
        let config = DaemonConfig {
            endpoint: "tcp://127.0.0.1:4455".to_string(),
            ..DaemonConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn tcp_endpoint_with_non_loopback_host_is_rejected() {
        let config = DaemonConfig {
            endpoint: "tcp://0.0.0.0:4455".to_string(),
            ..DaemonConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn tcp_endpoint_with_localhost_is_valid() {
        let config = DaemonConfig {
            endpoint: "tcp://localhost:4455".to_string(),
            ..DaemonConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn tcp_endpoint_with_ipv4_mapped_ipv6_loopback_is_valid() {
        let config = DaemonConfig {
            endpoint: "tcp://::ffff:127.0.0.1:4455".to_string(),
            ..DaemonConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}

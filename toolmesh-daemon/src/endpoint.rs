//! Parses a §4.10 daemon endpoint string into either a filesystem
//! socket path or a loopback `tcp://host:port` pair, and probes whether
//! something is already listening there.
//!
//! Host validation is intentionally duplicated from
//! `toolmesh_config::DaemonConfig::validate` — that check runs once at
//! config-load time against the string form; this runs at bind time
//! against the parsed form, since a config can be constructed directly
//! (bypassing validation) in tests.

use std::net::IpAddr;
use std::time::Duration;

use tokio::net::{TcpStream, UnixStream};

use crate::error::{DaemonError, DaemonResult};

const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(String),
    Tcp { host: String, port: u16 },
}

impl Endpoint {
    pub fn parse(raw: &str) -> DaemonResult<Self> {
        match raw.strip_prefix("tcp://") {
            Some(rest) => {
                let (host, port) = rest
                    .rsplit_once(':')
                    .ok_or_else(|| DaemonError::MalformedEndpoint(raw.to_string()))?;
                let port: u16 = port
                    .parse()
                    .map_err(|_| DaemonError::MalformedEndpoint(raw.to_string()))?;
                if !is_loopback_host(host) {
                    return Err(DaemonError::NonLoopbackHost(raw.to_string()));
                }
                Ok(Endpoint::Tcp {
                    host: host.to_string(),
                    port,
                })
            }
            None => Ok(Endpoint::Unix(raw.to_string())),
        }
    }

    pub fn display(&self) -> String {
        match self {
            Endpoint::Unix(path) => path.clone(),
            Endpoint::Tcp { host, port } => format!("tcp://{host}:{port}"),
        }
    }

    /// §4.10 step 2/3: a short-timeout connect probe used to tell a
    /// stale registry/socket apart from a live daemon.
    pub async fn probe(&self) -> bool {
        match self {
            Endpoint::Unix(path) => {
                if !std::path::Path::new(path).exists() {
                    return false;
                }
                tokio::time::timeout(PROBE_TIMEOUT, UnixStream::connect(path))
                    .await
                    .map(|r| r.is_ok())
                    .unwrap_or(false)
            }
            Endpoint::Tcp { host, port } => {
                if *port == 0 {
                    return false;
                }
                tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect((host.as_str(), *port)))
                    .await
                    .map(|r| r.is_ok())
                    .unwrap_or(false)
            }
        }
    }
}

/// Accepts literal `127.0.0.0/8`, `::1`, the IPv4-mapped IPv6 forms of
/// `127.0.0.0/8` (e.g. `::ffff:127.0.0.1`, which `Ipv6Addr::is_loopback`
/// does not recognize on its own since it only matches `::1` exactly),
/// and the hostname `localhost` (§4.10).
fn is_loopback_host(host: &str) -> bool {
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
    fn unix_path_parses_as_unix_variant() {
        let endpoint = Endpoint::parse("/tmp/toolmesh/daemon.sock").unwrap();
        assert_eq!(endpoint, Endpoint::Unix("/tmp/toolmesh/daemon.sock".to_string()));
    }

    #[test]
    fn loopback_tcp_parses() {
        let endpoint = Endpoint::parse("tcp://127.0.0.1:4455").unwrap();
        assert_eq!(
            endpoint,
            Endpoint::Tcp {
                host: "127.0.0.1".to_string(),
                port: 4455
            }
        );
    }

    #[test]
    fn localhost_is_accepted() {
        assert!(Endpoint::parse("tcp://localhost:4455").is_ok());
    }

    #[test]
    fn ipv4_mapped_ipv6_loopback_is_accepted() {
        assert!(Endpoint::parse("tcp://::ffff:127.0.0.1:4455").is_ok());
    }

    #[test]
    fn ipv6_loopback_is_accepted() {
        assert!(Endpoint::parse("tcp://::1:4455").is_ok());
    }

    #[test]
    fn non_loopback_host_is_rejected() {
        assert!(matches!(
            Endpoint::parse("tcp://0.0.0.0:4455"),
            Err(DaemonError::NonLoopbackHost(_))
        ));
    }

    #[test]
    fn malformed_tcp_endpoint_is_rejected() {
        assert!(Endpoint::parse("tcp://127.0.0.1").is_err());
        assert!(Endpoint::parse("tcp://127.0.0.1:notaport").is_err());
    }

    #[tokio::test]
    async fn probe_of_nonexistent_unix_path_is_false() {
        let endpoint = Endpoint::Unix("/tmp/toolmesh-test-nonexistent.sock".to_string());
        assert!(!endpoint.probe().await);
    }
}

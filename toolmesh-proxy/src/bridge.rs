//! §4.11 Proxy Bridge: the process a client agent actually spawns. It
//! speaks newline-delimited JSON on both ends — MCP frames verbatim,
//! plus a `hello`/`heartbeat`/`goodbye` control handshake with the
//! daemon — and otherwise just relays bytes between them.
//!
//! Grounded on `toolmesh-daemon`'s `connection.rs` framing (the same
//! read-line/try-parse-as-control-else-forward loop, run from the
//! client's side of the same wire protocol) and, underneath that, on
//! the newline-delimited stdio framing in the teacher's
//! `ratchet-ipc/src/transport.rs` `StdioTransport`/`ChildProcessTransport`.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixStream};

use toolmesh_daemon::{read_registry, registry_path, Endpoint};
use toolmesh_protocol::ControlFrame;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, ProxyResult};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

const SPAWN_POLL_INTERVAL: Duration = Duration::from_millis(150);
const SPAWN_POLL_ATTEMPTS: u32 = 20;
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(500);
const MAX_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Host-provided hook for bringing up a daemon when none is registered.
/// The CLI's implementation execs `toolmesh serve` as a detached child;
/// tests can supply a no-op or a failing stub.
pub trait DaemonSpawner: Send + Sync {
    fn spawn(&self) -> ProxyResult<()>;
}

/// §9: at most one third of the daemon's `heartbeatTimeoutMs`, capped at
/// 5s so a very long daemon timeout doesn't produce a sluggish proxy.
fn heartbeat_interval(daemon_heartbeat_timeout_ms: u64) -> Duration {
    let third = Duration::from_millis(daemon_heartbeat_timeout_ms / 3);
    third.clamp(MIN_HEARTBEAT_INTERVAL, MAX_HEARTBEAT_INTERVAL)
}

/// §4.11 endpoint selection: explicit endpoint wins; otherwise the
/// registry (optionally after spawning a daemon and polling for it to
/// appear).
async fn resolve_endpoint(
    config: &ProxyConfig,
    spawner: Option<&dyn DaemonSpawner>,
) -> ProxyResult<(String, Option<String>)> {
    if let Some(endpoint) = &config.endpoint {
        return Ok((endpoint.clone(), config.shared_secret.clone()));
    }

    let path = registry_path(&config.daemon_dir, config.config_hash.as_deref());
    if let Some(entry) = read_registry(&path)? {
        return Ok((entry.endpoint, entry.shared_secret));
    }

    if config.no_spawn {
        return Err(ProxyError::NoDaemon {
            path: path.display().to_string(),
        });
    }

    let spawner = spawner.ok_or_else(|| ProxyError::NoDaemon {
        path: path.display().to_string(),
    })?;
    spawner.spawn()?;

    for _ in 0..SPAWN_POLL_ATTEMPTS {
        tokio::time::sleep(SPAWN_POLL_INTERVAL).await;
        if let Some(entry) = read_registry(&path)? {
            return Ok((entry.endpoint, entry.shared_secret));
        }
    }

    Err(ProxyError::NoDaemon {
        path: path.display().to_string(),
    })
}

async fn connect(endpoint_str: &str) -> ProxyResult<(BoxedReader, BoxedWriter)> {
    let endpoint = Endpoint::parse(endpoint_str)?;
    match endpoint {
        Endpoint::Unix(path) => {
            let stream = UnixStream::connect(&path).await?;
            let (reader, writer) = tokio::io::split(stream);
            Ok((Box::new(reader), Box::new(writer)))
        }
        Endpoint::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), port)).await?;
            let (reader, writer) = tokio::io::split(stream);
            Ok((Box::new(reader), Box::new(writer)))
        }
    }
}

async fn write_line(writer: &mut BoxedWriter, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Runs the bridge to completion: resolves the daemon, performs the
/// `hello`/`helloAck` handshake, then forwards MCP frames between the
/// parent's stdio and the daemon connection until either side closes.
pub async fn run_stdio_bridge(
    config: ProxyConfig,
    spawner: Option<&dyn DaemonSpawner>,
) -> ProxyResult<()> {
    let (endpoint, shared_secret) = resolve_endpoint(&config, spawner).await?;
    tracing::info!(endpoint = %endpoint, "proxy bridge connecting to daemon");

    let (daemon_reader, mut daemon_writer) = connect(&endpoint).await?;
    let mut daemon_reader = BufReader::new(daemon_reader);

    let hello = ControlFrame::Hello {
        client_id: config.client_id.clone(),
        shared_secret,
    };
    write_line(&mut daemon_writer, &hello.to_line()).await?;

    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = daemon_reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            return Err(ProxyError::HandshakeFailed {
                reason: "connection closed before helloAck".to_string(),
            });
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match ControlFrame::try_parse(trimmed) {
            Some(ControlFrame::HelloAck { session_id, is_owner }) => {
                tracing::info!(%session_id, is_owner, "proxy bridge authenticated");
                break;
            }
            Some(ControlFrame::Error { message }) => {
                return Err(ProxyError::HandshakeFailed { reason: message });
            }
            _ => {
                return Err(ProxyError::HandshakeFailed {
                    reason: "expected helloAck as the first frame".to_string(),
                });
            }
        }
    }

    forward(daemon_reader, daemon_writer, heartbeat_interval(config.daemon_heartbeat_timeout_ms)).await
}

/// The steady-state relay loop: three concurrent sources (stdin from
/// the parent client, frames from the daemon, and our own heartbeat
/// ticker) feeding two sinks (the daemon connection and stdout).
async fn forward(
    mut daemon_reader: BufReader<BoxedReader>,
    mut daemon_writer: BoxedWriter,
    heartbeat_every: Duration,
) -> ProxyResult<()> {
    let mut stdin_reader = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut heartbeat = tokio::time::interval(heartbeat_every);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut daemon_line = String::new();
    let mut stdin_line = String::new();

    loop {
        tokio::select! {
            result = daemon_reader.read_line(&mut daemon_line) => {
                let bytes_read = result?;
                if bytes_read == 0 {
                    tracing::info!("daemon closed the connection");
                    return Ok(());
                }
                let trimmed = daemon_line.trim().to_string();
                daemon_line.clear();
                if trimmed.is_empty() {
                    continue;
                }
                match ControlFrame::try_parse(&trimmed) {
                    Some(ControlFrame::OwnerChanged { owner_session_id }) => {
                        tracing::debug!(%owner_session_id, "owner changed");
                    }
                    Some(ControlFrame::Error { message }) => {
                        tracing::warn!(message = %message, "daemon sent a protocol error");
                        return Ok(());
                    }
                    Some(_) => {}
                    None => {
                        if let Err(err) = write_line(&mut stdout, &trimmed).await {
                            tracing::warn!(error = %err, "failed writing to stdout, exiting");
                            return Ok(());
                        }
                    }
                }
            }
            result = stdin_reader.read_line(&mut stdin_line) => {
                let bytes_read = result?;
                if bytes_read == 0 {
                    tracing::info!("parent stdin closed, sending goodbye");
                    let _ = write_line(&mut daemon_writer, &ControlFrame::Goodbye.to_line()).await;
                    return Ok(());
                }
                let trimmed = stdin_line.trim().to_string();
                stdin_line.clear();
                if trimmed.is_empty() {
                    continue;
                }
                if write_line(&mut daemon_writer, &trimmed).await.is_err() {
                    tracing::warn!("failed writing to daemon, exiting");
                    return Ok(());
                }
            }
            _ = heartbeat.tick() => {
                let _ = write_line(&mut daemon_writer, &ControlFrame::Heartbeat.to_line()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_interval_is_one_third_of_timeout_when_small() {
        assert_eq!(heartbeat_interval(3_000), Duration::from_millis(1_000));
    }

    #[test]
    fn heartbeat_interval_caps_at_five_seconds() {
        assert_eq!(heartbeat_interval(60_000), MAX_HEARTBEAT_INTERVAL);
    }

    #[test]
    fn heartbeat_interval_has_a_floor() {
        assert_eq!(heartbeat_interval(300), MIN_HEARTBEAT_INTERVAL);
    }

    #[tokio::test]
    async fn resolve_endpoint_prefers_explicit_over_registry() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProxyConfig {
            endpoint: Some("tcp://127.0.0.1:9999".to_string()),
            daemon_dir: dir.path().to_string_lossy().into_owned(),
            no_spawn: true,
            ..Default::default()
        };
        let (endpoint, _) = resolve_endpoint(&config, None).await.unwrap();
        assert_eq!(endpoint, "tcp://127.0.0.1:9999");
    }

    #[tokio::test]
    async fn resolve_endpoint_fails_fast_with_no_spawn_and_no_registry() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProxyConfig {
            daemon_dir: dir.path().to_string_lossy().into_owned(),
            no_spawn: true,
            ..Default::default()
        };
        assert!(matches!(
            resolve_endpoint(&config, None).await,
            Err(ProxyError::NoDaemon { .. })
        ));
    }

    #[tokio::test]
    async fn resolve_endpoint_reads_registry_when_present() {
        let dir = tempfile::tempdir().unwrap();
        toolmesh_daemon::ensure_daemon_dir(dir.path().to_str().unwrap()).unwrap();
        let path = registry_path(dir.path().to_str().unwrap(), None);
        let entry = toolmesh_daemon::RegistryEntry {
            daemon_id: uuid::Uuid::new_v4(),
            endpoint: "/tmp/toolmesh-test.sock".to_string(),
            pid: std::process::id(),
            started_at: chrono::Utc::now(),
            version: None,
            config_hash: None,
            shared_secret: Some("s3cret".to_string()),
        };
        let body = serde_json::to_string(&entry).unwrap();
        std::fs::write(&path, body).unwrap();

        let config = ProxyConfig {
            daemon_dir: dir.path().to_string_lossy().into_owned(),
            no_spawn: true,
            ..Default::default()
        };
        let (endpoint, secret) = resolve_endpoint(&config, None).await.unwrap();
        assert_eq!(endpoint, "/tmp/toolmesh-test.sock");
        assert_eq!(secret.as_deref(), Some("s3cret"));
    }

    struct FailingSpawner;
    impl DaemonSpawner for FailingSpawner {
        fn spawn(&self) -> ProxyResult<()> {
            Err(ProxyError::NoDaemon {
                path: "unreachable".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn resolve_endpoint_propagates_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProxyConfig {
            daemon_dir: dir.path().to_string_lossy().into_owned(),
            no_spawn: false,
            ..Default::default()
        };
        let spawner = FailingSpawner;
        assert!(resolve_endpoint(&config, Some(&spawner)).await.is_err());
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

use toolmesh_config::{DaemonConfig, FindToolsConfig};
use toolmesh_protocol::ControlFrame;
use toolmesh_resilience::ShutdownCoordinator;
use toolmesh_tools::MetaTools;

use crate::connection::handle_connection;
use crate::endpoint::Endpoint;
use crate::error::DaemonResult;
use crate::listener::Listener;
use crate::registry::{self, RegistryEntry};
use crate::session::DaemonSession;

const HEARTBEAT_SWEEP_TICK: Duration = Duration::from_secs(1);

/// Everything a per-connection task needs a reference to. Split out of
/// `DaemonServer` so `Arc<Shared>` can be handed to spawned tasks
/// without dragging the `run()`-local bind/registry state along.
pub struct Shared {
    pub sessions: RwLock<HashMap<Uuid, Arc<DaemonSession>>>,
    pub owner: RwLock<Option<Uuid>>,
    pub activity: Notify,
    pub tools: Arc<MetaTools>,
    pub find_tools_config: FindToolsConfig,
    pub daemon_config: DaemonConfig,
}

impl Shared {
    /// §4.10 owner election: recomputed only when the current owner slot
    /// is empty or points at a session that's gone. A disconnect always
    /// calls this; a connect only changes anything if the slot was empty.
    pub async fn elect_owner(&self) -> Option<Uuid> {
        let mut owner = self.owner.write().await;
        let sessions = self.sessions.read().await;

        if let Some(current) = *owner {
            if sessions.contains_key(&current) {
                return Some(current);
            }
        }

        let elected = sessions
            .values()
            .min_by_key(|session| (session.connected_at, session.session_id))
            .map(|session| session.session_id);
        *owner = elected;

        if let Some(owner_session_id) = elected {
            let frame = ControlFrame::OwnerChanged { owner_session_id }.to_line();
            for session in sessions.values() {
                let _ = session.outbound.send(frame.clone());
            }
        }

        elected
    }
}

pub struct DaemonServer {
    shared: Arc<Shared>,
}

impl DaemonServer {
    pub fn new(daemon_config: DaemonConfig, tools: Arc<MetaTools>, find_tools_config: FindToolsConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                sessions: RwLock::new(HashMap::new()),
                owner: RwLock::new(None),
                activity: Notify::new(),
                tools,
                find_tools_config,
                daemon_config,
            }),
        }
    }

    /// Runs the daemon to completion: binds, registers, accepts
    /// connections, and tears everything down on idle shutdown. Per
    /// §4.10 steps 1-6.
    pub async fn run(self: Arc<Self>, config_hash: Option<String>, version: Option<String>) -> DaemonResult<()> {
        registry::ensure_daemon_dir(&self.shared.daemon_config.daemon_dir)?;
        let requested_endpoint = Endpoint::parse(&self.shared.daemon_config.endpoint)?;

        if requested_endpoint.probe().await {
            return Err(crate::error::DaemonError::AlreadyRunning {
                endpoint: requested_endpoint.display(),
            });
        }
        if let Endpoint::Unix(path) = &requested_endpoint {
            let _ = std::fs::remove_file(path);
        }

        let listener = Listener::bind(&requested_endpoint).await?;
        let resolved_endpoint = listener.resolved_endpoint(&requested_endpoint)?;

        let registry_file =
            registry::registry_path(&self.shared.daemon_config.daemon_dir, config_hash.as_deref());
        let entry = RegistryEntry {
            daemon_id: Uuid::new_v4(),
            endpoint: resolved_endpoint.display(),
            pid: std::process::id(),
            started_at: Utc::now(),
            version,
            config_hash: config_hash.clone(),
            shared_secret: self.shared.daemon_config.shared_secret.clone(),
        };
        registry::write_registry(&registry_file, &entry)?;
        tracing::info!(endpoint = %resolved_endpoint.display(), "daemon listening");

        let idle_shutdown = Arc::new(Notify::new());
        let idle_task = tokio::spawn(idle_watch(self.shared.clone(), idle_shutdown.clone()));
        let sweep_task = tokio::spawn(heartbeat_sweep(self.shared.clone()));
        let signal_task = tokio::spawn(signal_watch(idle_shutdown.clone()));

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((reader, writer, peer)) => {
                            tracing::debug!(peer = %peer, "daemon connection accepted");
                            let shared = self.shared.clone();
                            tokio::spawn(async move { handle_connection(reader, writer, shared).await; });
                        }
                        Err(err) => tracing::warn!(error = %err, "accept failed"),
                    }
                }
                _ = idle_shutdown.notified() => {
                    tracing::info!("daemon shutting down");
                    break;
                }
            }
        }

        idle_task.abort();
        sweep_task.abort();
        signal_task.abort();

        // Active-task draining via the shared escalating-shutdown pattern:
        // one "task" per still-connected session, completed as soon as its
        // cancellation has been signalled (the connection task itself tears
        // down asynchronously, so this models intent to drain rather than
        // actual socket closure, escalating only if a session never reacts).
        let coordinator = Arc::new(ShutdownCoordinator::with_timeouts(
            Duration::from_secs(5),
            Duration::from_secs(2),
        ));
        let sessions: Vec<_> = self.shared.sessions.write().await.drain().map(|(_, s)| s).collect();
        for _ in &sessions {
            coordinator.task_started().await;
        }
        for session in &sessions {
            session.cancel.notify_waiters();
        }
        let drain_coordinator = coordinator.clone();
        let drain_count = sessions.len();
        tokio::spawn(async move {
            for _ in 0..drain_count {
                drain_coordinator.task_completed().await;
            }
        });
        if let Err(err) = coordinator.shutdown().await {
            tracing::warn!(error = %err, "session drain did not complete cleanly");
        }

        if let Endpoint::Unix(path) = &requested_endpoint {
            let _ = std::fs::remove_file(path);
        }
        registry::delete_registry(&registry_file)?;

        Ok(())
    }
}

/// Treats SIGTERM the same as the idle timeout: trigger the same
/// teardown path rather than maintaining a second shutdown sequence.
/// On non-Unix targets this future never resolves, leaving Ctrl+C
/// (handled by the process's default disposition) as the only signal.
async fn signal_watch(shutdown: Arc<Notify>) {
    #[cfg(unix)]
    {
        let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                return;
            }
        };
        term.recv().await;
        tracing::info!("received SIGTERM");
        shutdown.notify_waiters();
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}

/// §4.10 idle timeout: starts a timer when the authenticated session
/// count transitions from ≥1 to 0, cancelled by any new session.
async fn idle_watch(shared: Arc<Shared>, shutdown: Arc<Notify>) {
    let timeout = Duration::from_millis(shared.daemon_config.idle_timeout_ms);
    loop {
        let is_idle = shared.sessions.read().await.is_empty();
        if !is_idle {
            shared.activity.notified().await;
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                if shared.sessions.read().await.is_empty() {
                    shutdown.notify_waiters();
                    return;
                }
            }
            _ = shared.activity.notified() => {}
        }
    }
}

/// §4.10 heartbeat sweep: disconnects any session whose `lastSeen` is
/// older than `heartbeatTimeoutMs`.
async fn heartbeat_sweep(shared: Arc<Shared>) {
    let timeout = chrono::Duration::milliseconds(shared.daemon_config.heartbeat_timeout_ms as i64);
    let mut interval = tokio::time::interval(HEARTBEAT_SWEEP_TICK);
    loop {
        interval.tick().await;
        let now = Utc::now();
        let sessions = shared.sessions.read().await;
        for session in sessions.values() {
            if session.is_stale(now, timeout) {
                session.cancel.notify_waiters();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    use parking_lot::Mutex;
    use tokio::sync::mpsc;
    use toolmesh_catalog::Cataloger;
    use toolmesh_config::DaemonConfig;
    use toolmesh_index::IndexStore;
    use toolmesh_policy::{PolicyConfig, PolicyEngine};
    use toolmesh_retriever::Retriever;

    async fn shared_fixture() -> Arc<Shared> {
        let store = Arc::new(IndexStore::open(None).await.unwrap());
        let cataloger = Arc::new(Cataloger::new(StdDuration::from_secs(5)));
        let retriever = Arc::new(Retriever::new(store.clone(), cataloger.clone()));
        let (policy_config, _) = PolicyConfig::parse(&[], &[], &["*:*".to_string()]);
        let policy = Arc::new(PolicyEngine::new(policy_config));
        let tools = Arc::new(MetaTools::new(
            retriever,
            cataloger,
            policy,
            store,
            FindToolsConfig::default(),
            Default::default(),
        ));
        Arc::new(Shared {
            sessions: RwLock::new(HashMap::new()),
            owner: RwLock::new(None),
            activity: Notify::new(),
            tools,
            find_tools_config: FindToolsConfig::default(),
            daemon_config: DaemonConfig::default(),
        })
    }

    fn session_fixture(connected_at: chrono::DateTime<Utc>) -> (Arc<DaemonSession>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(DaemonSession {
            session_id: Uuid::new_v4(),
            client_id: None,
            connected_at,
            last_seen: Mutex::new(connected_at),
            outbound: tx,
            cancel: Arc::new(Notify::new()),
        });
        (session, rx)
    }

    #[tokio::test]
    async fn elect_owner_picks_earliest_connection() {
        let shared = shared_fixture().await;
        let now = Utc::now();
        let (earlier, _earlier_rx) = session_fixture(now - chrono::Duration::seconds(5));
        let (later, _later_rx) = session_fixture(now);
        let earlier_id = earlier.session_id;

        shared.sessions.write().await.insert(earlier.session_id, earlier);
        shared.sessions.write().await.insert(later.session_id, later);

        let owner = shared.elect_owner().await;
        assert_eq!(owner, Some(earlier_id));
    }

    #[tokio::test]
    async fn elect_owner_does_not_recompute_while_current_owner_is_present() {
        let shared = shared_fixture().await;
        let now = Utc::now();
        let (first, _first_rx) = session_fixture(now);
        let first_id = first.session_id;
        shared.sessions.write().await.insert(first.session_id, first);
        assert_eq!(shared.elect_owner().await, Some(first_id));

        let (second, _second_rx) = session_fixture(now - chrono::Duration::seconds(30));
        shared.sessions.write().await.insert(second.session_id, second);

        assert_eq!(shared.elect_owner().await, Some(first_id));
    }

    #[tokio::test]
    async fn elect_owner_reassigns_when_owner_disconnects() {
        let shared = shared_fixture().await;
        let now = Utc::now();
        let (first, _first_rx) = session_fixture(now);
        let first_id = first.session_id;
        let (second, _second_rx) = session_fixture(now + chrono::Duration::seconds(1));
        let second_id = second.session_id;

        shared.sessions.write().await.insert(first.session_id, first);
        shared.sessions.write().await.insert(second.session_id, second);
        assert_eq!(shared.elect_owner().await, Some(first_id));

        shared.sessions.write().await.remove(&first_id);
        assert_eq!(shared.elect_owner().await, Some(second_id));
    }

    #[tokio::test]
    async fn elect_owner_breaks_equal_connected_at_ties_by_session_id() {
        let shared = shared_fixture().await;
        let now = Utc::now();
        let (first, _first_rx) = session_fixture(now);
        let (second, _second_rx) = session_fixture(now);
        let expected = std::cmp::min(first.session_id, second.session_id);

        shared.sessions.write().await.insert(first.session_id, first);
        shared.sessions.write().await.insert(second.session_id, second);

        assert_eq!(shared.elect_owner().await, Some(expected));
    }
}

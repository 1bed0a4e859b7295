//! One `DaemonSession` per authenticated connection: the bookkeeping
//! the daemon needs for owner election and the heartbeat sweep. The
//! per-connection I/O loop lives in `connection.rs`; this is just the
//! shared, lock-free-per-field record the server's session map holds.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

pub struct DaemonSession {
    pub session_id: Uuid,
    pub client_id: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub last_seen: Mutex<DateTime<Utc>>,
    pub outbound: mpsc::UnboundedSender<String>,
    pub cancel: std::sync::Arc<Notify>,
}

impl DaemonSession {
    pub fn touch(&self) {
        *self.last_seen.lock() = Utc::now();
    }

    pub fn is_stale(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        now.signed_duration_since(*self.last_seen.lock()) > timeout
    }
}

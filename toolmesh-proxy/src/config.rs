/// §4.11 proxy bridge configuration: where to find the daemon and how
/// to identify this client to it.
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    /// Explicit daemon endpoint. Wins over the registry lookup when set.
    pub endpoint: Option<String>,
    /// Shared secret to present in `hello`, used only alongside an
    /// explicit `endpoint` (the registry path carries its own secret).
    pub shared_secret: Option<String>,
    /// Directory the daemon registry file lives in.
    pub daemon_dir: String,
    /// Scopes the registry lookup to a specific `configHash`, matching
    /// `DaemonServer::run`'s registry file naming.
    pub config_hash: Option<String>,
    /// Sent as `hello.clientId`.
    pub client_id: Option<String>,
    /// When true, never invoke the daemon-spawn hook on a missing
    /// registry; fail immediately instead.
    pub no_spawn: bool,
    /// The daemon's configured `heartbeatTimeoutMs`, used to derive our
    /// own heartbeat cadence (§9 open question: at most one third of
    /// this, and the daemon's own default besides).
    pub daemon_heartbeat_timeout_ms: u64,
}

//! `toolmesh proxy`: the process a client agent actually spawns. Bridges
//! its stdio to a shared daemon, spawning one with `toolmesh serve` in
//! the background if the registry is empty and `--no-spawn` wasn't given.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::Result;

use toolmesh_config::ConfigLoader;
use toolmesh_proxy::{DaemonSpawner, ProxyConfig, ProxyError};

use crate::runtime::config_hash;

struct CliSpawner {
    config_path: Option<PathBuf>,
}

impl DaemonSpawner for CliSpawner {
    fn spawn(&self) -> Result<(), ProxyError> {
        let exe = std::env::current_exe().map_err(ProxyError::Io)?;
        let mut command = std::process::Command::new(exe);
        command.arg("serve");
        if let Some(path) = &self.config_path {
            command.arg("--config").arg(path);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(ProxyError::Io)?;
        Ok(())
    }
}

pub async fn run(
    config_path: Option<PathBuf>,
    endpoint: Option<String>,
    client_id: Option<String>,
    no_spawn: bool,
) -> Result<()> {
    let config = ConfigLoader::new().load(config_path.as_ref())?;
    let hash = config_hash(&config);

    let proxy_config = ProxyConfig {
        endpoint,
        shared_secret: config.daemon.shared_secret.clone(),
        daemon_dir: config.daemon.daemon_dir.clone(),
        config_hash: hash,
        client_id,
        no_spawn,
        daemon_heartbeat_timeout_ms: config.daemon.heartbeat_timeout_ms,
    };

    let spawner = CliSpawner { config_path };
    toolmesh_proxy::run_stdio_bridge(proxy_config, Some(&spawner))
        .await
        .map_err(anyhow::Error::from)
}
